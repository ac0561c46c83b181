//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_MAP_NAME_LEN: usize = 32;

/// Validates that a map name is 1..=32 characters of lowercase ASCII letters, digits or `_`.
///
/// Names end up inside remote commands and artifact file contents, so anything resembling
/// quoting or command separators is refused here.
///
/// # Examples
///
/// ```ignore
/// validate_map_name("de_dust2") // Ok
/// validate_map_name("de_Dust2") // Err - uppercase
/// validate_map_name("de;quit")  // Err - separator
/// ```
pub fn validate_map_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_MAP_NAME_LEN {
        let mut err = ValidationError::new("map_name_length");
        err.message = Some(
            format!(
                "map name must be 1 to {MAX_MAP_NAME_LEN} characters (got {})",
                name.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        let mut err = ValidationError::new("map_name_format");
        err.message = Some("map name may only contain a-z, 0-9 and `_`".into());
        return Err(err);
    }

    Ok(())
}

/// Applies [`validate_map_name`] to every entry of a pool.
pub fn validate_map_pool(pool: &[String]) -> Result<(), ValidationError> {
    pool.iter().try_for_each(|name| validate_map_name(name))
}

/// Hosts are sent to the socket layer as-is; refuse whitespace and empty values.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        let mut err = ValidationError::new("host_format");
        err.message = Some("host must be non-empty and contain no whitespace".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_map_name_valid() {
        assert!(validate_map_name("de_dust2").is_ok());
        assert!(validate_map_name("cs_office").is_ok());
        assert!(validate_map_name("a").is_ok());
    }

    #[test]
    fn test_validate_map_name_invalid() {
        assert!(validate_map_name("").is_err());
        assert!(validate_map_name("De_Dust2").is_err());
        assert!(validate_map_name("de dust2").is_err());
        assert!(validate_map_name("de_dust2\";quit").is_err());
        assert!(validate_map_name(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_map_pool_reports_first_bad_entry() {
        let pool = vec!["de_nuke".to_string(), "bad map".to_string()];
        let err = validate_map_pool(&pool).unwrap_err();
        assert_eq!(err.code, "map_name_format");
    }

    #[test]
    fn test_validate_host() {
        assert!(validate_host("10.0.0.5").is_ok());
        assert!(validate_host("game.example.org").is_ok());
        assert!(validate_host("").is_err());
        assert!(validate_host("10.0.0.5 ").is_err());
    }
}
