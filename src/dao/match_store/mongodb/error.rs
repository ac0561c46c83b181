use mongodb::error::Error as MongoError;
use thiserror::Error;

use crate::state::matches::{MatchId, PlayerId};

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to allocate a match id")]
    AllocateMatchId {
        #[source]
        source: Option<MongoError>,
    },
    #[error("failed to save match `{id}`")]
    SaveMatch {
        id: MatchId,
        #[source]
        source: MongoError,
    },
    #[error("failed to load match `{id}`")]
    LoadMatch {
        id: MatchId,
        #[source]
        source: MongoError,
    },
    #[error("failed to list matches")]
    ListMatches {
        #[source]
        source: MongoError,
    },
    #[error("failed to save player `{id}`")]
    SavePlayer {
        id: PlayerId,
        #[source]
        source: MongoError,
    },
    #[error("failed to load player `{id}`")]
    LoadPlayer {
        id: PlayerId,
        #[source]
        source: MongoError,
    },
    #[error("failed to save chat message for match `{match_id}`")]
    SaveChat {
        match_id: MatchId,
        #[source]
        source: MongoError,
    },
    #[error("stored {entity} `{id}` is malformed: {reason}")]
    Corrupted {
        entity: &'static str,
        id: String,
        reason: String,
    },
    #[error("failed to list chat messages for match `{match_id}`")]
    ListChat {
        match_id: MatchId,
        #[source]
        source: MongoError,
    },
}
