//! Request extractors whose rejections answer with the same [`ErrorBody`] as service failures.
//!
//! [`ErrorBody`]: crate::error::ErrorBody

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// [`axum::Json`] body; a malformed or mistyped payload becomes `invalid_argument`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// [`axum::extract::Path`] parameters, e.g. a non-numeric match id.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// [`axum::extract::Query`] string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
