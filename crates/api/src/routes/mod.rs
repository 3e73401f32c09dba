//! HTTP handlers, grouped by resource.

pub mod customers;
pub mod invoices;
pub mod payments;
pub mod reports;
pub mod system;

use std::str::FromStr;

use axum::Json;
use chrono::NaiveDate;

use crate::error::{ApiError, ApiResponse};

/// Handler result carrying an enveloped JSON body.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub(crate) const DATE_FORMAT_MESSAGE: &str = "Format tanggal tidak valid (gunakan yyyy-MM-dd)";

/// Parses a typed id from a path segment.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("ID {what} tidak valid")))
}

/// Parses a `yyyy-MM-dd` date.
pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(DATE_FORMAT_MESSAGE.to_string()))
}

/// Parses an optional date; blank counts as absent.
pub(crate) fn parse_optional_date(raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_date(value).map(Some),
    }
}
