//! Referral link capture.

use axum::{
    extract::Path,
    response::{IntoResponse, Redirect},
};
use tower_sessions::Session;
use tracing::{info, instrument};

use crate::error::{AppError, Result};
use crate::models::session::set_referral_code;

/// Longest referral code accepted.
const MAX_CODE_LEN: usize = 64;

/// `GET /ref/{code}`
///
/// Remembers the code for the visitor's next order and sends them home.
#[instrument(skip(session))]
pub async fn capture(session: Session, Path(code): Path<String>) -> Result<impl IntoResponse> {
    let code = normalize_code(&code)
        .ok_or_else(|| AppError::BadRequest("Invalid referral code".to_string()))?;

    set_referral_code(&session, &code).await?;
    info!(code = %code, "Referral code stored");

    Ok(Redirect::to("/"))
}

/// Trimmed code, if it is non-empty, short and made of `[A-Za-z0-9_-]`.
fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim();
    let valid = !code.is_empty()
        && code.len() <= MAX_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| code.to_string())
}
