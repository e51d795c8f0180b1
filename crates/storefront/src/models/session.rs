//! Visitor state kept in the session.
//!
//! The session stands in for the browser's local storage: it survives page
//! loads and belongs to exactly one visitor.

use tower_sessions::Session;
use uuid::Uuid;

/// Session keys for visitor data.
pub mod keys {
    /// Date of the visitor's last completed spin, `YYYY-MM-DD`.
    pub const LAST_SPIN_DATE: &str = "last_spin_date";

    /// Referral code the visitor arrived with.
    pub const REFERRAL_CODE: &str = "referral_code";

    /// Random id the spin guard is keyed on.
    pub const VISITOR_ID: &str = "visitor_id";
}

/// The visitor's id, minted on first use.
///
/// # Errors
///
/// Returns error if the session store cannot be read or written.
pub async fn visitor_id(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(id) = session.get::<String>(keys::VISITOR_ID).await? {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    session.insert(keys::VISITOR_ID, &id).await?;
    Ok(id)
}

/// The referral code stored by the last `/ref/{code}` visit.
///
/// # Errors
///
/// Returns error if the session store cannot be read.
pub async fn referral_code(
    session: &Session,
) -> Result<Option<String>, tower_sessions::session::Error> {
    session.get::<String>(keys::REFERRAL_CODE).await
}

/// Remember the referral code the visitor arrived with.
///
/// # Errors
///
/// Returns error if the session store cannot be written.
pub async fn set_referral_code(
    session: &Session,
    code: &str,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::REFERRAL_CODE, code).await
}
