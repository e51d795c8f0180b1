//! Lucky wheel route handlers.

use axum::{Json, extract::State};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::models::session::visitor_id;
use crate::services::{SpinOutcome, WheelView};
use crate::state::AppState;

/// `GET /api/mini-game/wheel`
#[instrument(skip_all)]
pub async fn wheel(State(state): State<AppState>, session: Session) -> Result<Json<WheelView>> {
    // Minted on page load so that overlapping spins share one id
    let visitor = visitor_id(&session).await?;
    let view = state.spin_gate().wheel(&visitor, &session).await?;
    Ok(Json(view))
}

/// `POST /api/mini-game/spin`
///
/// Answers once the reveal delay has passed, so the page can start the wheel
/// animation on click and stop it when the response lands.
#[instrument(skip_all)]
pub async fn spin(State(state): State<AppState>, session: Session) -> Result<Json<SpinOutcome>> {
    let visitor = visitor_id(&session).await?;
    let outcome = state.spin_gate().spin(&visitor, &session).await?;

    add_breadcrumb(
        "mini_game",
        "Wheel spun",
        Some(&[("prize_id", outcome.result.prize.id.as_str())]),
    );

    Ok(Json(outcome))
}
