//! Message publishing.

use axum::Json;
use axum::extract::State;
use validator::Validate;

use lumen_core::error::AppError;
use lumen_core::types::SubjectId;
use lumen_realtime::{DeliveryReport, Event, RecipientSelector};

use crate::dto::request::{PublishRequest, TALK_GROUP, TALK_PRIVATE};
use crate::dto::response::ApiResponse;
use crate::error::ApiError;
use crate::extractors::AuthSession;
use crate::state::AppState;

/// POST /api/v1/talk/publish
///
/// Private messages go to the peer and to the sender's other devices;
/// group messages go to every member.
pub async fn publish(
    State(state): State<AppState>,
    session: AuthSession,
    Json(req): Json<PublishRequest>,
) -> Result<Json<ApiResponse<DeliveryReport>>, ApiError> {
    req.validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let selector = match req.talk_type {
        TALK_PRIVATE => {
            RecipientSelector::Subjects(vec![SubjectId(req.receiver_id), session.subject_id])
        }
        TALK_GROUP => RecipientSelector::Group(req.receiver_id),
        other => {
            return Err(AppError::validation(format!("Unknown talk_type {other}")).into());
        }
    };

    let event = Event::new(req.event, req.payload, state.process_id.clone());
    let report = state.engine.dispatcher.send(&event, &selector).await?;

    tracing::debug!(
        subject_id = %session.subject_id,
        event_id = %event.id,
        talk_type = req.talk_type,
        receiver_id = req.receiver_id,
        "Message published"
    );
    Ok(Json(ApiResponse::ok(report)))
}
