use crate::db;
use crate::db_types::Intake;
use crate::error::{handle_error, AppError};
use crate::ivr::{self, Reply, TurnInput};
use crate::session::{CallSession, Step};
use crate::twilio_types::{wrap_twiml, StatusCallbackPayload, VoiceWebhookPayload};
use crate::types::AppState;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace};

#[derive(Deserialize, Debug, Default)]
pub struct StepQuery {
    #[serde(default)]
    pub step: Option<String>,
}

impl StepQuery {
    /// The step named in the action URL; a missing step means `detect`.
    fn step(&self) -> Result<Step, AppError> {
        match self.step.as_deref() {
            Some(name) => name.parse().map_err(AppError::UnknownStep),
            None => Ok(Step::default()),
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, AppError> {
    serde_urlencoded::from_str::<T>(body).map_err(|e| {
        error!(error=%e, "failed to deserialize Twilio webhook payload");
        AppError::from(e)
    })
}

fn twiml_response(reply: &Reply, app_state: &AppState) -> (StatusCode, HeaderMap, String) {
    let response = ivr::render(reply, app_state.config.voice.as_deref());
    let twiml = wrap_twiml(xmlserde::xml_serialize(response));
    trace!("twiml: '{}'", twiml);

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/xml"));
    (StatusCode::OK, headers, twiml)
}

/// First webhook for a call: open a session and ask what the caller wants.
pub async fn incoming_call(
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    trace!(body=%body, "incoming request body");
    let payload: VoiceWebhookPayload = parse_payload(&body)?;
    info!(
        call_sid = %payload.call_sid,
        from = ?payload.from,
        to = ?payload.to,
        status = ?payload.call_status,
        "incoming call"
    );

    let (reply, _) = app_state
        .sessions
        .with_session(&payload.call_sid, Instant::now(), ivr::greet);

    Ok(twiml_response(&reply, &app_state))
}

/// One turn of the intake dialogue.  Twilio posts here from every `<Gather>` action and from the
/// fallback `<Redirect>`.
pub async fn ivr_turn(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<StepQuery>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    trace!(body=%body, "ivr request body");
    let step = query.step().map_err(|e| {
        error!(error=%e, "bad step in ivr action url");
        e
    })?;
    let payload: VoiceWebhookPayload = parse_payload(&body)?;
    let input = TurnInput {
        speech: payload.speech_result.as_deref(),
        digits: payload.digits.as_deref(),
    };

    let (reply, finished) =
        app_state
            .sessions
            .with_session(&payload.call_sid, Instant::now(), |session| {
                ivr::take_turn(session, step, &input, &app_state.retry_policy)
            });
    debug!(
        call_sid = %payload.call_sid,
        %step,
        terminal = reply.is_terminal(),
        reply = ?reply,
        "turn handled"
    );

    if let Some(session) = finished {
        finish_call(&app_state, session);
    }

    Ok(twiml_response(&reply, &app_state))
}

/// Log the finished dialogue and persist its intake on a background task.
fn finish_call(app_state: &AppState, session: CallSession) {
    info!(
        call_sid = %session.call_sid,
        path = ?session.path,
        turns = session.turns,
        elapsed = ?session.created.elapsed(),
        "call dialogue finished"
    );
    let Some(intake) = Intake::from_session(&session) else {
        return;
    };
    let Some(pool) = app_state.db_pool.clone() else {
        info!(intake = ?intake, "intake complete; no database configured");
        return;
    };
    tokio::spawn(async move {
        match db::save_intake(&pool, &intake).await {
            Ok(()) => info!(intake_id = %intake.id, "saved intake"),
            Err(e) => handle_error(e),
        }
    });
}

/// Call status callback.  Drops the session of a call that ended before the dialogue did.
pub async fn status_callback(
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> Result<StatusCode, AppError> {
    let payload: StatusCallbackPayload = parse_payload(&body)?;
    debug!(call_sid = %payload.call_sid, status = ?payload.call_status, "status callback");

    if payload.call_status.is_final() {
        if let Some(session) = app_state.sessions.remove(&payload.call_sid) {
            info!(
                call_sid = %session.call_sid,
                step = %session.step,
                collected = session.collected(),
                duration = ?payload.call_duration,
                "call ended mid-dialogue; session dropped"
            );
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
