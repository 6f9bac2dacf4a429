use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_poll_id;
use crate::db::PollStore;
use crate::error::PollError;
use crate::models::{OptionResult, Poll};
use crate::service::{CreatedPoll, PollService};

// Missing fields fall through to the service so they surface as validation errors.
#[derive(Debug, Deserialize)]
pub(crate) struct CreatePollRequest {
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) options: Vec<OptionInput>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OptionInput {
    pub(crate) name: String,
}

pub(crate) async fn create_handler<S>(
    State(service): State<PollService<S>>,
    Json(request): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<CreatedPoll>), PollError>
where
    S: PollStore + 'static,
{
    let names: Vec<String> = request.options.into_iter().map(|o| o.name).collect();
    let created = service.create_poll(&request.title, &names).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub(crate) async fn get_handler<S>(
    State(service): State<PollService<S>>,
    Path(poll_id): Path<String>,
) -> Result<Json<Poll>, PollError>
where
    S: PollStore + 'static,
{
    let poll_id = parse_poll_id(&poll_id)?;
    Ok(Json(service.get_poll(poll_id).await?))
}

pub(crate) async fn end_handler<S>(
    State(service): State<PollService<S>>,
    Path(poll_id): Path<String>,
) -> Result<Json<Value>, PollError>
where
    S: PollStore + 'static,
{
    let poll_id = parse_poll_id(&poll_id)?;
    service.close_poll(poll_id).await?;
    Ok(Json(json!({ "pollId": poll_id, "isFinished": true })))
}

pub(crate) async fn results_handler<S>(
    State(service): State<PollService<S>>,
    Path(poll_id): Path<String>,
) -> Result<Json<Vec<OptionResult>>, PollError>
where
    S: PollStore + 'static,
{
    let poll_id = parse_poll_id(&poll_id)?;
    Ok(Json(service.get_results(poll_id).await?))
}
