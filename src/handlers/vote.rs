use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::parse_poll_id;
use crate::db::PollStore;
use crate::error::PollError;
use crate::models::RankingSubmission;
use crate::service::PollService;

pub(crate) async fn submit_rankings_handler<S>(
    State(service): State<PollService<S>>,
    Path(poll_id): Path<String>,
    Json(rankings): Json<Vec<RankingSubmission>>,
) -> Result<Json<Value>, PollError>
where
    S: PollStore + 'static,
{
    let poll_id = parse_poll_id(&poll_id)?;
    let recorded = service.submit_rankings(poll_id, &rankings).await?;
    Ok(Json(json!({
        "recorded": recorded,
        "message": "Rankings submitted successfully.",
    })))
}
