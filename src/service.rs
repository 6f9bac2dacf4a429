use std::collections::HashSet;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{PollStore, RankingWrite};
use crate::error::PollError;
use crate::models::{OptionResult, Poll, Ranking, RankingSubmission};
use crate::voting::calculate_results;

/// Returned to the creator of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPoll {
    pub poll_id: Uuid,
    pub link: String,
}

/// Poll lifecycle, ranking submission and results over any `PollStore`.
pub struct PollService<S> {
    store: Arc<S>,
    public_base_url: String,
}

// Manual impl so `S` itself need not be Clone.
impl<S> Clone for PollService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            public_base_url: self.public_base_url.clone(),
        }
    }
}

impl<S> PollService<S>
where
    S: PollStore + 'static,
{
    pub fn new(store: Arc<S>, public_base_url: impl Into<String>) -> Self {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        Self {
            store,
            public_base_url,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn poll_link(&self, poll_id: Uuid) -> String {
        format!("{}/poll/{}", self.public_base_url, poll_id)
    }

    pub async fn create_poll(
        &self,
        title: &str,
        option_names: &[String],
    ) -> Result<CreatedPoll, PollError> {
        let title = title.trim();
        if title.is_empty() {
            warn!("Rejected poll without a title");
            return Err(PollError::Validation("Please enter a poll title.".to_string()));
        }

        let names: Vec<String> = option_names.iter().map(|n| n.trim().to_string()).collect();
        if names.iter().any(|n| n.is_empty()) {
            warn!("Rejected poll '{}' with a blank option", title);
            return Err(PollError::Validation("Option names must not be empty.".to_string()));
        }
        if names.len() < 2 {
            warn!("Rejected poll '{}' with {} option(s)", title, names.len());
            return Err(PollError::Validation(
                "Please enter at least two options.".to_string(),
            ));
        }

        let poll = Poll::new(title.to_string(), names);
        self.store.insert_poll(&poll).await?;
        info!("Created poll {} with {} options", poll.id, poll.options.len());

        Ok(CreatedPoll {
            poll_id: poll.id,
            link: self.poll_link(poll.id),
        })
    }

    pub async fn get_poll(&self, poll_id: Uuid) -> Result<Poll, PollError> {
        self.store
            .fetch_poll(poll_id)
            .await?
            .ok_or_else(|| PollError::poll_not_found(poll_id))
    }

    /// Mark the poll finished. Closing a finished poll is a no-op.
    pub async fn close_poll(&self, poll_id: Uuid) -> Result<(), PollError> {
        if !self.store.mark_finished(poll_id).await? {
            return Err(PollError::poll_not_found(poll_id));
        }
        info!("Closed poll {}", poll_id);
        Ok(())
    }

    /// Record one ranking per entry, all or nothing. Returns how many were stored.
    pub async fn submit_rankings(
        &self,
        poll_id: Uuid,
        submissions: &[RankingSubmission],
    ) -> Result<usize, PollError> {
        let poll = self.get_poll(poll_id).await?;

        if poll.is_finished {
            warn!("Rejected rankings for closed poll {}", poll_id);
            return Err(PollError::PreconditionFailed(
                "Poll has already ended.".to_string(),
            ));
        }
        if submissions.is_empty() {
            return Err(PollError::Validation("No rankings were submitted.".to_string()));
        }

        let known: HashSet<Uuid> = poll.options.iter().map(|o| o.id).collect();
        if let Some(stray) = submissions.iter().find(|s| !known.contains(&s.option_id)) {
            warn!("Rejected rankings for poll {}: unknown option {}", poll_id, stray.option_id);
            return Err(PollError::Validation(format!(
                "Option with ID {} does not exist in this poll.",
                stray.option_id
            )));
        }

        let rankings: Vec<Ranking> = submissions.iter().map(Ranking::from_submission).collect();
        match self.store.record_rankings(poll_id, &rankings).await? {
            RankingWrite::Recorded(count) => {
                info!("Recorded {} rankings for poll {}", count, poll_id);
                Ok(count)
            }
            // The poll changed between the read above and the write.
            RankingWrite::PollClosed => Err(PollError::PreconditionFailed(
                "Poll has already ended.".to_string(),
            )),
            RankingWrite::PollMissing => Err(PollError::poll_not_found(poll_id)),
        }
    }

    /// Final standings, available only once the poll is closed.
    pub async fn get_results(&self, poll_id: Uuid) -> Result<Vec<OptionResult>, PollError> {
        let poll = self.get_poll(poll_id).await?;
        if !poll.is_finished {
            return Err(PollError::PreconditionFailed(
                "Poll is not yet finished.".to_string(),
            ));
        }

        let rankings = self.store.fetch_rankings(poll_id).await?;
        Ok(calculate_results(&poll, &rankings))
    }

    /// Delete a poll with its options and rankings. Not reachable over HTTP.
    pub async fn purge_poll(&self, poll_id: Uuid) -> Result<(), PollError> {
        if !self.store.delete_poll(poll_id).await? {
            return Err(PollError::poll_not_found(poll_id));
        }
        info!("Purged poll {}", poll_id);
        Ok(())
    }
}
