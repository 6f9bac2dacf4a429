use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{PollStore, RankingWrite, StoreError};
use crate::models::{Poll, Ranking};

#[derive(Default)]
struct Tables {
    polls: HashMap<Uuid, Poll>,
    // Keyed by poll so a purge drops them with the poll.
    rankings: HashMap<Uuid, Vec<Ranking>>,
}

/// Process-local store. Data lives as long as the value does.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn poll_count(&self) -> usize {
        self.lock().map(|tables| tables.polls.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.polls.contains_key(&poll.id) {
            return Err(StoreError::Backend(format!("poll {} already exists", poll.id)));
        }
        tables.polls.insert(poll.id, poll.clone());
        Ok(())
    }

    async fn fetch_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, StoreError> {
        Ok(self.lock()?.polls.get(&poll_id).cloned())
    }

    async fn mark_finished(&self, poll_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.polls.get_mut(&poll_id) {
            Some(poll) => {
                poll.is_finished = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_rankings(
        &self,
        poll_id: Uuid,
        rankings: &[Ranking],
    ) -> Result<RankingWrite, StoreError> {
        let mut tables = self.lock()?;
        let Some(poll) = tables.polls.get(&poll_id) else {
            return Ok(RankingWrite::PollMissing);
        };
        if poll.is_finished {
            return Ok(RankingWrite::PollClosed);
        }
        // Mirror the foreign key check of the SQL schema before touching anything.
        if let Some(stray) = rankings.iter().find(|r| !poll.has_option(&r.option_id)) {
            return Err(StoreError::Backend(format!(
                "option {} does not belong to poll {}",
                stray.option_id, poll_id
            )));
        }

        tables
            .rankings
            .entry(poll_id)
            .or_default()
            .extend(rankings.iter().cloned());
        Ok(RankingWrite::Recorded(rankings.len()))
    }

    async fn fetch_rankings(&self, poll_id: Uuid) -> Result<Vec<Ranking>, StoreError> {
        Ok(self
            .lock()?
            .rankings
            .get(&poll_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_poll(&self, poll_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        tables.rankings.remove(&poll_id);
        Ok(tables.polls.remove(&poll_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RankingSubmission;

    #[tokio::test]
    async fn stray_option_rejects_whole_batch() {
        let store = MemoryStore::new();
        let poll = Poll::new("Lunch".into(), vec!["Pizza".into(), "Sushi".into()]);
        store.insert_poll(&poll).await.expect("insert");

        let batch = vec![
            Ranking::from_submission(&RankingSubmission {
                option_id: poll.options[0].id,
                rank: 1,
            }),
            Ranking::from_submission(&RankingSubmission {
                option_id: Uuid::new_v4(),
                rank: 2,
            }),
        ];
        assert!(store.record_rankings(poll.id, &batch).await.is_err());
        assert!(store.fetch_rankings(poll.id).await.expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn delete_drops_rankings() {
        let store = MemoryStore::new();
        let poll = Poll::new("Lunch".into(), vec!["Pizza".into(), "Sushi".into()]);
        store.insert_poll(&poll).await.expect("insert");
        let batch = vec![Ranking::from_submission(&RankingSubmission {
            option_id: poll.options[1].id,
            rank: 1,
        })];
        store.record_rankings(poll.id, &batch).await.expect("record");

        assert!(store.delete_poll(poll.id).await.expect("delete"));
        assert!(store.fetch_poll(poll.id).await.expect("fetch").is_none());
        assert!(store.fetch_rankings(poll.id).await.expect("fetch").is_empty());
    }
}
