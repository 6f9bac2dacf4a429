use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub is_finished: bool,
    pub created_at: DateTime<Utc>,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: Uuid,
    pub name: String,
}

// One respondent's position for one option. Submissions are anonymous, so
// nothing ties a ranking back to who sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub id: Uuid,
    pub option_id: Uuid,
    pub rank: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSubmission {
    pub option_id: Uuid,
    pub rank: i32,
}

/// One row of the final standings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub id: Uuid,
    pub name: String,
    pub average_rank: f64,
    pub ranking_count: usize,
}

impl OptionResult {
    /// False when nobody ranked this option and `average_rank` holds the sentinel.
    pub fn has_rankings(&self) -> bool {
        self.ranking_count > 0
    }
}

impl Poll {
    pub fn new(title: String, option_names: Vec<String>) -> Self {
        let options = option_names
            .into_iter()
            .map(|name| PollOption {
                id: Uuid::new_v4(),
                name,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            title,
            is_finished: false,
            created_at: Utc::now(),
            options,
        }
    }

    pub fn has_option(&self, option_id: &Uuid) -> bool {
        self.options.iter().any(|option| option.id == *option_id)
    }
}

impl Ranking {
    pub fn from_submission(submission: &RankingSubmission) -> Self {
        Self {
            id: Uuid::new_v4(),
            option_id: submission.option_id,
            rank: submission.rank,
            created_at: Utc::now(),
        }
    }
}
