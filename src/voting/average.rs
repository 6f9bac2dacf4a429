use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{OptionResult, Poll, Ranking};

/// Average assigned to an option nobody ranked. Sorts after every real average.
pub const NO_RANKINGS: f64 = f64::MAX;

/// Final standings of a poll: options ordered by ascending average rank.
///
/// Options with equal averages keep the order they were created in, and
/// rankings pointing at options outside the poll are ignored.
pub fn calculate_results(poll: &Poll, rankings: &[Ranking]) -> Vec<OptionResult> {
    // Sum and count per option
    let mut totals: HashMap<Uuid, (i64, usize)> = HashMap::new();
    for ranking in rankings {
        let entry = totals.entry(ranking.option_id).or_insert((0, 0));
        entry.0 += i64::from(ranking.rank);
        entry.1 += 1;
    }

    let mut results: Vec<OptionResult> = poll
        .options
        .iter()
        .map(|option| {
            let (sum, count) = totals.get(&option.id).copied().unwrap_or((0, 0));
            let average_rank = if count > 0 {
                sum as f64 / count as f64
            } else {
                NO_RANKINGS
            };

            OptionResult {
                id: option.id,
                name: option.name.clone(),
                average_rank,
                ranking_count: count,
            }
        })
        .collect();

    // sort_by is stable, which is the only tie-break
    results.sort_by(|a, b| a.average_rank.total_cmp(&b.average_rank));
    results
}
