pub mod memory;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::models::{Poll, PollOption, Ranking};

pub use memory::MemoryStore;

/// Failures surfaced by a storage adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Write contention; the caller may retry.
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Backend(String),
    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// What happened to a batch of rankings handed to `PollStore::record_rankings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingWrite {
    Recorded(usize),
    PollMissing,
    PollClosed,
}

/// Durable storage for polls, their options and the rankings they receive.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Persist a poll together with all of its options, atomically.
    async fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError>;

    async fn fetch_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, StoreError>;

    /// Set the finished flag. Returns false when the poll does not exist.
    async fn mark_finished(&self, poll_id: Uuid) -> Result<bool, StoreError>;

    /// Persist every ranking or none of them. The poll's finished flag is
    /// checked inside the same unit of work.
    async fn record_rankings(
        &self,
        poll_id: Uuid,
        rankings: &[Ranking],
    ) -> Result<RankingWrite, StoreError>;

    /// All rankings received by the options of a poll.
    async fn fetch_rankings(&self, poll_id: Uuid) -> Result<Vec<Ranking>, StoreError>;

    /// Remove a poll; options and rankings go with it.
    async fn delete_poll(&self, poll_id: Uuid) -> Result<bool, StoreError>;
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;
        info!("Connected to {}", db_url);

        Ok(Self { pool })
    }

    /// A private in-memory database. Every connection to `sqlite::memory:`
    /// opens a fresh database, so the pool is pinned to one long-lived
    /// connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                is_finished BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_options (
                id TEXT PRIMARY KEY,
                poll_id TEXT NOT NULL,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rankings (
                id TEXT PRIMARY KEY,
                option_id TEXT NOT NULL,
                rank INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (option_id) REFERENCES poll_options(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_poll_options_poll ON poll_options(poll_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rankings_option ON rankings(option_id)")
            .execute(pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl PollStore for Database {
    async fn insert_poll(&self, poll: &Poll) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO polls (id, title, is_finished, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(poll.id.to_string())
        .bind(&poll.title)
        .bind(poll.is_finished)
        .bind(poll.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (i, option) in poll.options.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO poll_options (id, poll_id, name, position)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(option.id.to_string())
            .bind(poll.id.to_string())
            .bind(&option.name)
            .bind(i as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_poll(&self, poll_id: Uuid) -> Result<Option<Poll>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, is_finished, created_at
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let options = sqlx::query(
            r#"
            SELECT id, name
            FROM poll_options
            WHERE poll_id = ?
            ORDER BY position
            "#,
        )
        .bind(poll_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(PollOption {
                id: parse_uuid(row, "id")?,
                name: row.try_get("name")?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Some(Poll {
            id: parse_uuid(&row, "id")?,
            title: row.try_get("title")?,
            is_finished: row.try_get("is_finished")?,
            created_at: parse_timestamp(&row, "created_at")?,
            options,
        }))
    }

    async fn mark_finished(&self, poll_id: Uuid) -> Result<bool, StoreError> {
        // SQLite counts matched rows, so an already-finished poll still reports 1.
        let result = sqlx::query(
            r#"
            UPDATE polls
            SET is_finished = TRUE
            WHERE id = ?
            "#,
        )
        .bind(poll_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_rankings(
        &self,
        poll_id: Uuid,
        rankings: &[Ranking],
    ) -> Result<RankingWrite, StoreError> {
        // Take the write lock before reading the flag. A deferred transaction
        // would have to upgrade its read lock, which SQLite refuses with BUSY
        // when another writer got there first.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let finished = sqlx::query_scalar::<_, bool>("SELECT is_finished FROM polls WHERE id = ?")
            .bind(poll_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        match finished {
            None => return Ok(RankingWrite::PollMissing),
            Some(true) => return Ok(RankingWrite::PollClosed),
            Some(false) => {}
        }

        for ranking in rankings {
            sqlx::query(
                r#"
                INSERT INTO rankings (id, option_id, rank, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(ranking.id.to_string())
            .bind(ranking.option_id.to_string())
            .bind(ranking.rank)
            .bind(ranking.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(RankingWrite::Recorded(rankings.len()))
    }

    async fn fetch_rankings(&self, poll_id: Uuid) -> Result<Vec<Ranking>, StoreError> {
        sqlx::query(
            r#"
            SELECT r.id, r.option_id, r.rank, r.created_at
            FROM rankings r
            JOIN poll_options o ON o.id = r.option_id
            WHERE o.poll_id = ?
            "#,
        )
        .bind(poll_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(Ranking {
                id: parse_uuid(row, "id")?,
                option_id: parse_uuid(row, "option_id")?,
                rank: row.try_get("rank")?,
                created_at: parse_timestamp(row, "created_at")?,
            })
        })
        .collect()
    }

    async fn delete_poll(&self, poll_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM polls WHERE id = ?")
            .bind(poll_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, StoreError> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("{} `{}`: {}", column, raw, e)))
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{} `{}`: {}", column, raw, e)))
}

// SQLITE_BUSY and SQLITE_LOCKED, including their extended variants.
fn is_contention(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if is_contention(db.code().as_deref()) => {
                StoreError::Conflict(err.to_string())
            }
            sqlx::Error::PoolTimedOut => StoreError::Conflict(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => {
                error!("Database error: {}", err);
                StoreError::Backend(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RankingSubmission;

    fn lunch_poll() -> Poll {
        Poll::new(
            "Lunch".to_string(),
            vec!["Pizza".to_string(), "Sushi".to_string(), "Tacos".to_string()],
        )
    }

    fn ranking(option_id: Uuid, rank: i32) -> Ranking {
        Ranking::from_submission(&RankingSubmission { option_id, rank })
    }

    #[tokio::test]
    async fn poll_round_trips_with_option_order() {
        let db = Database::in_memory().await.expect("db");
        let poll = lunch_poll();
        db.insert_poll(&poll).await.expect("insert");

        let stored = db.fetch_poll(poll.id).await.expect("fetch").expect("present");
        assert_eq!(stored.id, poll.id);
        assert_eq!(stored.title, "Lunch");
        assert!(!stored.is_finished);
        assert_eq!(stored.options, poll.options);

        assert!(db.fetch_poll(Uuid::new_v4()).await.expect("fetch").is_none());
    }

    #[tokio::test]
    async fn mark_finished_is_idempotent() {
        let db = Database::in_memory().await.expect("db");
        let poll = lunch_poll();
        db.insert_poll(&poll).await.expect("insert");

        assert!(db.mark_finished(poll.id).await.expect("close"));
        assert!(db.mark_finished(poll.id).await.expect("close again"));
        assert!(!db.mark_finished(Uuid::new_v4()).await.expect("missing"));

        let stored = db.fetch_poll(poll.id).await.expect("fetch").expect("present");
        assert!(stored.is_finished);
    }

    #[tokio::test]
    async fn rankings_are_refused_once_closed() {
        let db = Database::in_memory().await.expect("db");
        let poll = lunch_poll();
        db.insert_poll(&poll).await.expect("insert");

        let batch = vec![ranking(poll.options[0].id, 1), ranking(poll.options[1].id, 2)];
        let outcome = db.record_rankings(poll.id, &batch).await.expect("record");
        assert_eq!(outcome, RankingWrite::Recorded(2));

        db.mark_finished(poll.id).await.expect("close");
        let late = vec![ranking(poll.options[2].id, 1)];
        let outcome = db.record_rankings(poll.id, &late).await.expect("record");
        assert_eq!(outcome, RankingWrite::PollClosed);

        let outcome = db
            .record_rankings(Uuid::new_v4(), &late)
            .await
            .expect("record");
        assert_eq!(outcome, RankingWrite::PollMissing);

        assert_eq!(db.fetch_rankings(poll.id).await.expect("fetch").len(), 2);
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_rankings_behind() {
        let db = Database::in_memory().await.expect("db");
        let poll = lunch_poll();
        db.insert_poll(&poll).await.expect("insert");

        // The second entry violates the option foreign key.
        let batch = vec![ranking(poll.options[0].id, 1), ranking(Uuid::new_v4(), 2)];
        assert!(db.record_rankings(poll.id, &batch).await.is_err());
        assert!(db.fetch_rankings(poll.id).await.expect("fetch").is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_to_options_and_rankings() {
        let db = Database::in_memory().await.expect("db");
        let poll = lunch_poll();
        db.insert_poll(&poll).await.expect("insert");
        db.record_rankings(poll.id, &[ranking(poll.options[0].id, 1)])
            .await
            .expect("record");

        assert!(db.delete_poll(poll.id).await.expect("delete"));
        assert!(!db.delete_poll(poll.id).await.expect("delete again"));

        let options: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM poll_options")
            .fetch_one(&db.pool)
            .await
            .expect("count");
        let rankings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rankings")
            .fetch_one(&db.pool)
            .await
            .expect("count");
        assert_eq!(options, 0);
        assert_eq!(rankings, 0);
    }

    // A throwaway database file with the regular multi-connection pool.
    async fn file_database() -> (Database, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("group-rank-{}.db", Uuid::new_v4()));
        let db = Database::new(&format!("sqlite:{}", path.display()))
            .await
            .expect("file db");
        (db, path)
    }

    async fn remove_database(db: Database, path: std::path::PathBuf) {
        db.pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_batches_all_persist() {
        let (db, path) = file_database().await;
        let db = std::sync::Arc::new(db);
        let poll = lunch_poll();
        db.insert_poll(&poll).await.expect("insert");
        let poll_id = poll.id;

        let mut handles = Vec::new();
        for _ in 0..40 {
            let db = std::sync::Arc::clone(&db);
            let options = poll.options.clone();
            handles.push(tokio::spawn(async move {
                let batch = vec![ranking(options[0].id, 1), ranking(options[1].id, 2)];
                db.record_rankings(poll_id, &batch).await
            }));
        }
        for handle in handles {
            let outcome = handle.await.expect("task").expect("batch stored");
            assert_eq!(outcome, RankingWrite::Recorded(2));
        }

        assert_eq!(db.fetch_rankings(poll.id).await.expect("fetch").len(), 80);

        let db = std::sync::Arc::try_unwrap(db).ok().expect("sole owner");
        remove_database(db, path).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn close_racing_batches_never_admits_late_rankings() {
        let (db, path) = file_database().await;
        let db = std::sync::Arc::new(db);
        let poll = lunch_poll();
        db.insert_poll(&poll).await.expect("insert");
        let poll_id = poll.id;

        let mut handles = Vec::new();
        for i in 0..30 {
            let db = std::sync::Arc::clone(&db);
            let option_id = poll.options[i % poll.options.len()].id;
            handles.push(tokio::spawn(async move {
                db.record_rankings(poll_id, &[ranking(option_id, 1)]).await
            }));
        }
        let closer = {
            let db = std::sync::Arc::clone(&db);
            tokio::spawn(async move { db.mark_finished(poll_id).await })
        };

        let mut recorded = 0;
        for handle in handles {
            match handle.await.expect("task").expect("no storage error") {
                RankingWrite::Recorded(n) => recorded += n,
                RankingWrite::PollClosed => {}
                RankingWrite::PollMissing => panic!("poll vanished"),
            }
        }
        assert!(closer.await.expect("task").expect("close"));

        assert_eq!(db.fetch_rankings(poll.id).await.expect("fetch").len(), recorded);
        let late = db
            .record_rankings(poll.id, &[ranking(poll.options[0].id, 1)])
            .await
            .expect("record");
        assert_eq!(late, RankingWrite::PollClosed);
        assert_eq!(db.fetch_rankings(poll.id).await.expect("fetch").len(), recorded);

        let db = std::sync::Arc::try_unwrap(db).ok().expect("sole owner");
        remove_database(db, path).await;
    }

    #[test]
    fn busy_and_locked_codes_count_as_contention() {
        assert!(is_contention(Some("5")));
        assert!(is_contention(Some("517")));
        assert!(is_contention(Some("6")));
        assert!(!is_contention(Some("19")));
        assert!(!is_contention(None));
    }
}
