//! Incremental cursor over persisted log rows

use lantern_core::{LogRecord, Result};
use lantern_db::{Database, LogQuery, LogSelector};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    /// First call returns the most recent rows
    Tail,
    /// First call pages forward from the oldest row
    Beginning,
}

/// Cursor that returns each log row at most once, in id order.
///
/// The first call either tails or starts from the oldest row; after that every
/// call returns only rows with an id above the highest one already returned.
/// One iterator belongs to one reader.
pub struct LogIterator {
    db: Database,
    selector: LogSelector,
    limit: Option<i64>,
    start: Start,
    /// Highest id returned so far; `None` until the first call
    last_seen_id: Option<i64>,
}

impl LogIterator {
    /// Iterator whose first call returns the most recent `limit` rows
    pub fn tail(db: Database, selector: LogSelector, limit: Option<i64>) -> Self {
        Self::new(db, selector, limit, Start::Tail)
    }

    /// Iterator that pages forward from the first stored row
    pub fn from_start(db: Database, selector: LogSelector, limit: Option<i64>) -> Self {
        Self::new(db, selector, limit, Start::Beginning)
    }

    fn new(db: Database, selector: LogSelector, limit: Option<i64>, start: Start) -> Self {
        Self {
            db,
            selector,
            limit,
            start,
            last_seen_id: None,
        }
    }

    /// Fetch rows not yet returned, using the iterator's own limit
    pub async fn next_logs(&mut self) -> Result<Vec<LogRecord>> {
        self.next_logs_with(self.limit).await
    }

    /// Fetch rows not yet returned with an explicit limit (`None` for all)
    pub async fn next_logs_with(&mut self, limit: Option<i64>) -> Result<Vec<LogRecord>> {
        let mut query = LogQuery::new(self.selector.clone());
        query.limit = limit;

        match self.last_seen_id {
            Some(id) => query = query.after(id),
            None if self.start == Start::Tail => query = query.newest(),
            None => {}
        }

        let rows = self.db.logs().query(&query).await?;

        let max_id = rows.iter().map(|r| r.id).max();
        self.last_seen_id = match (self.last_seen_id, max_id) {
            (Some(seen), Some(max)) => Some(seen.max(max)),
            (seen, max) => max.or(seen).or(Some(0)),
        };
        trace!(
            "Log iterator returned {} rows, watermark {:?}",
            rows.len(),
            self.last_seen_id
        );
        Ok(rows)
    }

    /// Highest id returned so far
    pub fn watermark(&self) -> Option<i64> {
        self.last_seen_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::{LogType, ServiceKey};
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("test.db")).await.unwrap();
        (db, dir)
    }

    fn key() -> ServiceKey {
        ServiceKey::new("web", "/proj")
    }

    async fn write(db: &Database, from: i64, to: i64) {
        for i in from..=to {
            db.logs()
                .append(1, &key(), i, &format!("line {}", i), LogType::Stdout)
                .await
                .unwrap();
        }
    }

    fn lines(rows: &[LogRecord]) -> Vec<i64> {
        rows.iter().map(|r| r.line_number).collect()
    }

    #[tokio::test]
    async fn test_limited_then_rest() {
        let (db, _dir) = setup_db().await;
        write(&db, 1, 5).await;

        let mut iter = LogIterator::from_start(db, LogSelector::Service(key()), Some(3));
        assert_eq!(lines(&iter.next_logs().await.unwrap()), [1, 2, 3]);
        assert_eq!(lines(&iter.next_logs_with(None).await.unwrap()), [4, 5]);
        assert!(iter.next_logs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tail_then_follow() {
        let (db, _dir) = setup_db().await;
        write(&db, 1, 5).await;

        let mut iter = LogIterator::tail(db.clone(), LogSelector::Service(key()), Some(2));
        assert_eq!(lines(&iter.next_logs().await.unwrap()), [4, 5]);

        write(&db, 6, 9).await;
        assert_eq!(lines(&iter.next_logs().await.unwrap()), [6, 7]);
        assert_eq!(lines(&iter.next_logs().await.unwrap()), [8, 9]);
    }

    #[tokio::test]
    async fn test_empty_first_call_does_not_skip() {
        let (db, _dir) = setup_db().await;
        let mut iter = LogIterator::tail(db.clone(), LogSelector::Service(key()), Some(2));
        assert!(iter.next_logs().await.unwrap().is_empty());
        assert_eq!(iter.watermark(), Some(0));

        write(&db, 1, 3).await;
        assert_eq!(lines(&iter.next_logs_with(None).await.unwrap()), [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concatenation_has_no_gaps_or_duplicates() {
        let (db, _dir) = setup_db().await;
        let mut iter = LogIterator::from_start(db.clone(), LogSelector::Service(key()), Some(4));
        let mut seen = Vec::new();

        let mut next = 1;
        for batch in [3, 0, 7, 1, 5] {
            write(&db, next, next + batch - 1).await;
            next += batch;
            loop {
                let rows = iter.next_logs().await.unwrap();
                if rows.is_empty() {
                    break;
                }
                seen.extend(rows);
            }
        }

        let ids: Vec<_> = seen.iter().map(|r| r.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
        assert_eq!(lines(&seen), (1..next).collect::<Vec<_>>());
    }
}
