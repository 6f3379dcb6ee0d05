use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::scan_fixtures_by_date;
use crate::models::{FixtureRecord, OpportunityContext, DAILY_SWEEP_STATUSES, STATUS_NOT_STARTED};
use crate::queue::OpportunityQueue;

pub const MISSING_PREDICTIONS: &str = "Previsões não encontradas para este jogo.";

/// Stored kick-off text carries the feed's own offset, at most 14h away from UTC.
const MAX_FEED_OFFSET_HOURS: i64 = 14;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterOutcome {
    pub enqueued: usize,
    pub discarded: usize,
    pub skipped: usize,
    /// Opportunities the queue refused; retried by the next sweep.
    pub failed: usize,
}

#[derive(Debug)]
pub enum Classification {
    /// Already analyzed.
    Skip,
    Enqueue(OpportunityContext),
    /// No statistics to analyze.
    Discard,
}

/// Daily sweep: anything not yet fully resolved.
pub fn select_daily(records: Vec<FixtureRecord>) -> Vec<FixtureRecord> {
    let mut kept: Vec<FixtureRecord> = records
        .into_iter()
        .filter(|r| DAILY_SWEEP_STATUSES.contains(&r.fixture.status.as_str()))
        .collect();
    sort_by_kickoff(&mut kept);
    kept
}

/// Not-started fixtures kicking off strictly inside `(now, now + window)`.
pub fn select_upcoming(records: Vec<FixtureRecord>, now: DateTime<Utc>, window: Duration) -> Vec<FixtureRecord> {
    let until = now + window;
    let mut kept: Vec<FixtureRecord> = records
        .into_iter()
        .filter(|r| {
            r.fixture.status == STATUS_NOT_STARTED && r.fixture.kickoff > now && r.fixture.kickoff < until
        })
        .collect();
    sort_by_kickoff(&mut kept);
    kept
}

fn sort_by_kickoff(records: &mut [FixtureRecord]) {
    records.sort_by_key(|r| r.fixture.kickoff);
}

pub fn classify(record: FixtureRecord) -> Classification {
    if record.fixture.analysis.is_some() {
        return Classification::Skip;
    }
    match record.statistics.filter(|s| !s.trim().is_empty()) {
        Some(statistics) => Classification::Enqueue(OpportunityContext {
            fixture: record.fixture,
            statistics,
            predictions: record
                .predictions
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| MISSING_PREDICTIONS.to_string()),
        }),
        None => Classification::Discard,
    }
}

pub struct FixtureFilter {
    pool: SqlitePool,
    queue: OpportunityQueue,
    window: Duration,
}

impl FixtureFilter {
    pub fn new(pool: SqlitePool, queue: OpportunityQueue, window: Duration) -> Self {
        Self { pool, queue, window }
    }

    pub async fn run_daily_sweep(&self, date: NaiveDate) -> Result<FilterOutcome> {
        tracing::info!("Daily sweep for {}", date);
        let records = scan_fixtures_by_date(&self.pool, date).await?;
        let outcome = self.enqueue_opportunities(select_daily(records));
        tracing::info!(
            "Daily sweep finished: {} enqueued, {} discarded, {} already analyzed, {} failed",
            outcome.enqueued,
            outcome.discarded,
            outcome.skipped,
            outcome.failed
        );
        Ok(outcome)
    }

    pub async fn run_upcoming_sweep(&self, now: DateTime<Utc>) -> Result<FilterOutcome> {
        tracing::info!("Upcoming sweep: {} to {}", now, now + self.window);

        let first = (now - Duration::hours(MAX_FEED_OFFSET_HOURS)).date_naive();
        let last = (now + self.window + Duration::hours(MAX_FEED_OFFSET_HOURS)).date_naive();
        let mut records = Vec::new();
        for date in first.iter_days().take_while(|d| *d <= last) {
            records.extend(scan_fixtures_by_date(&self.pool, date).await?);
        }

        let outcome = self.enqueue_opportunities(select_upcoming(records, now, self.window));
        tracing::info!(
            "Upcoming sweep finished: {} enqueued, {} discarded, {} already analyzed, {} failed",
            outcome.enqueued,
            outcome.discarded,
            outcome.skipped,
            outcome.failed
        );
        Ok(outcome)
    }

    /// A queue failure on one fixture never stops the rest of the sweep.
    fn enqueue_opportunities(&self, candidates: Vec<FixtureRecord>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        for record in candidates {
            let id = record.fixture.id;
            let matchup = record.fixture.matchup();
            match classify(record) {
                Classification::Skip => {
                    tracing::debug!("Skipping {} ({}): already analyzed", matchup, id);
                    outcome.skipped += 1;
                }
                Classification::Enqueue(context) => match self.queue.send(&context) {
                    Ok(_) => {
                        tracing::info!("Enqueued {} ({}) for analysis", matchup, id);
                        outcome.enqueued += 1;
                    }
                    Err(e) => {
                        tracing::error!("Failed to enqueue {} ({}): {}", matchup, id, e);
                        outcome.failed += 1;
                    }
                },
                Classification::Discard => {
                    tracing::info!("Discarded {} ({}): no statistics", matchup, id);
                    outcome.discarded += 1;
                }
            }
        }

        outcome
    }
}
