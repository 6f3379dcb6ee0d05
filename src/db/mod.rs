use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::models::*;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    let in_memory = file_path.contains(":memory:");
    if !in_memory {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // Every in-memory connection is its own database, so keep exactly one alive.
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
    };

    let pool = pool_options.connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fixtures (
            id INTEGER PRIMARY KEY,
            kickoff TEXT NOT NULL,
            status TEXT NOT NULL,
            league_name TEXT NOT NULL,
            home_team_id INTEGER NOT NULL,
            home_team TEXT NOT NULL,
            away_team_id INTEGER NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER,
            away_goals INTEGER,
            odds TEXT,
            statistics TEXT,
            predictions TEXT,
            predicted_winner TEXT,
            prediction_comment TEXT,
            analysis TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff ON fixtures(kickoff)")
        .execute(pool)
        .await?;

    tracing::info!("Database schema ready");
    Ok(())
}

/// Insert or refresh a fixture as delivered by the ingestion feed.
///
/// An existing analysis is kept when the incoming record carries none, so a
/// feed refresh (new score, new status) never wipes the AI result.
pub async fn upsert_fixture(pool: &SqlitePool, record: &FixtureRecord) -> Result<()> {
    let fixture = &record.fixture;
    let (derived_winner, derived_comment) = record
        .predictions
        .as_deref()
        .map(predicted_winner_from_payload)
        .unwrap_or((None, None));

    let predicted_winner = fixture.predicted_winner.clone().or(derived_winner);
    let prediction_comment = fixture.prediction_comment.clone().or(derived_comment);
    let analysis = match &fixture.analysis {
        Some(analysis) => Some(serde_json::to_string(analysis)?),
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO fixtures
        (id, kickoff, status, league_name, home_team_id, home_team, away_team_id, away_team,
         home_goals, away_goals, odds, statistics, predictions, predicted_winner,
         prediction_comment, analysis, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            kickoff = excluded.kickoff,
            status = excluded.status,
            league_name = excluded.league_name,
            home_team_id = excluded.home_team_id,
            home_team = excluded.home_team,
            away_team_id = excluded.away_team_id,
            away_team = excluded.away_team,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            odds = excluded.odds,
            statistics = excluded.statistics,
            predictions = excluded.predictions,
            predicted_winner = excluded.predicted_winner,
            prediction_comment = excluded.prediction_comment,
            analysis = COALESCE(excluded.analysis, fixtures.analysis),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(fixture.id)
    .bind(fixture.kickoff.to_rfc3339())
    .bind(&fixture.status)
    .bind(&fixture.league_name)
    .bind(fixture.home_team_id)
    .bind(&fixture.home_team)
    .bind(fixture.away_team_id)
    .bind(&fixture.away_team)
    .bind(fixture.home_goals)
    .bind(fixture.away_goals)
    .bind(&fixture.odds)
    .bind(&record.statistics)
    .bind(&record.predictions)
    .bind(predicted_winner)
    .bind(prediction_comment)
    .bind(analysis)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_fixture_by_id(pool: &SqlitePool, id: i64) -> Result<Option<FixtureRecord>> {
    let row = sqlx::query("SELECT * FROM fixtures WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(record_from_row(&row)?)),
        None => Ok(None),
    }
}

/// All fixtures whose stored kick-off text starts with `date` (YYYY-MM-DD).
/// The kick-off keeps the feed's own offset, so "date" is the feed's calendar day.
pub async fn scan_fixtures_by_date(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<FixtureRecord>> {
    let rows = sqlx::query("SELECT * FROM fixtures WHERE kickoff LIKE ? ORDER BY kickoff, id")
        .bind(format!("{}%", date.format("%Y-%m-%d")))
        .fetch_all(pool)
        .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(record_from_row(&row)?);
    }
    Ok(records)
}

pub async fn update_analysis_result(pool: &SqlitePool, id: i64, analysis: &AnalysisResult) -> Result<()> {
    let result = sqlx::query("UPDATE fixtures SET analysis = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(analysis)?)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(anyhow!("fixture {} not found", id));
    }
    Ok(())
}

fn record_from_row(row: &SqliteRow) -> Result<FixtureRecord> {
    let analysis = match row.get::<Option<String>, _>("analysis") {
        Some(text) => match serde_json::from_str::<AnalysisResult>(&text) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                tracing::warn!("Ignoring unreadable analysis on fixture {}: {}", row.get::<i64, _>("id"), e);
                None
            }
        },
        None => None,
    };

    Ok(FixtureRecord {
        fixture: Fixture {
            id: row.get("id"),
            kickoff: DateTime::parse_from_rfc3339(&row.get::<String, _>("kickoff"))?,
            status: row.get("status"),
            league_name: row.get("league_name"),
            home_team_id: row.get("home_team_id"),
            home_team: row.get("home_team"),
            away_team_id: row.get("away_team_id"),
            away_team: row.get("away_team"),
            home_goals: row.get("home_goals"),
            away_goals: row.get("away_goals"),
            odds: row.get("odds"),
            predicted_winner: row.get("predicted_winner"),
            prediction_comment: row.get("prediction_comment"),
            analysis,
        },
        statistics: row.get("statistics"),
        predictions: row.get("predictions"),
    })
}

/// Winner name and comment from a predictions payload. Accepts both the bare
/// prediction object and the feed's `{"predictions": {...}}` wrapper.
fn predicted_winner_from_payload(payload: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return (None, None);
    };
    let winner = value
        .pointer("/predictions/winner")
        .or_else(|| value.pointer("/winner"))
        .filter(|w| w.is_object());

    let text = |key: &str| {
        winner
            .and_then(|w| w.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    (text("name"), text("comment"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::FixedOffset;

    pub(crate) async fn memory_pool() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        init_database_with_pool(&pool).await.unwrap();
        pool
    }

    pub(crate) fn sample_record(id: i64, kickoff: &str) -> FixtureRecord {
        FixtureRecord {
            fixture: Fixture {
                id,
                kickoff: DateTime::<FixedOffset>::parse_from_rfc3339(kickoff).unwrap(),
                status: "NS".to_string(),
                league_name: "Serie A".to_string(),
                home_team_id: 1,
                home_team: "Bahia".to_string(),
                away_team_id: 2,
                away_team: "Vitória".to_string(),
                home_goals: None,
                away_goals: None,
                odds: None,
                predicted_winner: None,
                prediction_comment: None,
                analysis: None,
            },
            statistics: Some(r#"{"form":"WWDLW"}"#.to_string()),
            predictions: Some(
                r#"{"predictions":{"winner":{"id":1,"name":"Bahia","comment":"Win or draw"}}}"#.to_string(),
            ),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_roundtrip() {
        let pool = memory_pool().await;
        let record = sample_record(100, "2024-05-01T19:00:00-03:00");
        upsert_fixture(&pool, &record).await.unwrap();

        let stored = get_fixture_by_id(&pool, 100).await.unwrap().unwrap();
        assert_eq!(stored.fixture.kickoff, record.fixture.kickoff);
        assert_eq!(stored.fixture.predicted_winner.as_deref(), Some("Bahia"));
        assert_eq!(stored.fixture.prediction_comment.as_deref(), Some("Win or draw"));
        assert_eq!(stored.statistics, record.statistics);
        assert!(get_fixture_by_id(&pool, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_by_date_prefix() {
        let pool = memory_pool().await;
        upsert_fixture(&pool, &sample_record(1, "2024-05-01T15:00:00-03:00")).await.unwrap();
        upsert_fixture(&pool, &sample_record(2, "2024-05-01T21:00:00-03:00")).await.unwrap();
        upsert_fixture(&pool, &sample_record(3, "2024-05-02T15:00:00-03:00")).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let ids: Vec<i64> = scan_fixtures_by_date(&pool, day)
            .await
            .unwrap()
            .iter()
            .map(|r| r.fixture.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_update_analysis_and_keep_it_on_refresh() {
        let pool = memory_pool().await;
        let mut record = sample_record(7, "2024-05-01T19:00:00-03:00");
        upsert_fixture(&pool, &record).await.unwrap();

        let analysis = AnalysisResult {
            win_or_draw: true,
            ..AnalysisResult::default()
        };
        update_analysis_result(&pool, 7, &analysis).await.unwrap();

        record.fixture.status = "FT".to_string();
        record.fixture.home_goals = Some(1);
        record.fixture.away_goals = Some(1);
        upsert_fixture(&pool, &record).await.unwrap();

        let stored = get_fixture_by_id(&pool, 7).await.unwrap().unwrap();
        assert_eq!(stored.fixture.status, "FT");
        assert_eq!(stored.fixture.analysis, Some(analysis));
    }

    #[tokio::test]
    async fn test_update_missing_fixture_fails() {
        let pool = memory_pool().await;
        assert!(update_analysis_result(&pool, 42, &AnalysisResult::default()).await.is_err());
    }

    #[test]
    fn test_predicted_winner_from_payload() {
        let (name, comment) = predicted_winner_from_payload(r#"{"winner":{"name":"Santos","comment":null}}"#);
        assert_eq!(name.as_deref(), Some("Santos"));
        assert_eq!(comment, None);
        assert_eq!(predicted_winner_from_payload("not json"), (None, None));
    }
}
