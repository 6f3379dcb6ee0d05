use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{init_database, scan_fixtures_by_date, upsert_fixture};
use crate::models::{Fixture, FixtureRecord, Grade};
use crate::queue;
use crate::services::{
    AiClient, AiGate, AnalysisWorker, FixtureFilter, GeminiClient, MultiBetService, Notifier, OutcomeGrader,
    ReportComposer, TelegramNotifier,
};

fn clients(config: &Config) -> Result<(Arc<dyn AiClient>, Arc<dyn Notifier>)> {
    let ai = GeminiClient::new(config)?;
    if !ai.has_api_key() {
        println!("⚠️  GEMINI_API_KEY is not set; AI analysis will be skipped");
    }
    Ok((Arc::new(ai), Arc::new(TelegramNotifier::new(config))))
}

pub async fn init_db(config: &Config) -> Result<()> {
    init_database(&config.database_url).await?;
    println!("✅ Database ready at {}", config.database_url);
    Ok(())
}

pub async fn import_fixtures(config: &Config, file: &Path) -> Result<()> {
    let pool = init_database(&config.database_url).await?;

    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let records: Vec<FixtureRecord> =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of fixtures", file.display()))?;

    println!("📥 Importing {} fixtures from {}...", records.len(), file.display());
    for record in &records {
        upsert_fixture(&pool, record).await?;
    }
    println!("✅ Imported {} fixtures", records.len());
    Ok(())
}

/// Enqueue the sweep's opportunities, then drain them here with the worker.
pub async fn sweep(config: &Config, date: Option<NaiveDate>, upcoming: bool) -> Result<()> {
    let pool = init_database(&config.database_url).await?;
    let (ai, notifier) = clients(config)?;
    let (queue, consumer) = queue::channel();

    let filter = FixtureFilter::new(pool.clone(), queue, config.upcoming_window);
    let outcome = if upcoming {
        println!("🔎 Sweeping fixtures kicking off in the next {} hours...", config.upcoming_window.num_hours());
        filter.run_upcoming_sweep(Utc::now()).await?
    } else {
        let date = date.unwrap_or_else(|| config.today());
        println!("🔎 Sweeping fixtures for {}...", date);
        filter.run_daily_sweep(date).await?
    };
    // Last producer gone: the worker stops once the queue is empty.
    drop(filter);

    println!(
        "📋 {} enqueued | {} without statistics | {} already analyzed | {} failed",
        outcome.enqueued, outcome.discarded, outcome.skipped, outcome.failed
    );
    if outcome.enqueued == 0 {
        return Ok(());
    }

    let worker = AnalysisWorker::new(pool, ai, notifier, config);
    worker.run(consumer).await;
    println!("✅ Sweep finished");
    Ok(())
}

pub async fn analyze(config: &Config, id: i64) -> Result<()> {
    let pool = init_database(&config.database_url).await?;
    let (ai, notifier) = clients(config)?;
    let worker = AnalysisWorker::new(pool, ai, notifier, config);

    println!("🤖 Analyzing fixture {}...\n", id);
    println!("{}", worker.analyze_fixture(id).await);
    Ok(())
}

pub async fn report(config: &Config, date: Option<NaiveDate>, dry_run: bool) -> Result<()> {
    let pool = init_database(&config.database_url).await?;
    let composer = ReportComposer::new(pool, Arc::new(TelegramNotifier::new(config)), config);
    let date = date.unwrap_or_else(|| config.today());

    if dry_run {
        let (chunks, _) = composer.preview(date).await?;
        if chunks.is_empty() {
            println!("📭 No fixtures stored for {}", date);
        }
        for (i, chunk) in chunks.iter().enumerate() {
            println!("── part {}/{} ──\n{}", i + 1, chunks.len(), chunk);
        }
        return Ok(());
    }

    let sent = composer.send_daily_report(date).await?;
    if sent == 0 {
        println!("📭 Nothing delivered for {}. Check TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID", date);
    } else {
        println!("📨 Sent {} report part(s) for {}", sent, date);
    }
    Ok(())
}

pub async fn multiples(config: &Config, date: Option<NaiveDate>) -> Result<()> {
    let pool = init_database(&config.database_url).await?;
    let (ai, notifier) = clients(config)?;
    let gate = Arc::new(AiGate::new(config.worker_cooldown));
    let service = MultiBetService::new(pool, ai, notifier, gate);
    let date = date.unwrap_or_else(|| config.today());

    println!("🎰 Building multiples for {}...", date);
    let sent = service.generate_and_send(date).await?;
    if sent == 0 {
        println!("📭 No multiples sent. Analyze more fixtures first with: betforge sweep");
    } else {
        println!("✅ Sent {} multiples", sent);
    }
    Ok(())
}

pub async fn export(config: &Config, date: NaiveDate, out: &Path) -> Result<()> {
    let pool = init_database(&config.database_url).await?;
    let written = write_export(&pool, config, date, out).await?;
    println!("💾 Exported {} fixtures to {}", written, out.display());
    Ok(())
}

/// Render the day's graded fixtures in memory, then write the file asynchronously.
async fn write_export(pool: &SqlitePool, config: &Config, date: NaiveDate, out: &Path) -> Result<usize> {
    let rows = graded_rows(pool, date, &OutcomeGrader::new(config.default_stake), config).await?;
    let mut buffer = Vec::new();
    let written = write_csv(&rows, &mut buffer)?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(out, buffer)
        .await
        .with_context(|| format!("cannot write {}", out.display()))?;
    Ok(written)
}

#[derive(Debug, Serialize)]
pub struct ExportRow {
    pub id: i64,
    pub league: String,
    pub kickoff: String,
    pub home_team: String,
    pub away_team: String,
    pub score: String,
    pub status: String,
    pub api_grade: Grade,
    pub api_return: f64,
    pub ai_market: String,
    pub ai_grade: Grade,
}

fn export_row(fixture: &Fixture, grader: &OutcomeGrader, config: &Config) -> ExportRow {
    let outcome = grader.grade(fixture);
    ExportRow {
        id: fixture.id,
        league: fixture.league_name.clone(),
        kickoff: fixture.kickoff.with_timezone(&config.report_offset).format("%Y-%m-%d %H:%M").to_string(),
        home_team: fixture.home_team.clone(),
        away_team: fixture.away_team.clone(),
        score: fixture
            .final_score()
            .map(|(h, a)| format!("{}-{}", h, a))
            .unwrap_or_default(),
        status: fixture.status.clone(),
        api_grade: outcome.as_ref().map_or(Grade::Unknown, |o| o.api_grade),
        api_return: outcome.as_ref().map_or(0.0, |o| o.api_return),
        ai_market: fixture
            .analysis
            .as_ref()
            .map(|a| a.bet_suggestion.market.clone())
            .unwrap_or_default(),
        ai_grade: outcome.as_ref().map_or(Grade::NotApplicable, |o| o.ai_grade),
    }
}

async fn graded_rows(
    pool: &SqlitePool,
    date: NaiveDate,
    grader: &OutcomeGrader,
    config: &Config,
) -> Result<Vec<ExportRow>> {
    let records = scan_fixtures_by_date(pool, date).await?;
    Ok(records.iter().map(|r| export_row(&r.fixture, grader, config)).collect())
}

pub fn write_csv<W: Write>(rows: &[ExportRow], sink: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(sink);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{memory_pool, sample_record};

    #[tokio::test]
    async fn test_export_grades_each_fixture() {
        let pool = memory_pool().await;
        let mut finished = sample_record(1, "2024-05-01T16:00:00-03:00");
        finished.fixture.status = "FT".to_string();
        finished.fixture.home_goals = Some(2);
        finished.fixture.away_goals = Some(0);
        finished.fixture.predicted_winner = Some("Bahia".to_string());
        finished.fixture.prediction_comment = Some("Winner : Bahia".to_string());
        upsert_fixture(&pool, &finished).await.unwrap();
        upsert_fixture(&pool, &sample_record(2, "2024-05-01T21:00:00-03:00")).await.unwrap();

        let config = Config::default();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let rows = graded_rows(&pool, date, &OutcomeGrader::new(5.0), &config).await.unwrap();

        let mut buffer = Vec::new();
        assert_eq!(write_csv(&rows, &mut buffer).unwrap(), 2);
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,league,kickoff,home_team,away_team,score,status,api_grade"));
        assert!(lines[1].starts_with("1,Serie A,2024-05-01 16:00,Bahia,Vitória,2-0,FT,GREEN"));
        assert!(lines[2].contains(",NS,UNKNOWN,"));
        assert!(lines[2].ends_with(",NOT_APPLICABLE"));
    }

    #[tokio::test]
    async fn test_export_writes_file() {
        let pool = memory_pool().await;
        upsert_fixture(&pool, &sample_record(1, "2024-05-01T16:00:00-03:00")).await.unwrap();
        let out = std::env::temp_dir()
            .join(format!("betforge-{}", uuid::Uuid::new_v4()))
            .join("export.csv");

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let written = write_export(&pool, &Config::default(), date, &out).await.unwrap();
        assert_eq!(written, 1);

        let text = tokio::fs::read_to_string(&out).await.unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("1,Serie A,"));
        tokio::fs::remove_dir_all(out.parent().unwrap()).await.unwrap();
    }
}
