use anyhow::Result;
use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db::scan_fixtures_by_date;
use crate::models::{Fixture, Grade, GradedOutcome};
use crate::services::grader::OutcomeGrader;
use crate::services::telegram::{Delivery, Notifier};
use crate::utils::{char_len, format_money, win_rate};

/// Budget per chunk while league blocks are being added.
pub const CHUNK_SOFT_LIMIT: usize = 3000;
/// Budget for the last chunk once the statistics block is appended.
pub const CHUNK_FINAL_LIMIT: usize = 4000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct ReportStats {
    pub total_games: usize,
    pub api_greens: u32,
    pub api_reds: u32,
    pub api_net: f64,
    pub ai_greens: u32,
    pub ai_reds: u32,
    pub ai_not_applicable: u32,
}

impl ReportStats {
    fn record(&mut self, outcome: &GradedOutcome) {
        match outcome.api_grade {
            Grade::Green => self.api_greens += 1,
            Grade::Red => self.api_reds += 1,
            Grade::Unknown | Grade::NotApplicable => {}
        }
        self.api_net += outcome.api_return;

        match outcome.ai_grade {
            Grade::Green => self.ai_greens += 1,
            Grade::Red => self.ai_reds += 1,
            Grade::Unknown | Grade::NotApplicable => self.ai_not_applicable += 1,
        }
    }

    fn api_processed(&self) -> u32 {
        self.api_greens + self.api_reds
    }

    fn ai_processed(&self) -> u32 {
        self.ai_greens + self.ai_reds
    }
}

fn grade_icon(grade: Grade) -> &'static str {
    match grade {
        Grade::Green => "✅",
        Grade::Red => "❌",
        Grade::Unknown | Grade::NotApplicable => "❓",
    }
}

fn render_line(fixture: &Fixture, outcome: Option<&GradedOutcome>, offset: &FixedOffset) -> String {
    let time = fixture.kickoff.with_timezone(offset).format("%H:%M");
    let icon = outcome.map(|o| format!("{} ", grade_icon(o.api_grade))).unwrap_or_default();
    let ai = outcome
        .filter(|o| o.ai_grade.is_decided())
        .map(|o| format!(" | 🤖 {}", grade_icon(o.ai_grade)))
        .unwrap_or_default();

    match fixture.final_score() {
        Some((home, away)) if outcome.is_some() => format!(
            "{}{} {} x {} {} - ⏰ {}{}\n",
            icon, fixture.home_team, home, away, fixture.away_team, time, ai
        ),
        _ => format!("{}{} x {} - ⏰ {}{}\n", icon, fixture.home_team, fixture.away_team, time, ai),
    }
}

fn render_summary(stats: &ReportStats) -> String {
    let mut summary = String::from("\n📊 *RESUMO DO DIA*\n");
    summary.push_str(&format!("Total de jogos: {}\n", stats.total_games));

    if stats.api_processed() > 0 {
        summary.push_str("\n*Palpites da API*\n");
        summary.push_str(&format!("✅ Greens: {}\n", stats.api_greens));
        summary.push_str(&format!("❌ Reds: {}\n", stats.api_reds));
        summary.push_str(&format!("📈 Acertos: {:.1}%\n", win_rate(stats.api_greens, stats.api_reds)));
        summary.push_str(&format!("📉 Falhas: {:.1}%\n", win_rate(stats.api_reds, stats.api_greens)));
        summary.push_str(&format!("💰 Saldo: {}\n", format_money(stats.api_net)));
    }

    if stats.ai_processed() > 0 {
        summary.push_str("\n*Palpites da IA* 🤖\n");
        summary.push_str(&format!("✅ Greens: {}\n", stats.ai_greens));
        summary.push_str(&format!("❌ Reds: {}\n", stats.ai_reds));
        summary.push_str(&format!("📈 Acertos: {:.1}%\n", win_rate(stats.ai_greens, stats.ai_reds)));
        summary.push_str(&format!("⚪ Sem palpite: {}\n", stats.ai_not_applicable));
    }
    summary
}

/// Render the day's fixtures into chat-sized chunks. Pure: no I/O.
pub fn compose(
    date: NaiveDate,
    fixtures: &[Fixture],
    grader: &OutcomeGrader,
    offset: &FixedOffset,
) -> (Vec<String>, ReportStats) {
    let mut stats = ReportStats {
        total_games: fixtures.len(),
        ..ReportStats::default()
    };
    if fixtures.is_empty() {
        return (Vec::new(), stats);
    }

    // Leagues keep the order they are first seen in.
    let mut leagues: Vec<(&str, Vec<&Fixture>)> = Vec::new();
    for fixture in fixtures {
        match leagues.iter_mut().find(|(name, _)| *name == fixture.league_name) {
            Some((_, group)) => group.push(fixture),
            None => leagues.push((fixture.league_name.as_str(), vec![fixture])),
        }
    }

    let mut chunks = Vec::new();
    let mut current = format!("⚽ *Jogos do dia - {}*\n\n", date.format("%d/%m/%Y"));
    let mut has_content = false;

    for (league, mut group) in leagues {
        group.sort_by_key(|f| f.kickoff);

        let mut block = format!("🏆 *{}*\n", league);
        for fixture in group {
            let outcome = grader.grade(fixture);
            if let Some(outcome) = &outcome {
                stats.record(outcome);
            }
            block.push_str(&render_line(fixture, outcome.as_ref(), offset));
        }
        block.push('\n');

        if has_content && char_len(&current) + char_len(&block) > CHUNK_SOFT_LIMIT {
            chunks.push(std::mem::replace(&mut current, block));
        } else {
            current.push_str(&block);
        }
        has_content = true;
    }

    if stats.api_processed() > 0 || stats.ai_processed() > 0 {
        let summary = render_summary(&stats);
        if char_len(&current) + char_len(&summary) > CHUNK_FINAL_LIMIT {
            chunks.push(std::mem::replace(&mut current, summary));
        } else {
            current.push_str(&summary);
        }
    }
    chunks.push(current);

    (chunks, stats)
}

pub struct ReportComposer {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    grader: OutcomeGrader,
    offset: FixedOffset,
}

impl ReportComposer {
    pub fn new(pool: SqlitePool, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            pool,
            notifier,
            grader: OutcomeGrader::new(config.default_stake),
            offset: config.report_offset,
        }
    }

    pub async fn preview(&self, date: NaiveDate) -> Result<(Vec<String>, ReportStats)> {
        let fixtures: Vec<Fixture> = scan_fixtures_by_date(&self.pool, date)
            .await?
            .into_iter()
            .map(|record| record.fixture)
            .collect();
        Ok(compose(date, &fixtures, &self.grader, &self.offset))
    }

    /// Compose and deliver the report. Returns how many chunks actually went
    /// out; parts skipped for lack of a configured chat are not counted.
    pub async fn send_daily_report(&self, date: NaiveDate) -> Result<usize> {
        let (chunks, stats) = self.preview(date).await?;
        if chunks.is_empty() {
            tracing::info!("No fixtures for {}, skipping report", date);
            return Ok(0);
        }

        tracing::info!(
            "Sending {} report part(s) for {} ({} fixtures)",
            chunks.len(),
            date,
            stats.total_games
        );
        let total = chunks.len();
        let mut sent = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            match self.notifier.send_chunk(chunk, i + 1, total).await {
                Ok(Delivery::Sent) => sent += 1,
                Ok(Delivery::Skipped) => tracing::warn!("Report part {}/{} skipped: no chat configured", i + 1, total),
                Err(e) => tracing::error!("Report part {}/{} not delivered: {}", i + 1, total, e),
            }
        }
        Ok(sent)
    }
}
