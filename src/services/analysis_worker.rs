//! The single consumer of the opportunity queue.
//!
//! Every AI request goes through the shared [`AiGate`]: one request in flight
//! at a time across queued and on-demand analyses, each followed by a fixed
//! cooldown, so the AI provider sees a steady, predictable request rate.
//! Failures are logged and the message is dropped (at-most-once): a fixture
//! that still has no analysis is picked up again only by a later sweep.

use anyhow::Result;
use chrono::FixedOffset;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::{get_fixture_by_id, update_analysis_result};
use crate::error::AnalysisError;
use crate::models::{AnalysisResult, Fixture, FixtureRef, OpportunityContext, RawAnalysis, Teams, Winner};
use crate::queue::{QueueConsumer, QueueMessage};
use crate::services::ev_engine::EvEngine;
use crate::services::extractor;
use crate::services::fixture_filter::MISSING_PREDICTIONS;
use crate::services::gemini::AiClient;
use crate::services::markets::{self, Side};
use crate::services::messages::{format_analysis_alert, format_analysis_text};
use crate::services::prompt::build_analysis_prompt;
use crate::services::telegram::{Delivery, Notifier};
use crate::services::throttle::AiGate;

const MISSING_STATISTICS: &str = "Estatísticas não encontradas para este jogo.";

pub struct AnalysisWorker {
    pool: SqlitePool,
    ai: Arc<dyn AiClient>,
    notifier: Arc<dyn Notifier>,
    gate: Arc<AiGate>,
    engine: EvEngine,
    max_attempts: u32,
    retry_delay: Duration,
    report_offset: FixedOffset,
}

impl AnalysisWorker {
    pub fn new(pool: SqlitePool, ai: Arc<dyn AiClient>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        Self {
            pool,
            ai,
            notifier,
            gate: Arc::new(AiGate::new(config.worker_cooldown)),
            engine: EvEngine::new(),
            max_attempts: config.ai_max_attempts.max(1),
            retry_delay: config.ai_retry_delay,
            report_offset: config.report_offset,
        }
    }

    /// The gate every AI caller in this process must share with the worker.
    pub fn gate(&self) -> Arc<AiGate> {
        self.gate.clone()
    }

    /// Drain the queue until every producer is gone.
    pub async fn run(&self, mut consumer: QueueConsumer) {
        tracing::info!("Analysis worker started (cooldown {:?})", self.gate.cooldown());

        while let Some(message) = consumer.recv().await {
            self.process_message(&message).await;
        }

        tracing::info!("Opportunity queue closed, analysis worker stopping");
    }

    /// Handle one queued opportunity, cooldown included. Never fails: the
    /// message counts as consumed whatever happens.
    pub async fn process_message(&self, message: &QueueMessage) -> Option<AnalysisResult> {
        self.gate.exclusive(self.handle_message(message)).await
    }

    async fn handle_message(&self, message: &QueueMessage) -> Option<AnalysisResult> {
        tracing::info!("Processing queue message {}", message.id);

        let context = match message.decode() {
            Ok(context) => context,
            Err(e) => {
                tracing::error!("Dropping undecodable message {}: {}", message.id, e);
                return None;
            }
        };

        tracing::info!("Analyzing {} ({})", context.fixture.matchup(), context.fixture.id);
        match self.analyze_context(&context).await {
            Ok(result) => {
                self.notify_if_positive(&result, &context.fixture).await;
                Some(result)
            }
            Err(e) => {
                tracing::error!("Analysis of fixture {} failed: {:#}", context.fixture.id, e);
                None
            }
        }
    }

    /// Analyze one stored fixture right now and describe the result in text.
    /// Waits for its turn behind any analysis already in flight.
    pub async fn analyze_fixture(&self, id: i64) -> String {
        let record = match get_fixture_by_id(&self.pool, id).await {
            Ok(Some(record)) => record,
            Ok(None) => return format!("⚠️ Jogo {} não encontrado.", id),
            Err(e) => {
                tracing::error!("Failed to load fixture {}: {}", id, e);
                return format!("⚠️ Erro ao carregar o jogo {}.", id);
            }
        };

        let context = OpportunityContext {
            fixture: record.fixture,
            statistics: record.statistics.unwrap_or_else(|| MISSING_STATISTICS.to_string()),
            predictions: record.predictions.unwrap_or_else(|| MISSING_PREDICTIONS.to_string()),
        };

        match self.gate.exclusive(self.analyze_context(&context)).await {
            Ok(result) if result.is_positive() => format_analysis_text(&result, &context.fixture, &self.report_offset),
            Ok(result) => {
                tracing::info!(
                    "Analysis of fixture {} not shown: EV {:.2}",
                    id,
                    result.bet_suggestion.expected_value
                );
                "⚪ Análise descartada: valor esperado (EV) negativo.".to_string()
            }
            Err(e) => {
                tracing::error!("On-demand analysis of fixture {} failed: {:#}", id, e);
                "⚠️ Não foi possível concluir a análise deste jogo.".to_string()
            }
        }
    }

    async fn analyze_context(&self, context: &OpportunityContext) -> Result<AnalysisResult> {
        let fixture = &context.fixture;
        let prompt = build_analysis_prompt(context);

        let response = self.call_with_retry(&prompt, fixture.id).await?;
        tracing::debug!("AI response for fixture {}:\n{}", fixture.id, response);

        let value = extractor::extract(&response)?;
        let mut parsed: RawAnalysis = serde_json::from_value(value).map_err(AnalysisError::from)?;
        backfill_fixture(&mut parsed, fixture);

        let mut result = self.engine.normalize(parsed);
        resolve_winner(&mut result, fixture);

        update_analysis_result(&self.pool, fixture.id, &result).await?;
        tracing::info!(
            "Stored analysis for fixture {}: {} (EV {:.4}, {:?})",
            fixture.id,
            result.bet_suggestion.market,
            result.bet_suggestion.expected_value,
            result.bet_suggestion.status_ev
        );
        Ok(result)
    }

    /// Fixed-delay retry around the AI call. Only transient failures retry.
    async fn call_with_retry(&self, prompt: &str, fixture_id: i64) -> std::result::Result<String, AnalysisError> {
        let mut attempt = 1;
        loop {
            tracing::info!("AI attempt {}/{} for fixture {}", attempt, self.max_attempts, fixture_id);

            match self.ai.analyze(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "AI attempt {} for fixture {} failed: {}. Retrying in {:?}",
                        attempt,
                        fixture_id,
                        e,
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e @ AnalysisError::ConfigMissing(_)) => {
                    tracing::warn!("Skipping AI analysis of fixture {}: {}", fixture_id, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("AI call for fixture {} abandoned after {} attempt(s): {}", fixture_id, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn notify_if_positive(&self, result: &AnalysisResult, fixture: &Fixture) {
        if !result.is_positive() {
            tracing::info!("Analysis of fixture {} discarded: no positive EV", fixture.id);
            return;
        }

        let alert = format_analysis_alert(result, fixture, &self.report_offset);
        match self.notifier.send_chunk(&alert, 1, 1).await {
            Ok(Delivery::Sent) => tracing::info!("Positive EV alert sent for fixture {}", fixture.id),
            Ok(Delivery::Skipped) => tracing::info!("Positive EV alert for fixture {} not sent: no chat configured", fixture.id),
            // The analysis is already stored; a lost alert is not rolled back.
            Err(e) => tracing::error!("Alert for fixture {} not delivered: {}", fixture.id, e),
        }
    }
}

/// Fill the fixture identity the AI left out from the queued snapshot.
fn backfill_fixture(parsed: &mut RawAnalysis, fixture: &Fixture) {
    let reference = parsed.fixture.get_or_insert_with(FixtureRef::default);
    if reference.id.is_none() {
        reference.id = Some(fixture.id);
    }
    let teams_missing = reference
        .teams
        .as_ref()
        .map_or(true, |t| t.home.trim().is_empty() || t.away.trim().is_empty());
    if teams_missing {
        reference.teams = Some(Teams {
            home: fixture.home_team.clone(),
            away: fixture.away_team.clone(),
        });
    }
    if reference.date.is_none() {
        reference.date = Some(fixture.kickoff.to_rfc3339());
    }
}

/// Which team the chosen market backs, and whether it also pays on a draw.
pub fn resolve_winner(result: &mut AnalysisResult, fixture: &Fixture) {
    let market = &result.bet_suggestion.market;

    result.winner = match markets::resolve_side(market, &fixture.home_team, &fixture.away_team) {
        Some(Side::Home) => Some(Winner {
            id: fixture.home_team_id,
            name: fixture.home_team.clone(),
        }),
        Some(Side::Away) => Some(Winner {
            id: fixture.away_team_id,
            name: fixture.away_team.clone(),
        }),
        None => None,
    };
    result.win_or_draw = markets::is_win_or_draw(market);
}
