//! Accumulator suggestions built by the AI from the day's analyzed fixtures.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::db::scan_fixtures_by_date;
use crate::models::{Fixture, STATUS_NOT_STARTED};
use crate::services::extractor;
use crate::services::gemini::AiClient;
use crate::services::telegram::{Delivery, Notifier};
use crate::services::throttle::AiGate;
use crate::utils::{lenient_f64, lenient_opt_i64};

pub const MIN_ANALYZED_FIXTURES: usize = 4;
pub const LEG_COUNTS: [usize; 4] = [4, 6, 8, 10];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MultiBetLeg {
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub id_fixture: Option<i64>,
    #[serde(default)]
    pub team_a: Option<String>,
    #[serde(default)]
    pub team_b: Option<String>,
    #[serde(default)]
    pub game_date: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub odd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MultiBetSuggestion {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub size: Option<i64>,
    #[serde(default)]
    pub legs: Vec<MultiBetLeg>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub final_odd: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_probability: f64,
}

impl MultiBetSuggestion {
    /// The stated combined odd, or the product of the leg odds when the
    /// model left it out.
    pub fn combined_odd(&self) -> f64 {
        if self.final_odd > 0.0 {
            return self.final_odd;
        }
        self.legs.iter().map(|leg| leg.odd).filter(|odd| *odd > 0.0).product()
    }

    /// Probability as a percentage; fractions are scaled up.
    pub fn probability_percent(&self) -> f64 {
        if self.total_probability > 0.0 && self.total_probability <= 1.0 {
            self.total_probability * 100.0
        } else {
            self.total_probability
        }
    }
}

pub fn build_multibet_prompt(fixtures: &[Fixture]) -> String {
    let lines = fixtures
        .iter()
        .filter_map(|fixture| {
            let analysis = fixture.analysis.as_ref()?;
            let line = json!({
                "id": fixture.id,
                "home": fixture.home_team,
                "away": fixture.away_team,
                "date": fixture.kickoff.to_rfc3339(),
                "suggestion": analysis.bet_suggestion.market,
                "odd": analysis.bet_suggestion.odd_bookmaker,
                "prob": analysis.bet_suggestion.probability_ai,
                "goals": analysis.goals_market.target,
                "goals_odd": analysis.goals_market.odd,
                "full_odds_context": fixture.odds.as_deref().unwrap_or("{}"),
            });
            Some(line.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n");

    let skeleton = json!({
        "multiples": [{
            "title": "Múltipla de 4 seleções",
            "size": 4,
            "legs": [{
                "id_fixture": 123,
                "team_a": "Time A",
                "team_b": "Time B",
                "game_date": "dd/MM HH:mm",
                "market": "Vitoria do Time A",
                "odd": 1.50,
            }],
            "final_odd": 5.06,
            "total_probability": 0.35,
        }]
    });
    let skeleton = serde_json::to_string_pretty(&skeleton).unwrap_or_default();
    let sizes = LEG_COUNTS.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ");

    format!(
        r#"Você é um especialista em apostas múltiplas de futebol.
Abaixo estão os jogos do dia já analisados, um por linha em JSON:

{lines}

REGRAS:
1. Monte exatamente {count} múltiplas, com {sizes} seleções respectivamente.
2. Use apenas jogos da lista e no máximo uma seleção por jogo em cada múltipla.
3. Você pode trocar o mercado sugerido por outro presente em 'full_odds_context' se ele for mais seguro.
4. 'final_odd' é o produto das odds das seleções; 'total_probability' é uma fração de 0 a 1.
5. Responda somente com JSON puro, sem markdown, em português do Brasil.

ESTRUTURA OBRIGATÓRIA:
{skeleton}
"#,
        lines = lines,
        count = LEG_COUNTS.len(),
        sizes = sizes,
        skeleton = skeleton,
    )
}

/// Decode whatever suggestions are well-formed, skipping the rest.
pub fn parse_multiples(value: &Value) -> Vec<MultiBetSuggestion> {
    let Some(items) = value.get("multiples").and_then(Value::as_array) else {
        tracing::warn!("AI answer has no 'multiples' array");
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value::<MultiBetSuggestion>(item.clone()) {
            Ok(suggestion) if !suggestion.legs.is_empty() => Some(suggestion),
            Ok(_) => {
                tracing::warn!("Multiple #{} has no legs, skipped", i + 1);
                None
            }
            Err(e) => {
                tracing::warn!("Multiple #{} could not be decoded: {}", i + 1, e);
                None
            }
        })
        .collect()
}

pub fn format_multibet(suggestion: &MultiBetSuggestion) -> String {
    let title = suggestion
        .title
        .clone()
        .or_else(|| suggestion.size.map(|n| format!("Múltipla de {} seleções", n)))
        .unwrap_or_else(|| format!("Múltipla de {} seleções", suggestion.legs.len()));

    let mut text = format!("🔥 *{}*\n\n", title);
    for leg in &suggestion.legs {
        text.push_str(&format!(
            "📍 {} | {} x {}\n",
            leg.game_date.as_deref().unwrap_or("-"),
            leg.team_a.as_deref().unwrap_or("?"),
            leg.team_b.as_deref().unwrap_or("?")
        ));
        text.push_str(&format!(
            "🎯 {} (@{:.2})\n\n",
            leg.market.as_deref().unwrap_or("Indisponível"),
            leg.odd
        ));
    }
    text.push_str(&format!("💰 *ODD FINAL: {:.2}*\n", suggestion.combined_odd()));
    text.push_str(&format!("📈 Probabilidade Estimada: {:.1}%", suggestion.probability_percent()));
    text
}

pub struct MultiBetService {
    pool: SqlitePool,
    ai: Arc<dyn AiClient>,
    notifier: Arc<dyn Notifier>,
    gate: Arc<AiGate>,
}

impl MultiBetService {
    /// `gate` must be the one the analysis worker uses.
    pub fn new(pool: SqlitePool, ai: Arc<dyn AiClient>, notifier: Arc<dyn Notifier>, gate: Arc<AiGate>) -> Self {
        Self {
            pool,
            ai,
            notifier,
            gate,
        }
    }

    /// Ask for the day's accumulators and send each as its own part.
    /// Returns how many suggestions were delivered.
    pub async fn generate_and_send(&self, date: NaiveDate) -> Result<usize> {
        let candidates: Vec<Fixture> = scan_fixtures_by_date(&self.pool, date)
            .await?
            .into_iter()
            .map(|record| record.fixture)
            .filter(|f| f.status == STATUS_NOT_STARTED && f.analysis.is_some())
            .collect();

        if candidates.len() < MIN_ANALYZED_FIXTURES {
            tracing::warn!(
                "Only {} analyzed fixture(s) for {}, at least {} needed for multiples",
                candidates.len(),
                date,
                MIN_ANALYZED_FIXTURES
            );
            return Ok(0);
        }

        tracing::info!("Requesting multiples from {} analyzed fixtures", candidates.len());
        let prompt = build_multibet_prompt(&candidates);
        let response = self.gate.exclusive(self.ai.analyze(&prompt)).await?;
        tracing::debug!("AI multiples response:\n{}", response);

        let value = extractor::extract(&response)?;
        let suggestions = parse_multiples(&value);
        if suggestions.is_empty() {
            tracing::warn!("AI returned no usable multiples for {}", date);
            return Ok(0);
        }

        let total = suggestions.len();
        let mut sent = 0;
        for (i, suggestion) in suggestions.iter().enumerate() {
            match self.notifier.send_chunk(&format_multibet(suggestion), i + 1, total).await {
                Ok(Delivery::Sent) => sent += 1,
                Ok(Delivery::Skipped) => tracing::warn!("Multiple {}/{} skipped: no chat configured", i + 1, total),
                Err(e) => tracing::error!("Multiple {}/{} not delivered: {}", i + 1, total, e),
            }
        }
        tracing::info!("Sent {}/{} multiples for {}", sent, total, date);
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{memory_pool, sample_record};
    use crate::db::{update_analysis_result, upsert_fixture};
    use crate::error::{self, AnalysisError};
    use crate::models::{AnalysisResult, BetSuggestion};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const ANSWER: &str = r#"Aqui estão:
```json
{"multiples":[
  {"title":"Múltipla Segura","size":"4","legs":[
    {"id_fixture":1,"team_a":"Bahia","team_b":"Vitória","game_date":"01/05 19:00","market":"Vitoria do Bahia","odd":"1,50"},
    {"id_fixture":2,"team_a":"Bahia","team_b":"Vitória","game_date":"01/05 19:00","market":"Mais de 1.5 Gols","odd":1.3}
  ],"final_odd":1.95,"total_probability":0.42},
  {"title":"Sem seleções","legs":[]},
  {"title":"Arrojada","legs":[{"team_a":"Bahia","team_b":"Vitória","odd":2.0},{"odd":3.0}],"total_probability":"12%"}
]}
```"#;

    struct FixedAi {
        answer: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AiClient for FixedAi {
        async fn analyze(&self, _prompt: &str) -> error::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.answer.is_empty() {
                return Err(AnalysisError::TransientAi("503".to_string()));
            }
            Ok(self.answer.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, usize, usize)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_chunk(&self, text: &str, part: usize, total: usize) -> error::Result<Delivery> {
            self.sent.lock().unwrap().push((text.to_string(), part, total));
            Ok(Delivery::Sent)
        }
    }

    fn analysis(market: &str) -> AnalysisResult {
        AnalysisResult {
            bet_suggestion: BetSuggestion {
                market: market.to_string(),
                odd_bookmaker: 1.8,
                probability_ai: 0.6,
                ..BetSuggestion::default()
            },
            ..AnalysisResult::default()
        }
    }

    async fn pool_with_analyzed(count: i64) -> SqlitePool {
        let pool = memory_pool().await;
        for id in 1..=count {
            upsert_fixture(&pool, &sample_record(id, "2024-05-01T19:00:00-03:00")).await.unwrap();
            update_analysis_result(&pool, id, &analysis("Vitoria do Bahia")).await.unwrap();
        }
        // Analyzed but already played: not a candidate.
        let mut finished = sample_record(99, "2024-05-01T13:00:00-03:00");
        finished.fixture.status = "FT".to_string();
        upsert_fixture(&pool, &finished).await.unwrap();
        update_analysis_result(&pool, 99, &analysis("Vitoria do Bahia")).await.unwrap();
        pool
    }

    fn service(pool: SqlitePool, answer: &str) -> (MultiBetService, Arc<FixedAi>, Arc<RecordingNotifier>) {
        service_behind(pool, answer, Arc::new(AiGate::new(Duration::ZERO)))
    }

    fn service_behind(
        pool: SqlitePool,
        answer: &str,
        gate: Arc<AiGate>,
    ) -> (MultiBetService, Arc<FixedAi>, Arc<RecordingNotifier>) {
        let ai = Arc::new(FixedAi {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        (MultiBetService::new(pool, ai.clone(), notifier.clone(), gate), ai, notifier)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_parse_skips_broken_entries() {
        let value = extractor::extract(ANSWER).unwrap();
        let multiples = parse_multiples(&value);
        assert_eq!(multiples.len(), 2);
        assert_eq!(multiples[0].size, Some(4));
        assert_eq!(multiples[0].legs[0].odd, 1.5);
        assert_eq!(multiples[1].combined_odd(), 6.0);
        assert_eq!(multiples[1].probability_percent(), 12.0);
    }

    #[test]
    fn test_format_lists_legs() {
        let value = extractor::extract(ANSWER).unwrap();
        let text = format_multibet(&parse_multiples(&value)[0]);
        assert!(text.starts_with("🔥 *Múltipla Segura*"));
        assert!(text.contains("📍 01/05 19:00 | Bahia x Vitória"));
        assert!(text.contains("🎯 Vitoria do Bahia (@1.50)"));
        assert!(text.contains("💰 *ODD FINAL: 1.95*"));
        assert!(text.contains("📈 Probabilidade Estimada: 42.0%"));
    }

    #[test]
    fn test_prompt_lists_analyzed_fixtures_only() {
        let mut with = sample_record(7, "2024-05-01T19:00:00-03:00").fixture;
        with.analysis = Some(analysis("Dupla Chance: Bahia ou Empate"));
        let without = sample_record(8, "2024-05-01T19:00:00-03:00").fixture;

        let prompt = build_multibet_prompt(&[with, without]);
        assert!(prompt.contains(r#""id":7"#));
        assert!(!prompt.contains(r#""id":8"#));
        assert!(prompt.contains("Dupla Chance: Bahia ou Empate"));
        assert!(prompt.contains("4, 6, 8, 10"));
    }

    #[tokio::test]
    async fn test_sends_each_multiple_as_a_part() {
        let (service, ai, notifier) = service(pool_with_analyzed(4).await, ANSWER);
        assert_eq!(service.generate_and_send(day()).await.unwrap(), 2);
        assert_eq!(ai.calls.load(Ordering::SeqCst), 1);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!((sent[0].1, sent[0].2), (1, 2));
        assert_eq!((sent[1].1, sent[1].2), (2, 2));
    }

    #[tokio::test]
    async fn test_too_few_fixtures_skips_ai() {
        let (service, ai, notifier) = service(pool_with_analyzed(3).await, ANSWER);
        assert_eq!(service.generate_and_send(day()).await.unwrap(), 0);
        assert_eq!(ai.calls.load(Ordering::SeqCst), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ai_failure_is_not_retried() {
        let (service, ai, _) = service(pool_with_analyzed(5).await, "");
        assert!(service.generate_and_send(day()).await.is_err());
        assert_eq!(ai.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waits_for_an_ai_call_in_progress() {
        let gate = Arc::new(AiGate::new(Duration::ZERO));
        let (service, ai, _) = service_behind(pool_with_analyzed(4).await, ANSWER, gate.clone());

        let held = gate.exclusive(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            ai.calls.load(Ordering::SeqCst)
        });
        let (calls_while_held, sent) = tokio::join!(held, service.generate_and_send(day()));
        assert_eq!(calls_while_held, 0);
        assert_eq!(sent.unwrap(), 2);
        assert_eq!(ai.calls.load(Ordering::SeqCst), 1);
    }
}
