use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::{init_database, scan_fixtures_by_date};
use crate::models::{ApiResponse, Fixture};
use crate::queue::{self, QueueConsumer};
use crate::services::fixture_filter::FilterOutcome;
use crate::services::report::ReportStats;
use crate::services::{
    AiClient, AnalysisWorker, FixtureFilter, GeminiClient, MultiBetService, Notifier, ReportComposer,
    TelegramNotifier,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub filter: Arc<FixtureFilter>,
    pub worker: Arc<AnalysisWorker>,
    pub reports: Arc<ReportComposer>,
    pub multibets: Arc<MultiBetService>,
}

impl AppState {
    /// Wire every service around one pool and one AI gate. The returned
    /// consumer belongs to the single analysis worker.
    pub fn new(
        pool: SqlitePool,
        config: Config,
        ai: Arc<dyn AiClient>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, QueueConsumer) {
        let (queue, consumer) = queue::channel();
        let worker = AnalysisWorker::new(pool.clone(), ai.clone(), notifier.clone(), &config);
        let gate = worker.gate();
        let state = Self {
            filter: Arc::new(FixtureFilter::new(pool.clone(), queue, config.upcoming_window)),
            worker: Arc::new(worker),
            reports: Arc::new(ReportComposer::new(pool.clone(), notifier.clone(), &config)),
            multibets: Arc::new(MultiBetService::new(pool.clone(), ai, notifier, gate)),
            config: Arc::new(config),
            pool,
        };
        (state, consumer)
    }
}

pub async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let pool = init_database(&config.database_url).await?;
    let ai: Arc<dyn AiClient> = Arc::new(GeminiClient::new(&config)?);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&config));
    let (state, consumer) = AppState::new(pool, config, ai, notifier);

    let worker = state.worker.clone();
    tokio::spawn(async move { worker.run(consumer).await });

    let filter = state.filter.clone();
    let every = state.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = filter.run_upcoming_sweep(Utc::now()).await {
                tracing::error!("Scheduled upcoming sweep failed: {:#}", e);
            }
        }
    });
    tracing::info!("Upcoming sweep scheduled every {:?}", every);

    let app = create_router().with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("BetForge API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/fixtures", get(get_fixtures_handler))
        .route("/fixtures/filter", post(daily_sweep_handler))
        .route("/fixtures/filter-upcoming", post(upcoming_sweep_handler))
        .route("/fixtures/{id}/analyze", get(analyze_fixture_handler))
        .route("/fixtures/multiples", post(multiples_handler))
        .route("/reports/daily", get(preview_report_handler).post(send_report_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("BetForge API is running"))
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<NaiveDate>,
}

impl DateQuery {
    fn or_today(&self, config: &Config) -> NaiveDate {
        self.date.unwrap_or_else(|| config.today())
    }
}

// GET /fixtures?date= - Stored fixtures of a day, analysis attached
async fn get_fixtures_handler(
    State(state): State<AppState>,
    Query(params): Query<DateQuery>,
) -> Result<Json<ApiResponse<Vec<Fixture>>>, StatusCode> {
    let date = params.or_today(&state.config);
    match scan_fixtures_by_date(&state.pool, date).await {
        Ok(records) => Ok(Json(ApiResponse::success(
            records.into_iter().map(|r| r.fixture).collect(),
        ))),
        Err(e) => {
            tracing::error!("Failed to fetch fixtures for {}: {}", date, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// POST /fixtures/filter?date= - Daily sweep
async fn daily_sweep_handler(
    State(state): State<AppState>,
    Query(params): Query<DateQuery>,
) -> Result<Json<ApiResponse<FilterOutcome>>, StatusCode> {
    match state.filter.run_daily_sweep(params.or_today(&state.config)).await {
        Ok(outcome) => Ok(Json(ApiResponse::success(outcome))),
        Err(e) => {
            tracing::error!("Daily sweep failed: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// POST /fixtures/filter-upcoming - Sweep of the next few hours
async fn upcoming_sweep_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<FilterOutcome>>, StatusCode> {
    match state.filter.run_upcoming_sweep(Utc::now()).await {
        Ok(outcome) => Ok(Json(ApiResponse::success(outcome))),
        Err(e) => {
            tracing::error!("Upcoming sweep failed: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// GET /fixtures/{id}/analyze - On-demand analysis as text
async fn analyze_fixture_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Json<ApiResponse<String>> {
    Json(ApiResponse::success(state.worker.analyze_fixture(id).await))
}

// POST /fixtures/multiples?date= - Accumulator suggestions sent to the chat
async fn multiples_handler(
    State(state): State<AppState>,
    Query(params): Query<DateQuery>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    match state.multibets.generate_and_send(params.or_today(&state.config)).await {
        Ok(0) => Ok(Json(ApiResponse::error(
            "Nenhuma múltipla gerada: jogos analisados insuficientes.".to_string(),
        ))),
        Ok(sent) => Ok(Json(ApiResponse::success(format!("{} múltiplas enviadas.", sent)))),
        Err(e) => {
            tracing::error!("Multiples generation failed: {:#}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Serialize)]
struct ReportPreview {
    date: NaiveDate,
    chunks: Vec<String>,
    stats: ReportStats,
}

// GET /reports/daily?date= - Report chunks without sending
async fn preview_report_handler(
    State(state): State<AppState>,
    Query(params): Query<DateQuery>,
) -> Result<Json<ApiResponse<ReportPreview>>, StatusCode> {
    let date = params.or_today(&state.config);
    match state.reports.preview(date).await {
        Ok((chunks, stats)) => Ok(Json(ApiResponse::success(ReportPreview { date, chunks, stats }))),
        Err(e) => {
            tracing::error!("Failed to compose report for {}: {:#}", date, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// POST /reports/daily?date= - Compose and send
async fn send_report_handler(
    State(state): State<AppState>,
    Query(params): Query<DateQuery>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    let date = params.or_today(&state.config);
    match state.reports.send_daily_report(date).await {
        Ok(sent) => Ok(Json(ApiResponse::success(format!(
            "Relatório de {} enviado em {} parte(s).",
            date.format("%d/%m/%Y"),
            sent
        )))),
        Err(e) => {
            tracing::error!("Failed to send report for {}: {:#}", date, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{memory_pool, sample_record};
    use crate::db::{update_analysis_result, upsert_fixture};
    use crate::error::{self, AnalysisError};
    use crate::models::{AnalysisResult, BetSuggestion};
    use crate::services::Delivery;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct OfflineAi;

    #[async_trait]
    impl AiClient for OfflineAi {
        async fn analyze(&self, _prompt: &str) -> error::Result<String> {
            Err(AnalysisError::ConfigMissing("GEMINI_API_KEY"))
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn send_chunk(&self, _text: &str, _part: usize, _total: usize) -> error::Result<Delivery> {
            Ok(Delivery::Sent)
        }
    }

    async fn state() -> (AppState, QueueConsumer) {
        let pool = memory_pool().await;
        upsert_fixture(&pool, &sample_record(10, "2024-05-01T16:00:00-03:00")).await.unwrap();
        let mut no_stats = sample_record(11, "2024-05-01T18:00:00-03:00");
        no_stats.statistics = None;
        upsert_fixture(&pool, &no_stats).await.unwrap();
        AppState::new(pool, Config::default(), Arc::new(OfflineAi), Arc::new(SilentNotifier))
    }

    fn may_first() -> Query<DateQuery> {
        Query(DateQuery {
            date: NaiveDate::from_ymd_opt(2024, 5, 1),
        })
    }

    #[tokio::test]
    async fn test_fixtures_by_date() {
        let (state, _consumer) = state().await;
        let Json(response) = get_fixtures_handler(State(state), may_first()).await.unwrap();
        let ids: Vec<i64> = response.data.unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_daily_sweep_enqueues_for_the_worker() {
        let (state, mut consumer) = state().await;
        let Json(response) = daily_sweep_handler(State(state), may_first()).await.unwrap();
        let outcome = response.data.unwrap();
        assert_eq!(outcome.enqueued, 1);
        assert_eq!(outcome.discarded, 1);

        let message = consumer.recv().await.unwrap();
        assert_eq!(message.decode().unwrap().fixture.id, 10);
    }

    #[tokio::test]
    async fn test_report_preview_and_missing_fixture_analysis() {
        let (state, _consumer) = state().await;
        let Json(preview) = preview_report_handler(State(state.clone()), may_first()).await.unwrap();
        let preview = preview.data.unwrap();
        assert_eq!(preview.chunks.len(), 1);
        assert_eq!(preview.stats.total_games, 2);

        let Json(text) = analyze_fixture_handler(State(state), Path(999)).await;
        assert_eq!(text.data.unwrap(), "⚠️ Jogo 999 não encontrado.");
    }

    /// Answers slowly and records how many calls overlapped.
    #[derive(Default)]
    struct SlowAi {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AiClient for SlowAi {
        async fn analyze(&self, _prompt: &str) -> error::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(r#"{"bet_suggestion":{"market":"Vitoria do Bahia","odd_bookmaker":1.9,"probability_ai":0.6}}"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_ai_calls_never_overlap_across_services() {
        let pool = memory_pool().await;
        for id in 1..=5 {
            upsert_fixture(&pool, &sample_record(id, "2024-05-01T19:00:00-03:00")).await.unwrap();
        }
        let analyzed = AnalysisResult {
            bet_suggestion: BetSuggestion {
                market: "Vitoria do Bahia".to_string(),
                odd_bookmaker: 1.8,
                probability_ai: 0.6,
                ..BetSuggestion::default()
            },
            ..AnalysisResult::default()
        };
        for id in 2..=5 {
            update_analysis_result(&pool, id, &analyzed).await.unwrap();
        }

        let ai = Arc::new(SlowAi::default());
        let config = Config {
            ai_retry_delay: Duration::ZERO,
            worker_cooldown: Duration::from_millis(10),
            ..Config::default()
        };
        let (state, mut consumer) = AppState::new(pool, config, ai.clone(), Arc::new(SilentNotifier));
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(state.filter.run_daily_sweep(day).await.unwrap().enqueued, 1);
        let message = consumer.recv().await.unwrap();

        let (queued, on_demand, multiples) = tokio::join!(
            state.worker.process_message(&message),
            state.worker.analyze_fixture(1),
            state.multibets.generate_and_send(day)
        );
        assert!(queued.is_some());
        assert!(on_demand.contains("EV positivo"));
        assert_eq!(multiples.unwrap(), 0);
        assert_eq!(ai.calls.load(Ordering::SeqCst), 3);
        assert_eq!(ai.peak.load(Ordering::SeqCst), 1);
    }
}
