pub mod analysis_worker;
pub mod ev_engine;
pub mod extractor;
pub mod fixture_filter;
pub mod gemini;
pub mod grader;
pub mod markets;
pub mod messages;
pub mod multibet;
pub mod prompt;
pub mod report;
pub mod telegram;
pub mod throttle;

pub use analysis_worker::AnalysisWorker;
pub use fixture_filter::FixtureFilter;
pub use gemini::{AiClient, GeminiClient};
pub use grader::OutcomeGrader;
pub use multibet::MultiBetService;
pub use report::ReportComposer;
pub use telegram::{Delivery, Notifier, TelegramNotifier};
pub use throttle::AiGate;
