use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{lenient_bool, lenient_f64, lenient_opt_i64};

/// Short status codes that mean the score is final.
pub const FINISHED_STATUSES: &[&str] = &["FT", "AET", "PEN"];

/// Status codes kept by the daily sweep: not started, in play, or postponed
/// but still awaiting a new kick-off.
pub const DAILY_SWEEP_STATUSES: &[&str] = &["NS", "AET", "1H", "HT", "PEN", "PST"];

pub const STATUS_NOT_STARTED: &str = "NS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fixture {
    pub id: i64,
    pub kickoff: DateTime<FixedOffset>,
    pub status: String, // short form: NS, 1H, HT, FT, AET, PEN, PST, ...
    pub league_name: String,
    pub home_team_id: i64,
    pub home_team: String,
    pub away_team_id: i64,
    pub away_team: String,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    /// Bookmaker odds payload exactly as the ingestion feed stored it.
    pub odds: Option<String>,
    /// Winner named by the external prediction source.
    pub predicted_winner: Option<String>,
    pub prediction_comment: Option<String>,
    pub analysis: Option<AnalysisResult>,
}

impl Fixture {
    pub fn is_finished(&self) -> bool {
        FINISHED_STATUSES.contains(&self.status.as_str())
    }

    /// Both goal counts, once the feed has populated them.
    pub fn final_score(&self) -> Option<(i32, i32)> {
        match (self.home_goals, self.away_goals) {
            (Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }

    /// True when the odds payload carries something besides an empty object.
    pub fn has_odds(&self) -> bool {
        match self.odds.as_deref().map(str::trim) {
            None | Some("") | Some("{}") | Some("{ }") => false,
            Some(_) => true,
        }
    }

    pub fn matchup(&self) -> String {
        format!("{} x {}", self.home_team, self.away_team)
    }
}

/// A stored fixture together with the raw blobs the AI prompt is built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureRecord {
    #[serde(flatten)]
    pub fixture: Fixture,
    pub statistics: Option<String>,
    pub predictions: Option<String>,
}

/// Unit of work placed on the opportunity queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpportunityContext {
    pub fixture: Fixture,
    pub statistics: String,
    pub predictions: String,
}

// ── Analysis result (persisted wire format) ──────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvStatus {
    Positive,
    #[default]
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Teams {
    pub home: String,
    pub away: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FixtureRef {
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub id: Option<i64>,
    #[serde(default)]
    pub teams: Option<Teams>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BetSuggestion {
    pub market: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub odd_bookmaker: f64,
    /// Always `1 / probability_ai`; never taken from the AI.
    #[serde(deserialize_with = "lenient_f64")]
    pub odd_fair_poisson: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub probability_ai: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub expected_value: f64,
    pub status_ev: EvStatus,
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GoalsMarket {
    pub target: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub odd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Probabilities {
    #[serde(deserialize_with = "lenient_f64")]
    pub home_win: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub draw: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub away_win: f64,
    pub confidence_level: String, // BAIXO / MEDIO / ALTO
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CorrectScorePrediction {
    pub correct_score: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub score_odd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Winner {
    pub id: i64,
    pub name: String,
}

/// Normalized AI analysis attached to a fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AnalysisResult {
    pub fixture: FixtureRef,
    pub bet_suggestion: BetSuggestion,
    pub goals_market: GoalsMarket,
    pub probabilities: Probabilities,
    pub prediction: Option<CorrectScorePrediction>,
    pub winner: Option<Winner>,
    #[serde(deserialize_with = "lenient_bool")]
    pub win_or_draw: bool,
}

impl AnalysisResult {
    pub fn is_positive(&self) -> bool {
        self.bet_suggestion.status_ev == EvStatus::Positive && self.bet_suggestion.odd_bookmaker > 0.0
    }
}

// ── Analysis as parsed from free-form AI output ──────────────────────────────
//
// Every nested object may be missing or null; the EV engine fills defaults.

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawAnalysis {
    #[serde(default)]
    pub fixture: Option<FixtureRef>,
    #[serde(default)]
    pub bet_suggestion: Option<RawBetSuggestion>,
    #[serde(default)]
    pub goals_market: Option<RawGoalsMarket>,
    #[serde(default)]
    pub probabilities: Option<RawProbabilities>,
    #[serde(default)]
    pub prediction: Option<CorrectScorePrediction>,
    #[serde(default)]
    pub winner: Option<Winner>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub win_or_draw: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawBetSuggestion {
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub odd_bookmaker: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub probability_ai: f64,
    #[serde(default)]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawGoalsMarket {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub odd: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawProbabilities {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub home_win: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub draw: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub away_win: f64,
    #[serde(default)]
    pub confidence_level: Option<String>,
}

impl From<AnalysisResult> for RawAnalysis {
    fn from(result: AnalysisResult) -> Self {
        let bet = result.bet_suggestion;
        let probabilities = result.probabilities;
        Self {
            fixture: Some(result.fixture),
            bet_suggestion: Some(RawBetSuggestion {
                market: Some(bet.market),
                odd_bookmaker: bet.odd_bookmaker,
                probability_ai: bet.probability_ai,
                justification: bet.justification,
            }),
            goals_market: Some(RawGoalsMarket {
                target: Some(result.goals_market.target),
                odd: result.goals_market.odd,
            }),
            probabilities: Some(RawProbabilities {
                home_win: probabilities.home_win,
                draw: probabilities.draw,
                away_win: probabilities.away_win,
                confidence_level: Some(probabilities.confidence_level),
            }),
            prediction: result.prediction,
            winner: result.winner,
            win_or_draw: result.win_or_draw,
        }
    }
}

// ── Grading ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
    Green,
    Red,
    /// A prediction source existed but carried nothing to grade against.
    Unknown,
    /// No claim was made; never counted as a miss.
    NotApplicable,
}

impl Grade {
    pub fn from_hit(hit: bool) -> Self {
        if hit {
            Grade::Green
        } else {
            Grade::Red
        }
    }

    pub fn is_decided(self) -> bool {
        matches!(self, Grade::Green | Grade::Red)
    }
}

/// Derived on demand for finished fixtures, never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GradedOutcome {
    pub fixture_id: i64,
    pub api_grade: Grade,
    pub ai_grade: Grade,
    /// Signed return of the fixed stake on the external prediction.
    pub api_return: f64,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
