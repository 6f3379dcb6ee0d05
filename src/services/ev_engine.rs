use crate::models::{
    AnalysisResult, BetSuggestion, EvStatus, GoalsMarket, Probabilities, RawAnalysis, RawProbabilities, Teams,
};
use crate::services::markets::{self, MarketKind, Side};
use crate::utils::{expected_value, fair_odd};

pub const DEFAULT_MARKET: &str = "Indisponível";
pub const DEFAULT_GOALS_TARGET: &str = "N/A";
pub const DEFAULT_CONFIDENCE: &str = "MEDIO";
const FAVOURITE_FALLBACK_MARKET: &str = "Vencedor (Favorito)";

/// Turns whatever the AI returned into a complete, self-consistent
/// `AnalysisResult`. The AI's own fair odd / EV / status are never trusted.
pub struct EvEngine {
    min_probability: f64,
    max_probability: f64,
}

impl Default for EvEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EvEngine {
    pub fn new() -> Self {
        Self {
            min_probability: 0.01,
            max_probability: 0.99,
        }
    }

    /// Idempotent: normalizing an already normalized result changes nothing.
    pub fn normalize(&self, parsed: RawAnalysis) -> AnalysisResult {
        let fixture = parsed.fixture.unwrap_or_default();
        let raw_bet = parsed.bet_suggestion.unwrap_or_default();
        let raw_goals = parsed.goals_market.unwrap_or_default();
        let raw_probabilities = parsed.probabilities;

        let probabilities = fill_probabilities(raw_probabilities.as_ref());
        let goals_market = GoalsMarket {
            target: non_blank(raw_goals.target).unwrap_or_else(|| DEFAULT_GOALS_TARGET.to_string()),
            odd: finite_or_zero(raw_goals.odd),
        };

        let mut market = non_blank(raw_bet.market).unwrap_or_else(|| DEFAULT_MARKET.to_string());
        if markets::is_generic_winner_label(&market) {
            market = favourite_market(fixture.teams.as_ref(), &probabilities);
        }

        let mut probability = finite_or_zero(raw_bet.probability_ai);
        if probability <= 0.0 && raw_probabilities.is_some() {
            if let Some(inferred) = infer_probability(&market, fixture.teams.as_ref(), &probabilities) {
                probability = inferred;
            }
        }

        // The AI sometimes answers 55 instead of 0.55.
        if probability > 1.0 {
            probability /= 100.0;
        }
        let probability = probability.clamp(self.min_probability, self.max_probability);

        let odd_bookmaker = finite_or_zero(raw_bet.odd_bookmaker);
        let (ev, status) = if odd_bookmaker > 0.0 {
            let ev = expected_value(probability, odd_bookmaker);
            (ev, if ev > 0.0 { EvStatus::Positive } else { EvStatus::Negative })
        } else {
            (-1.0, EvStatus::Negative)
        };

        AnalysisResult {
            fixture,
            bet_suggestion: BetSuggestion {
                market,
                odd_bookmaker,
                odd_fair_poisson: fair_odd(probability),
                probability_ai: probability,
                expected_value: ev,
                status_ev: status,
                justification: raw_bet.justification,
            },
            goals_market,
            probabilities,
            prediction: parsed.prediction,
            winner: parsed.winner,
            win_or_draw: parsed.win_or_draw,
        }
    }
}

fn fill_probabilities(raw: Option<&RawProbabilities>) -> Probabilities {
    match raw {
        Some(p) => Probabilities {
            home_win: finite_or_zero(p.home_win),
            draw: finite_or_zero(p.draw),
            away_win: finite_or_zero(p.away_win),
            confidence_level: non_blank(p.confidence_level.clone())
                .unwrap_or_else(|| DEFAULT_CONFIDENCE.to_string()),
        },
        None => Probabilities {
            confidence_level: DEFAULT_CONFIDENCE.to_string(),
            ..Probabilities::default()
        },
    }
}

/// Rewrite a generic "Vencedor 1x2" into the side with the highest probability.
fn favourite_market(teams: Option<&Teams>, p: &Probabilities) -> String {
    let Some(teams) = teams else {
        return FAVOURITE_FALLBACK_MARKET.to_string();
    };
    if p.home_win > p.away_win && p.home_win > p.draw {
        format!("Vencedor: {}", teams.home)
    } else if p.away_win > p.home_win && p.away_win > p.draw {
        format!("Vencedor: {}", teams.away)
    } else {
        "Vencedor: Empate".to_string()
    }
}

/// Back-fill a missing suggestion probability from the 1X2 probabilities.
fn infer_probability(market: &str, teams: Option<&Teams>, p: &Probabilities) -> Option<f64> {
    let kind = markets::classify_market(market)?;
    let teams = teams?;
    let side = markets::resolve_side(market, &teams.home, &teams.away)?;

    let team_win = match side {
        Side::Home => p.home_win,
        Side::Away => p.away_win,
    };
    Some(match kind {
        MarketKind::Win | MarketKind::DrawNoBet => team_win,
        MarketKind::DoubleChance => team_win + p.draw,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
