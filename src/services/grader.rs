//! Grades finished fixtures on two independent tracks:
//!
//! * Track A: the external prediction feed (recorded winner name + comment),
//!   with a fixed-stake monetary return.
//! * Track B: the AI analysis attached to the fixture.
//!
//! A track with nothing to grade yields `Unknown` / `NotApplicable`, never a red.

use serde_json::Value;

use crate::models::{AnalysisResult, Fixture, Grade, GradedOutcome};
use crate::services::markets::{self, CommentKind};
use crate::utils::value_as_f64;

/// Bookmaker bet id of the 1X2 market in the odds feed.
const MATCH_WINNER_BET_ID: i64 = 1;
const MATCH_WINNER_BET_NAME: &str = "Match Winner";

pub struct OutcomeGrader {
    stake: f64,
}

impl OutcomeGrader {
    pub fn new(stake: f64) -> Self {
        Self { stake }
    }

    /// `None` unless the fixture is finished and both goal counts are known.
    pub fn grade(&self, fixture: &Fixture) -> Option<GradedOutcome> {
        if !fixture.is_finished() {
            return None;
        }
        let (home, away) = fixture.final_score()?;

        let api_grade = grade_external(fixture, home, away);
        let api_return = match api_grade {
            Grade::Green => match relevant_odd(fixture) {
                Some(odd) => self.stake * (odd - 1.0),
                None => {
                    tracing::warn!("No match-winner odd for fixture {}, green counted without return", fixture.id);
                    0.0
                }
            },
            Grade::Red => -self.stake,
            Grade::Unknown | Grade::NotApplicable => 0.0,
        };

        Some(GradedOutcome {
            fixture_id: fixture.id,
            api_grade,
            ai_grade: grade_ai(fixture.analysis.as_ref(), fixture, home, away),
            api_return,
        })
    }
}

fn same_team(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Track A.
pub fn grade_external(fixture: &Fixture, home_goals: i32, away_goals: i32) -> Grade {
    let winner = fixture.predicted_winner.as_deref().filter(|w| !w.trim().is_empty());
    let comment = fixture.prediction_comment.as_deref().filter(|c| !c.trim().is_empty());

    if winner.is_none() && comment.is_none() {
        tracing::warn!("Finished fixture {} has no external prediction", fixture.id);
        return Grade::Unknown;
    }

    let is_win = winner.map_or(false, |name| {
        (home_goals > away_goals && same_team(&fixture.home_team, name))
            || (away_goals > home_goals && same_team(&fixture.away_team, name))
    });
    let is_draw = home_goals == away_goals;

    let hit = match comment.map(markets::classify_comment) {
        Some(Some(CommentKind::WinOrDraw)) => is_win || is_draw,
        Some(Some(CommentKind::Win)) => is_win,
        Some(None) => winner.is_some() && is_win,
        None => is_win,
    };
    Grade::from_hit(hit)
}

/// Track B.
pub fn grade_ai(analysis: Option<&AnalysisResult>, fixture: &Fixture, home_goals: i32, away_goals: i32) -> Grade {
    let Some(analysis) = analysis else {
        return Grade::NotApplicable;
    };

    let is_draw = home_goals == away_goals;
    let actual_winner_id = if home_goals > away_goals {
        Some(fixture.home_team_id)
    } else if away_goals > home_goals {
        Some(fixture.away_team_id)
    } else {
        None
    };

    if analysis.win_or_draw {
        let hit = match &analysis.winner {
            Some(winner) => is_draw || actual_winner_id == Some(winner.id),
            None => is_draw,
        };
        return Grade::from_hit(hit);
    }

    if let Some(winner) = &analysis.winner {
        // A draw leaves this branch without a verdict.
        if let Some(actual) = actual_winner_id {
            return Grade::from_hit(actual == winner.id);
        }
    }

    // A goals claim counts only when it came with a price.
    if analysis.goals_market.odd > 0.0 {
        if let Some(line) = markets::parse_goals_target(&analysis.goals_market.target) {
            return Grade::from_hit(line.is_hit(home_goals, away_goals));
        }
    }

    Grade::NotApplicable
}

/// Bookmaker odd for the outcome the external feed predicted (Home, Away, or
/// Draw when the recorded winner is neither team).
pub fn relevant_odd(fixture: &Fixture) -> Option<f64> {
    let odds: Value = serde_json::from_str(fixture.odds.as_deref()?).ok()?;

    let bets = odds
        .pointer("/bookmaker/bets")
        .or_else(|| odds.pointer("/bookmakers/0/bets"))?
        .as_array()?;

    let selection = match fixture.predicted_winner.as_deref() {
        Some(name) if same_team(&fixture.home_team, name) => "Home",
        Some(name) if same_team(&fixture.away_team, name) => "Away",
        _ => "Draw",
    };

    bets.iter()
        .filter(|bet| {
            bet.get("id").and_then(Value::as_i64) == Some(MATCH_WINNER_BET_ID)
                || bet
                    .get("name")
                    .and_then(Value::as_str)
                    .map_or(false, |n| n.eq_ignore_ascii_case(MATCH_WINNER_BET_NAME))
        })
        .filter_map(|bet| bet.get("values")?.as_array())
        .flatten()
        .find(|v| {
            v.get("value")
                .and_then(Value::as_str)
                .map_or(false, |s| s.eq_ignore_ascii_case(selection))
        })
        .and_then(|v| v.get("odd").and_then(value_as_f64))
        .filter(|odd| *odd > 0.0)
}
