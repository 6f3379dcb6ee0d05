//! Keyword tables for reading betting markets written in free text.
//!
//! The AI answers in Portuguese (sometimes English), so every classification
//! here is an ordered list of `(substring, category)` pairs checked against
//! the lower-cased text. First match wins.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RE_DECIMAL: Regex = Regex::new(r"\d+(?:[.,]\d+)?").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    Prefix,
    Contains,
}

/// Fallbacks when the market names neither team.
const SIDE_HINTS: &[(&str, Match, Side)] = &[
    ("vitoria casa", Match::Prefix, Side::Home),
    ("vitória casa", Match::Prefix, Side::Home),
    ("1", Match::Prefix, Side::Home),
    ("mandante", Match::Contains, Side::Home),
    ("vitoria fora", Match::Prefix, Side::Away),
    ("vitória fora", Match::Prefix, Side::Away),
    ("2", Match::Prefix, Side::Away),
    ("visitante", Match::Contains, Side::Away),
];

/// Markets that also pay out on a draw.
const WIN_OR_DRAW_KEYWORDS: &[&str] = &["empate", "draw", "chance", "ou x"];

/// Labels the AI uses when it forgets to name the team.
const GENERIC_WINNER_LABELS: &[&str] = &["vencedor 1x2", "1x2", "vencedor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketKind {
    /// Straight win for one team.
    Win,
    /// Team or draw.
    DoubleChance,
    /// Stake refunded on a draw.
    DrawNoBet,
}

/// Draw-inclusive markets are checked first: team names such as "Vitória"
/// would otherwise read as a straight win.
const MARKET_KINDS: &[(&str, MarketKind)] = &[
    ("dupla chance", MarketKind::DoubleChance),
    ("ou empate", MarketKind::DoubleChance),
    ("double chance", MarketKind::DoubleChance),
    ("empate anula", MarketKind::DrawNoBet),
    ("draw no bet", MarketKind::DrawNoBet),
    ("vitoria", MarketKind::Win),
    ("vitória", MarketKind::Win),
    ("vencedor", MarketKind::Win),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GoalsKind {
    Over,
    Under,
    BothTeamsScore,
}

const GOALS_KINDS: &[(&str, GoalsKind)] = &[
    ("mais de", GoalsKind::Over),
    ("over", GoalsKind::Over),
    ("menos de", GoalsKind::Under),
    ("under", GoalsKind::Under),
    ("ambas", GoalsKind::BothTeamsScore),
    ("both", GoalsKind::BothTeamsScore),
];

const NEGATIONS: &[&str] = &["não", "nao", ": no", " no "];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoalsLine {
    Over(f64),
    Under(f64),
    /// `true` for "both teams score: yes".
    BothTeamsScore(bool),
}

impl GoalsLine {
    pub fn is_hit(self, home_goals: i32, away_goals: i32) -> bool {
        let total = (home_goals + away_goals) as f64;
        match self {
            GoalsLine::Over(line) => total > line,
            GoalsLine::Under(line) => total < line,
            GoalsLine::BothTeamsScore(expected) => (home_goals > 0 && away_goals > 0) == expected,
        }
    }
}

/// How the external prediction comment frames the pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    WinOrDraw,
    Win,
}

const COMMENT_KINDS: &[(&str, CommentKind)] = &[
    ("draw", CommentKind::WinOrDraw),
    ("empate", CommentKind::WinOrDraw),
    ("win", CommentKind::Win),
    ("vence", CommentKind::Win),
    ("winner", CommentKind::Win),
];

/// Which team a market text backs: exact team-name substring first, then the
/// positional hints.
pub fn resolve_side(market: &str, home_team: &str, away_team: &str) -> Option<Side> {
    let market = market.trim().to_lowercase();
    let home = home_team.trim().to_lowercase();
    let away = away_team.trim().to_lowercase();

    if !home.is_empty() && market.contains(&home) {
        return Some(Side::Home);
    }
    if !away.is_empty() && market.contains(&away) {
        return Some(Side::Away);
    }

    SIDE_HINTS
        .iter()
        .find(|(pattern, kind, _)| match kind {
            Match::Prefix => market.starts_with(pattern),
            Match::Contains => market.contains(pattern),
        })
        .map(|(_, _, side)| *side)
}

pub fn is_win_or_draw(market: &str) -> bool {
    let market = market.to_lowercase();
    WIN_OR_DRAW_KEYWORDS.iter().any(|k| market.contains(k))
}

pub fn is_generic_winner_label(market: &str) -> bool {
    let market = market.trim().to_lowercase();
    GENERIC_WINNER_LABELS.iter().any(|label| market == *label)
}

pub fn classify_market(market: &str) -> Option<MarketKind> {
    let market = market.to_lowercase();
    MARKET_KINDS
        .iter()
        .find(|(pattern, _)| market.contains(pattern))
        .map(|(_, kind)| *kind)
}

pub fn classify_comment(comment: &str) -> Option<CommentKind> {
    let comment = comment.to_lowercase();
    COMMENT_KINDS
        .iter()
        .find(|(pattern, _)| comment.contains(pattern))
        .map(|(_, kind)| *kind)
}

/// First decimal number in the text ("Mais de 2.5 Gols" -> 2.5).
pub fn first_decimal(text: &str) -> Option<f64> {
    RE_DECIMAL
        .find(text)
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
}

pub fn parse_goals_target(target: &str) -> Option<GoalsLine> {
    let lower = target.to_lowercase();
    let (_, kind) = GOALS_KINDS.iter().find(|(pattern, _)| lower.contains(pattern))?;

    match kind {
        GoalsKind::Over => first_decimal(&lower).map(GoalsLine::Over),
        GoalsKind::Under => first_decimal(&lower).map(GoalsLine::Under),
        GoalsKind::BothTeamsScore => {
            let padded = format!("{} ", lower);
            let negated = NEGATIONS.iter().any(|n| padded.contains(n));
            Some(GoalsLine::BothTeamsScore(!negated))
        }
    }
}
