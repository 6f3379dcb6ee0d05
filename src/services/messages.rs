use chrono::FixedOffset;

use crate::models::{AnalysisResult, Fixture};

fn kickoff_label(fixture: &Fixture, offset: &FixedOffset) -> String {
    fixture.kickoff.with_timezone(offset).format("%d/%m/%Y %H:%M").to_string()
}

fn percent(p: f64) -> String {
    format!("{:.0}%", p * 100.0)
}

/// Short alert pushed to the chat when an analysis has positive EV.
pub fn format_analysis_alert(analysis: &AnalysisResult, fixture: &Fixture, offset: &FixedOffset) -> String {
    let bet = &analysis.bet_suggestion;
    let p = &analysis.probabilities;
    let odd = if bet.odd_bookmaker > 0.0 {
        format!("{:.2}", bet.odd_bookmaker)
    } else {
        "Indisponível".to_string()
    };

    [
        format!("🎯 SUGESTÃO DE APOSTA ({} - {})", fixture.matchup(), kickoff_label(fixture, offset)),
        format!("*✅ Mercado:* {}", bet.market),
        format!("*🎲 Probabilidade:* {}", percent(bet.probability_ai)),
        format!("*💰 Odd:* {}", odd),
        format!("*🔥 Gols:* {} ({:.2})", analysis.goals_market.target, analysis.goals_market.odd),
        format!(
            "*📊 Probabilidades:* {}: {} | Empate: {} | {}: {}",
            fixture.home_team,
            percent(p.home_win),
            percent(p.draw),
            fixture.away_team,
            percent(p.away_win)
        ),
        format!("*📈 Confiança:* {}", p.confidence_level),
    ]
    .join("\n")
}

/// Full single-fixture report returned by on-demand analysis.
pub fn format_analysis_text(analysis: &AnalysisResult, fixture: &Fixture, offset: &FixedOffset) -> String {
    let bet = &analysis.bet_suggestion;
    let p = &analysis.probabilities;
    let has_odd = bet.odd_bookmaker > 0.0;

    let odd = if has_odd {
        format!("{:.2}", bet.odd_bookmaker)
    } else {
        "Não encontrada".to_string()
    };
    let ev_calculation = if has_odd {
        format!(
            "({} x {:.2}) - 1 = {:.2}",
            percent(bet.probability_ai),
            bet.odd_bookmaker,
            bet.expected_value
        )
    } else {
        "Indisponível (sem odd)".to_string()
    };
    let ev_status = if analysis.is_positive() {
        "✅ EV positivo"
    } else {
        "❌ Sem valor"
    };
    let (score, score_odd) = analysis
        .prediction
        .as_ref()
        .map(|pr| (pr.correct_score.clone().unwrap_or_else(|| "N/A".to_string()), pr.score_odd))
        .unwrap_or_else(|| ("N/A".to_string(), 0.0));

    let mut lines = vec![
        format!("### 🎯 SUGESTÃO DE APOSTA ({} - {})", fixture.matchup(), kickoff_label(fixture, offset)),
        format!("**Mercado:** {}", bet.market),
    ];
    if let Some(justification) = bet.justification.as_deref().filter(|j| !j.trim().is_empty()) {
        lines.push(format!("**💡 Por quê:** {}", justification));
    }
    lines.extend([
        format!("**Probabilidade:** {}", percent(bet.probability_ai)),
        format!("**Odd justa:** {:.2}", bet.odd_fair_poisson),
        format!("**Odd da casa:** {}", odd),
        format!("**EV:** {} ({})", ev_calculation, ev_status),
        String::new(),
        format!("**🔥 Gols:** {} ({:.2})", analysis.goals_market.target, analysis.goals_market.odd),
        format!(
            "**📊 Probabilidades:** {}: {} | Empate: {} | {}: {}",
            fixture.home_team,
            percent(p.home_win),
            percent(p.draw),
            fixture.away_team,
            percent(p.away_win)
        ),
        format!("**⚽ Placar provável:** {} (odd {:.2})", score, score_odd),
        format!("**📈 Confiança:** {}", p.confidence_level),
    ]);
    lines.join("\n")
}
