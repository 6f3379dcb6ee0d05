use serde_json::json;

use crate::models::OpportunityContext;

/// Markets the model may pick from. Anything else is hard to grade.
const ALLOWED_MARKETS: &[&str] = &[
    "Vitoria do [Nome do Time]",
    "Gols Over/Under (ex.: Mais de 2.5 Gols)",
    "Ambas Marcam: Sim / Não",
    "Empate Anula: [Nome do Time]",
    "Vencedor 1º Tempo: [Nome do Time]",
    "Dupla Chance: [Nome do Time] ou Empate",
];

pub fn build_analysis_prompt(context: &OpportunityContext) -> String {
    let fixture = &context.fixture;
    let kickoff = fixture.kickoff.to_rfc3339();

    let odds_section = if fixture.has_odds() {
        format!("\n--- ODDS ATUAIS ---\n{}\n", fixture.odds.as_deref().unwrap_or_default())
    } else {
        String::new()
    };

    let skeleton = json!({
        "fixture": {
            "id": fixture.id,
            "teams": { "home": fixture.home_team, "away": fixture.away_team },
            "date": kickoff,
        },
        "bet_suggestion": {
            "market": "Vitoria do [Nome do Time]",
            "odd_bookmaker": 1.95,
            "probability_ai": 0.55,
            "justification": "justificativa curta; informe se houver time reserva",
        },
        "goals_market": { "target": "Mais de 1.5 Gols", "odd": 1.80 },
        "probabilities": { "home_win": 0.55, "draw": 0.25, "away_win": 0.20, "confidence_level": "ALTO" },
        "prediction": { "correct_score": "2:1", "score_odd": 8.50 },
    });
    let skeleton = serde_json::to_string_pretty(&skeleton).unwrap_or_default();

    let markets = ALLOWED_MARKETS
        .iter()
        .map(|m| format!("   - {}", m))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Você é um analista de apostas esportivas especializado em futebol.
Produza uma análise técnica em JSON para a partida {home} x {away} ({league}), jogo {id}, início {kickoff}.
{odds_section}
--- ESTATÍSTICAS ---
{statistics}

--- PREVISÕES DE REFERÊNCIA ---
{predictions}

REGRAS:
1. Use a busca para confirmar se o jogo é eliminatório ou se algum time vai a campo com reservas; isso pesa mais que as estatísticas.
2. Mercados permitidos:
{markets}
3. Se a diferença entre as probabilidades de vitória dos dois times for menor que 15%, prefira Dupla Chance ou Empate Anula.
4. 'odd_bookmaker' e 'probability_ai' nunca podem ser zero. Use a odd da seção ODDS ATUAIS ou estime uma odd realista.
5. 'probability_ai' é a probabilidade do mercado escolhido (Dupla Chance = vitória + empate), em fração de 0 a 1.
6. 'confidence_level': ALTO (acima de 70% ou contexto claro), MEDIO (50% a 70%), BAIXO (jogo equilibrado ou escalação incerta).
7. Responda somente com JSON puro, sem markdown, em português do Brasil.

ESTRUTURA OBRIGATÓRIA:
{skeleton}
"#,
        home = fixture.home_team,
        away = fixture.away_team,
        league = fixture.league_name,
        id = fixture.id,
        kickoff = kickoff,
        odds_section = odds_section,
        statistics = context.statistics,
        predictions = context.predictions,
        markets = markets,
        skeleton = skeleton,
    )
}
