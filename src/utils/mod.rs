use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Convert probability to fair decimal odds
pub fn fair_odd(probability: f64) -> f64 {
    1.0 / probability
}

/// Expected value of a unit stake at `odds` given our `probability`
pub fn expected_value(probability: f64, odds: f64) -> f64 {
    probability * odds - 1.0
}

/// Win rate as a percentage, 0 when nothing was graded
pub fn win_rate(greens: u32, reds: u32) -> f64 {
    let total = greens + reds;
    if total == 0 {
        return 0.0;
    }
    greens as f64 / total as f64 * 100.0
}

/// Format a signed amount the way the daily report shows it: "+ R$ 7.25"
pub fn format_money(amount: f64) -> String {
    let sign = if amount >= 0.0 { "+" } else { "-" };
    format!("{} R$ {:.2}", sign, amount.abs())
}

/// Character count as the messaging platform sees it (not bytes).
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into parts of at most `max_chars` characters, cutting at line
/// breaks where possible.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = char_len(line);
        if current_len + line_len > max_chars && current_len > 0 {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            // A single line longer than the limit: hard cut on char boundaries.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                let piece: String = piece.iter().collect();
                if piece.chars().count() == max_chars {
                    parts.push(piece);
                } else {
                    current_len = char_len(&piece);
                    current = piece;
                }
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Read a number the AI (or a bookmaker feed) may have sent as a string,
/// with a comma decimal separator or a trailing percent sign.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .ok(),
        _ => None,
    }
}

pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64).unwrap_or(0.0))
}

pub fn lenient_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "sim" | "yes" | "1"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fair_odd_and_ev() {
        assert_eq!(fair_odd(0.5), 2.0);
        assert_eq!(fair_odd(0.25), 4.0);
        assert!((expected_value(0.55, 1.95) - 0.0725).abs() < 1e-9);
        assert!(expected_value(0.4, 2.0) < 0.0);
    }

    #[test]
    fn test_win_rate() {
        assert_eq!(win_rate(3, 1), 75.0);
        assert_eq!(win_rate(0, 0), 0.0);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(7.25), "+ R$ 7.25");
        assert_eq!(format_money(-5.0), "- R$ 5.00");
        assert_eq!(format_money(0.0), "+ R$ 0.00");
    }

    #[test]
    fn test_value_as_f64_accepts_strings() {
        assert_eq!(value_as_f64(&json!(1.95)), Some(1.95));
        assert_eq!(value_as_f64(&json!("1,95")), Some(1.95));
        assert_eq!(value_as_f64(&json!("55%")), Some(55.0));
        assert_eq!(value_as_f64(&json!("n/a")), None);
        assert_eq!(value_as_f64(&json!(null)), None);
    }

    #[test]
    fn test_split_message_respects_limit() {
        let line = format!("{}\n", "x".repeat(9));
        let text = line.repeat(25); // 250 chars
        let parts = split_message(&text, 100);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| char_len(p) <= 100));
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn test_split_message_hard_cuts_long_lines() {
        let text = "é".repeat(250);
        let parts = split_message(&text, 100);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| char_len(p) <= 100));
        assert_eq!(parts.concat(), text);
    }
}
