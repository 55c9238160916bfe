//! Per-line linear fare model and the parsing of untrusted model text.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::FareError;

pub const DEFAULT_CURRENCY: &str = "MYR";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[\w-]*[ \t]*\r?\n?(.*?)\r?\n?\s*```\s*$").expect("valid regex")
});

/// `fare = base + per_km * km`, clamped to `[min_fare, max_fare]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFare {
    pub base: f64,
    pub per_km: f64,
    pub min_fare: f64,
    pub max_fare: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareModel {
    pub currency: String,
    pub lines: BTreeMap<String, LineFare>,
}

impl FareModel {
    /// Fare for travelling `distance_km` on `line_id`, rounded to cents.
    pub fn quote(&self, line_id: &str, distance_km: f64) -> Option<f64> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return None;
        }
        let line = self.lines.get(line_id)?;
        let raw = line.base + line.per_km * distance_km;
        let fare = raw.max(line.min_fare).min(line.max_fare);
        Some((fare * 100.0).round() / 100.0)
    }
}

/// Remove a surrounding markdown code fence, if any, and trim.
pub fn strip_code_fences(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

/// Parse collaborator text as a single JSON object.
///
/// Falls back to the outermost `{...}` slice when the model wrapped the
/// object in prose.
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, FareError> {
    let text = strip_code_fences(raw);
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(err) => embedded_object(text).ok_or(err)?,
    };
    match value {
        Value::Object(map) => Ok(map),
        other => Err(FareError::ModelFormat(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn embedded_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A finite number, from a JSON number or a numeric string.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Parse and repair a fare model returned by the collaborator.
pub fn parse_fare_model(raw: &str) -> Result<FareModel, FareError> {
    let object = parse_json_object(raw)?;

    let currency = object
        .get("currency")
        .and_then(Value::as_str)
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let mut lines = BTreeMap::new();
    if let Some(Value::Object(raw_lines)) = object.get("lines") {
        for (id, entry) in raw_lines {
            let id = id.trim().to_uppercase();
            if id.is_empty() {
                warn!("Dropping fare line with blank id");
                continue;
            }
            match sanitize_line(entry) {
                Ok(line) => {
                    lines.insert(id, line);
                }
                Err(reason) => warn!("Dropping fare line {}: {}", id, reason),
            }
        }
    }

    if lines.is_empty() {
        return Err(FareError::EmptyModel);
    }
    Ok(FareModel { currency, lines })
}

fn sanitize_line(entry: &Value) -> Result<LineFare, &'static str> {
    let Value::Object(fields) = entry else {
        return Err("entry is not an object");
    };
    let field = |name: &str| fields.get(name).and_then(coerce_number).map(|n| n.max(0.0));

    let base = field("base").ok_or("missing or non-numeric base")?;
    let per_km = field("per_km").ok_or("missing or non-numeric per_km")?;
    let min_fare = field("min_fare").unwrap_or(base);
    let max_fare = field("max_fare").unwrap_or_else(|| min_fare.max(base));
    let (min_fare, max_fare) = if min_fare > max_fare {
        (max_fare, min_fare)
    } else {
        (min_fare, max_fare)
    };

    Ok(LineFare {
        base,
        per_km,
        min_fare,
        max_fare,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"{"currency":"MYR","lines":{"KJ":{"base":0.9,"per_km":0.12,"min_fare":1.0,"max_fare":5.7}}}"#;

    #[test]
    fn strips_json_fence() {
        let fenced = format!("```json\n{MODEL}\n```");
        assert_eq!(strip_code_fences(&fenced), MODEL);
    }

    #[test]
    fn strips_bare_fence_and_whitespace() {
        let fenced = format!("  ```\n{MODEL}\n```  \n");
        assert_eq!(strip_code_fences(&fenced), MODEL);
        assert_eq!(strip_code_fences(&format!("```{MODEL}```")), MODEL);
    }

    #[test]
    fn unfenced_text_is_only_trimmed() {
        assert_eq!(strip_code_fences(&format!("\n {MODEL} \n")), MODEL);
    }

    #[test]
    fn parses_fenced_and_unfenced_models_identically() {
        let plain = parse_fare_model(MODEL).unwrap();
        let fenced = parse_fare_model(&format!("```json\n{MODEL}\n```")).unwrap();
        assert_eq!(plain, fenced);
        assert_eq!(plain.currency, "MYR");
        assert_eq!(
            plain.lines["KJ"],
            LineFare { base: 0.9, per_km: 0.12, min_fare: 1.0, max_fare: 5.7 }
        );
    }

    #[test]
    fn finds_object_inside_prose() {
        let chatty = format!("Here is the model you asked for:\n{MODEL}\nLet me know!");
        assert!(parse_fare_model(&chatty).is_ok());
    }

    #[test]
    fn non_json_is_a_format_error() {
        let err = parse_fare_model("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, FareError::ModelFormat(_)));
        let err = parse_fare_model("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, FareError::ModelFormat(_)));
    }

    #[test]
    fn empty_or_missing_lines_is_an_empty_model() {
        for raw in [
            r#"{"currency":"MYR","lines":{}}"#,
            r#"{"currency":"MYR"}"#,
            r#"{"lines":[]}"#,
            r#"{"lines":{"KJ":{"per_km":0.1}}}"#,
        ] {
            assert!(matches!(parse_fare_model(raw), Err(FareError::EmptyModel)), "{raw}");
        }
    }

    #[test]
    fn repairs_unreliable_field_types() {
        let raw = r#"{
            "lines": {
                "kj": {"base": "0.80", "per_km": 0.1, "min_fare": 6, "max_fare": 1.2},
                "AG": {"base": -1, "per_km": 0.2},
                "SP": "not a line"
            }
        }"#;
        let model = parse_fare_model(raw).unwrap();

        assert_eq!(model.currency, DEFAULT_CURRENCY);
        assert_eq!(model.lines.len(), 2);
        assert_eq!(
            model.lines["KJ"],
            LineFare { base: 0.8, per_km: 0.1, min_fare: 1.2, max_fare: 6.0 }
        );
        assert_eq!(
            model.lines["AG"],
            LineFare { base: 0.0, per_km: 0.2, min_fare: 0.0, max_fare: 0.0 }
        );
    }

    #[test]
    fn quote_clamps_to_bounds() {
        let model = parse_fare_model(MODEL).unwrap();
        assert_eq!(model.quote("KJ", 0.0), Some(1.0));
        assert_eq!(model.quote("KJ", 10.0), Some(2.1));
        assert_eq!(model.quote("KJ", 500.0), Some(5.7));
        assert_eq!(model.quote("AG", 3.0), None);
        assert_eq!(model.quote("KJ", -1.0), None);
        assert_eq!(model.quote("KJ", f64::NAN), None);
    }

    #[test]
    fn coerce_number_rejects_non_numbers() {
        assert_eq!(coerce_number(&Value::from(1.5)), Some(1.5));
        assert_eq!(coerce_number(&Value::from(" 2 ")), Some(2.0));
        assert_eq!(coerce_number(&Value::from("NaN")), None);
        assert_eq!(coerce_number(&Value::from("abc")), None);
        assert_eq!(coerce_number(&Value::Bool(true)), None);
        assert_eq!(coerce_number(&Value::Null), None);
    }
}
