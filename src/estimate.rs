//! Best-effort travel adjustment estimates from the collaborator.
//!
//! Callers send whatever baseline figures they have; the reply is a small
//! set of multipliers around 1.0. Failures never propagate: the caller gets
//! a fallback response and applies its own default.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::FareError;
use crate::llm::Collaborator;
use crate::model::{coerce_number, parse_json_object};

/// Correction fields and how far each may stray from 1.0.
pub const CORRECTION_FIELDS: &[(&str, f64)] = &[
    ("walk_time_multiplier", 0.10),
    ("wait_time_multiplier", 0.20),
    ("in_vehicle_time_multiplier", 0.20),
    ("transfer_time_multiplier", 0.20),
    ("fare_multiplier", 0.20),
    ("total_time_multiplier", 0.20),
];

pub type Correction = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction: Option<Correction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
}

impl EstimateResponse {
    pub fn corrected(correction: Correction) -> Self {
        Self {
            ok: true,
            correction: Some(correction),
            error: None,
            fallback: None,
        }
    }

    pub fn fallback() -> Self {
        Self {
            ok: false,
            correction: None,
            error: Some("AI call failed".to_string()),
            fallback: Some(true),
        }
    }
}

pub async fn relay_estimate(
    collaborator: &dyn Collaborator,
    baseline: &Value,
    now: DateTime<Local>,
) -> EstimateResponse {
    let prompt = estimate_prompt(baseline, now);
    let result = match collaborator.complete(&prompt).await {
        Ok(reply) => parse_correction(&reply),
        Err(e) => Err(e),
    };
    match result {
        Ok(correction) => EstimateResponse::corrected(correction),
        Err(e) => {
            warn!("Estimate relay falling back: {}", e);
            EstimateResponse::fallback()
        }
    }
}

pub fn estimate_prompt(baseline: &Value, now: DateTime<Local>) -> String {
    let fields = CORRECTION_FIELDS
        .iter()
        .map(|(name, bound)| {
            format!(
                "  \"{name}\": number between {:.2} and {:.2}",
                1.0 - bound,
                1.0 + bound
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "You adjust baseline journey estimates for Rapid KL rail and bus trips.\n\
         Current local time: {}.\n\
         Baseline (JSON):\n{}\n\n\
         Consider: crowding at busy interchanges (KL Sentral, Masjid Jamek, Pasar Seni), \
         peak-hour discomfort on weekdays 07:00-09:30 and 17:00-20:00, \
         longer waits and walks in rain, and ride-hailing surge when it rains or at peak.\n\
         Walking time may change by at most 10%; every other figure by at most 20%.\n\
         Respond with ONLY one flat JSON object, no prose and no markdown:\n{{\n{}\n}}",
        now.format("%A %H:%M"),
        baseline,
        fields
    )
}

/// Parse a reply into known, clamped multipliers.
pub fn parse_correction(raw: &str) -> Result<Correction, FareError> {
    let object = parse_json_object(raw)?;
    let correction: Correction = CORRECTION_FIELDS
        .iter()
        .filter_map(|(name, bound)| {
            let value = coerce_number(object.get(*name)?)?;
            Some((name.to_string(), value.clamp(1.0 - bound, 1.0 + bound)))
        })
        .collect();

    if correction.is_empty() {
        return Err(FareError::ModelFormat(
            "reply has no numeric correction fields".to_string(),
        ));
    }
    Ok(correction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;

    struct Reply(Result<&'static str, &'static str>);

    #[async_trait]
    impl Collaborator for Reply {
        async fn complete(&self, _prompt: &str) -> Result<String, FareError> {
            self.0
                .map(str::to_string)
                .map_err(|e| FareError::Collaborator(e.to_string()))
        }
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn clamps_to_field_bounds() {
        let raw = r#"{
            "walk_time_multiplier": 1.5,
            "wait_time_multiplier": 0.5,
            "fare_multiplier": "1.05",
            "mood": 3,
            "total_time_multiplier": "fast"
        }"#;
        let correction = parse_correction(raw).unwrap();

        assert_eq!(correction.len(), 3);
        assert_eq!(correction["walk_time_multiplier"], 1.1);
        assert_eq!(correction["wait_time_multiplier"], 0.8);
        assert_eq!(correction["fare_multiplier"], 1.05);
        assert!(!correction.contains_key("mood"));
    }

    #[test]
    fn reply_without_known_fields_is_rejected() {
        assert!(parse_correction(r#"{"note": "looks fine"}"#).is_err());
        assert!(parse_correction("no idea").is_err());
    }

    #[test]
    fn prompt_embeds_baseline_and_bounds() {
        let baseline = json!({"total_minutes": 34, "fare": 2.1});
        let prompt = estimate_prompt(&baseline, noon());

        assert!(prompt.contains(r#""total_minutes":34"#));
        assert!(prompt.contains("Monday 12:00"));
        assert!(prompt.contains("\"walk_time_multiplier\": number between 0.90 and 1.10"));
        assert!(prompt.contains("\"fare_multiplier\": number between 0.80 and 1.20"));
    }

    #[tokio::test]
    async fn fenced_reply_is_relayed() {
        let llm = Reply(Ok("```json\n{\"total_time_multiplier\": 1.12}\n```"));
        let response = relay_estimate(&llm, &json!({}), noon()).await;

        assert!(response.ok);
        assert_eq!(response.correction.unwrap()["total_time_multiplier"], 1.12);
    }

    #[tokio::test]
    async fn failures_become_fallback() {
        for llm in [Reply(Err("timeout")), Reply(Ok("<html>502</html>"))] {
            let response = relay_estimate(&llm, &json!({"fare": 1}), noon()).await;
            assert_eq!(response, EstimateResponse::fallback());
            assert_eq!(
                serde_json::to_value(&response).unwrap(),
                json!({"ok": false, "error": "AI call failed", "fallback": true})
            );
        }
    }
}
