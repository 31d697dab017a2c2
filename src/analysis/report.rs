use std::collections::BTreeSet;

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RcaError, parse_error, schema_error};

pub const REQUIRED_FIELDS: [&str; 4] = [
    "impactedServices",
    "rootCause",
    "recommendedSteps",
    "searchQueries",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// The only successful output of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RcaReport {
    pub impacted_services: BTreeSet<String>,
    pub root_cause: String,
    pub recommended_steps: Vec<String>,
    pub search_queries: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub is_repeated_issue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_ticket_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReport {
    impacted_services: Vec<String>,
    root_cause: String,
    recommended_steps: Vec<String>,
    search_queries: Vec<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    is_repeated_issue: Option<bool>,
    #[serde(default)]
    similar_ticket_reference: Option<String>,
}

pub fn rca_report_json_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "impactedServices": {
                "type": "array",
                "items": { "type": "string", "pattern": "\\S" },
                "minItems": 1
            },
            "rootCause": { "type": "string", "pattern": "\\S" },
            "recommendedSteps": {
                "type": "array",
                "items": { "type": "string" }
            },
            "searchQueries": {
                "type": "array",
                "items": { "type": "string" }
            },
            "confidence": { "type": ["string", "null"] },
            "isRepeatedIssue": { "type": ["boolean", "null"] },
            "similarTicketReference": { "type": ["string", "null"] }
        },
        "required": REQUIRED_FIELDS
    })
}

/// Strict parse, schema check, then coercion. Nothing partially valid gets through.
pub struct ReportValidator {
    schema: JSONSchema,
}

impl ReportValidator {
    pub fn new() -> Result<Self, RcaError> {
        let schema = rca_report_json_schema();
        let compiled = JSONSchema::compile(&schema)
            .map_err(|err| schema_error(format!("failed to compile report schema: {err}")))?;
        Ok(Self { schema: compiled })
    }

    pub fn validate_text(&self, text: &str) -> Result<RcaReport, RcaError> {
        let value = serde_json::from_str::<Value>(text).map_err(|err| {
            parse_error(format!("model output is not valid JSON: {err}"))
        })?;
        self.validate_value(value)
    }

    pub fn validate_value(&self, value: Value) -> Result<RcaReport, RcaError> {
        if let Err(errors) = self.schema.validate(&value) {
            let messages = errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{path}: {error}")
                    }
                })
                .collect::<Vec<_>>();
            return Err(schema_error(format!(
                "model output does not match the report schema: {}",
                messages.join("; ")
            )));
        }

        let wire = serde_json::from_value::<WireReport>(value)
            .map_err(|err| schema_error(format!("model output has wrong field types: {err}")))?;

        let confidence = wire.confidence.as_deref().and_then(|raw| {
            let parsed = Confidence::parse_lenient(raw);
            if parsed.is_none() {
                tracing::warn!(target: "analysis", confidence = %raw, "unrecognized_confidence_dropped");
            }
            parsed
        });

        Ok(RcaReport {
            impacted_services: wire
                .impacted_services
                .into_iter()
                .map(|service| service.trim().to_string())
                .collect(),
            root_cause: wire.root_cause.trim().to_string(),
            recommended_steps: wire.recommended_steps,
            search_queries: wire.search_queries,
            confidence,
            is_repeated_issue: wire.is_repeated_issue.unwrap_or(false),
            similar_ticket_reference: wire
                .similar_ticket_reference
                .map(|reference| reference.trim().to_string())
                .filter(|reference| !reference.is_empty()),
        })
    }
}
