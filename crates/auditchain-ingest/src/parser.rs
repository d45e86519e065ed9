//! Submission parser.
//!
//! Two phases, both collecting every failure before returning:
//!
//! 1. **Structural**: each submission is validated against
//!    `submission_schema()` using the `jsonschema` crate.
//! 2. **Mapping**: enum names, timestamps and ids are parsed and defaults
//!    filled (see `EventSubmission::into_new_event`).
//!
//! Nothing is returned unless the whole input is valid, so a batch is never
//! half-accepted.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use auditchain_contracts::{
    error::{LedgerError, LedgerResult},
    event::NewEvent,
};

use crate::{schema::submission_schema, submission::EventSubmission};

/// Largest accepted batch.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Validates JSON submissions and maps them to `NewEvent`s.
pub struct SubmissionParser {
    validator: jsonschema::Validator,
}

impl SubmissionParser {
    /// Compile the embedded submission schema.
    pub fn new() -> LedgerResult<Self> {
        let validator =
            jsonschema::validator_for(&submission_schema()).map_err(|e| LedgerError::Config {
                reason: format!("invalid submission schema: {}", e),
            })?;
        Ok(Self { validator })
    }

    /// Parse a document holding one submission object or an array of them.
    pub fn parse_str(&self, input: &str) -> LedgerResult<Vec<NewEvent>> {
        let value: Value = serde_json::from_str(input).map_err(|e| LedgerError::Validation {
            reason: format!("submission is not valid JSON: {}", e),
        })?;
        self.parse_value(&value, Utc::now())
    }

    /// Parse an already decoded document.  `now` fills missing timestamps.
    pub fn parse_value(&self, value: &Value, now: DateTime<Utc>) -> LedgerResult<Vec<NewEvent>> {
        match value {
            Value::Array(items) => self.parse_batch(items, now),
            single => self.parse_one(single, now).map(|event| vec![event]),
        }
    }

    /// Validate and map one submission object.
    pub fn parse_one(&self, value: &Value, now: DateTime<Utc>) -> LedgerResult<NewEvent> {
        let violations = self.schema_violations(value, "");
        if !violations.is_empty() {
            return Err(LedgerError::Validation {
                reason: violations.join("; "),
            });
        }
        Self::map(value, now)
    }

    fn parse_batch(&self, items: &[Value], now: DateTime<Utc>) -> LedgerResult<Vec<NewEvent>> {
        if items.is_empty() {
            return Err(LedgerError::Validation {
                reason: "batch must contain at least one event".to_string(),
            });
        }
        if items.len() > MAX_BATCH_SIZE {
            return Err(LedgerError::Validation {
                reason: format!(
                    "batch holds {} events; at most {} are accepted",
                    items.len(),
                    MAX_BATCH_SIZE
                ),
            });
        }

        let mut failures = Vec::new();
        let mut events = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let violations = self.schema_violations(item, &format!("[{index}]"));
            if !violations.is_empty() {
                failures.extend(violations);
                continue;
            }
            match Self::map(item, now) {
                Ok(event) => events.push(event),
                Err(LedgerError::Validation { reason }) => {
                    failures.push(format!("[{index}]: {reason}"))
                }
                Err(other) => return Err(other),
            }
        }

        if !failures.is_empty() {
            warn!(
                batch = items.len(),
                failures = failures.len(),
                "submission batch rejected"
            );
            return Err(LedgerError::Validation {
                reason: failures.join("; "),
            });
        }
        debug!(batch = events.len(), "submission batch accepted");
        Ok(events)
    }

    fn schema_violations(&self, value: &Value, prefix: &str) -> Vec<String> {
        self.validator
            .iter_errors(value)
            .map(|error| {
                format!(
                    "JSON Schema violation at {}{}: {}",
                    prefix, error.instance_path, error
                )
            })
            .collect()
    }

    fn map(value: &Value, now: DateTime<Utc>) -> LedgerResult<NewEvent> {
        let submission: EventSubmission =
            serde_json::from_value(value.clone()).map_err(|e| LedgerError::Validation {
                reason: format!("submission does not match the event format: {}", e),
            })?;
        submission.into_new_event(now)
    }
}
