//! auditchain-ingest: JSON event submissions.
//!
//! Accepts the camelCase submission format used by producers, validates it
//! structurally with JSON Schema, and maps it to `NewEvent`s ready for
//! `ImmutableStore::store_batch`.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use auditchain_ingest::SubmissionParser;
//!
//! let parser = SubmissionParser::new()?;
//! let events = parser.parse_str(&std::fs::read_to_string("events.json")?)?;
//! let records = store.store_batch(events)?;
//! ```

pub mod parser;
pub mod schema;
pub mod submission;

pub use parser::{SubmissionParser, MAX_BATCH_SIZE};
pub use submission::{EventSubmission, DEFAULT_SOURCE, DEFAULT_TENANT};

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use auditchain_contracts::{
        error::{LedgerError, LedgerResult},
        event::{ActionType, ActorType, NewEvent, ResourceType},
    };

    use super::*;

    fn parser() -> SubmissionParser {
        SubmissionParser::new().expect("embedded schema must compile")
    }

    fn minimal() -> Value {
        json!({
            "actor": { "id": "alice", "type": "user" },
            "action": { "type": "create" },
            "resource": { "id": "doc-1", "type": "document" }
        })
    }

    fn validation_reason(result: LedgerResult<Vec<NewEvent>>) -> String {
        match result {
            Err(LedgerError::Validation { reason }) => reason,
            other => panic!("expected Validation error, got {:?}", other),
        }
    }

    // ── 1. Defaults ───────────────────────────────────────────────────────────

    /// A submission without metadata lands in the default tenant with a
    /// generated correlation id, ingest-time timestamp and names from ids.
    #[test]
    fn test_minimal_submission_gets_defaults() {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap();
        let events = parser().parse_value(&minimal(), now).unwrap();
        assert_eq!(events.len(), 1);

        let body = &events[0].body;
        assert_eq!(body.timestamp, now);
        assert_eq!(body.actor.actor_type, ActorType::User);
        assert_eq!(body.actor.name, "alice");
        assert_eq!(body.action.action_type, ActionType::Create);
        assert_eq!(body.resource.resource_type, ResourceType::Document);
        assert_eq!(body.resource.name, "doc-1");
        assert_eq!(body.metadata.source, DEFAULT_SOURCE);
        assert_eq!(body.metadata.tenant_id, DEFAULT_TENANT);

        let correlation = body.metadata.correlation_id.as_deref().unwrap();
        assert!(uuid::Uuid::parse_str(correlation).is_ok(), "got {correlation}");
        assert!(events[0].id.is_none());
        assert!(body.validate().is_ok());
    }

    // ── 2. Full submission ────────────────────────────────────────────────────

    #[test]
    fn test_full_submission_maps_every_field() {
        let submission = json!({
            "id": "5f0c7c9e-3c1f-4c50-9a43-7e0f6f0d2a11",
            "timestamp": "2025-02-01T09:15:30.5+01:00",
            "signature": "MEUCIQ",
            "actor": {
                "id": "svc-7", "type": "SERVICE", "name": "Billing",
                "ip": "10.1.2.3", "userAgent": "curl/8", "attributes": { "team": "pay" }
            },
            "action": { "type": "Approve", "description": "approve refund", "category": "finance" },
            "resource": {
                "id": "tx-1", "type": "transaction", "name": "Refund",
                "before": { "state": "pending" }, "after": { "state": "approved" }
            },
            "metadata": {
                "source": "billing-api", "tenantId": "acme", "correlationId": "corr-9",
                "sessionId": "s-1", "tags": { "env": "prod" }, "extra": { "attempt": 2 }
            }
        });

        let events = parser().parse_value(&submission, Utc::now()).unwrap();
        let event = &events[0];
        let body = &event.body;

        assert_eq!(event.id.unwrap().to_string(), "5f0c7c9e-3c1f-4c50-9a43-7e0f6f0d2a11");
        assert_eq!(event.signature.as_deref(), Some("MEUCIQ"));
        assert_eq!(
            body.timestamp,
            Utc.with_ymd_and_hms(2025, 2, 1, 8, 15, 30).unwrap()
                + chrono::Duration::milliseconds(500)
        );
        assert_eq!(body.actor.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(body.actor.attributes.get("team").map(String::as_str), Some("pay"));
        assert_eq!(body.action.action_type, ActionType::Approve);
        assert_eq!(body.resource.after.as_ref().unwrap()["state"], json!("approved"));
        assert_eq!(body.metadata.tenant_id, "acme");
        assert_eq!(body.metadata.correlation_id.as_deref(), Some("corr-9"));
        assert_eq!(body.metadata.extra.as_ref().unwrap()["attempt"], json!(2));
    }

    // ── 3. Structural violations ──────────────────────────────────────────────

    #[test]
    fn test_missing_required_fields_are_reported_with_paths() {
        let submission = json!({
            "actor": { "type": "user" },
            "action": { "type": "create" },
            "resource": { "id": "doc-1", "type": "document" },
            "metadata": { "source": "api" }
        });

        let reason = validation_reason(parser().parse_value(&submission, Utc::now()));
        assert!(reason.contains("/actor"), "got: {reason}");
        assert!(reason.contains("/metadata"), "got: {reason}");
        assert!(reason.contains("tenantId"), "got: {reason}");
    }

    #[test]
    fn test_unknown_property_is_rejected() {
        let mut submission = minimal();
        submission["hash"] = json!("forged");
        let reason = validation_reason(parser().parse_value(&submission, Utc::now()));
        assert!(reason.contains("hash"), "got: {reason}");
    }

    // ── 4. Mapping violations ─────────────────────────────────────────────────

    /// Unknown enum names and a bad timestamp are all reported together.
    #[test]
    fn test_bad_enums_and_timestamp_are_collected() {
        let mut submission = minimal();
        submission["actor"]["type"] = json!("robot");
        submission["action"]["type"] = json!("teleport");
        submission["timestamp"] = json!("yesterday");

        let reason = validation_reason(parser().parse_value(&submission, Utc::now()));
        assert!(reason.contains("actor.type"), "got: {reason}");
        assert!(reason.contains("action.type"), "got: {reason}");
        assert!(reason.contains("timestamp 'yesterday'"), "got: {reason}");
    }

    #[test]
    fn test_bad_id_is_rejected() {
        let mut submission = minimal();
        submission["id"] = json!("not-a-uuid");
        let reason = validation_reason(parser().parse_value(&submission, Utc::now()));
        assert!(reason.contains("not a UUID"), "got: {reason}");
    }

    // ── 5. Batches ────────────────────────────────────────────────────────────

    #[test]
    fn test_batch_keeps_order() {
        let mut second = minimal();
        second["resource"]["id"] = json!("doc-2");
        let batch = Value::Array(vec![minimal(), second]);

        let events = parser().parse_value(&batch, Utc::now()).unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.body.resource.id.as_str()).collect();
        assert_eq!(ids, ["doc-1", "doc-2"]);
    }

    /// One bad item rejects the whole batch, and its index is named.
    #[test]
    fn test_batch_with_one_bad_item_is_rejected_whole() {
        let mut bad = minimal();
        bad["resource"]["type"] = json!("spaceship");
        let batch = Value::Array(vec![minimal(), bad]);

        let reason = validation_reason(parser().parse_value(&batch, Utc::now()));
        assert!(reason.starts_with("[1]"), "got: {reason}");
    }

    #[test]
    fn test_batch_size_limits() {
        let reason = validation_reason(parser().parse_value(&json!([]), Utc::now()));
        assert!(reason.contains("at least one"), "got: {reason}");

        let oversized = Value::Array(vec![minimal(); MAX_BATCH_SIZE + 1]);
        let reason = validation_reason(parser().parse_value(&oversized, Utc::now()));
        assert!(reason.contains("at most 1000"), "got: {reason}");

        let full = Value::Array(vec![minimal(); MAX_BATCH_SIZE]);
        assert_eq!(parser().parse_value(&full, Utc::now()).unwrap().len(), MAX_BATCH_SIZE);
    }

    #[test]
    fn test_parse_str_rejects_malformed_json() {
        let reason = validation_reason(parser().parse_str("{ not json"));
        assert!(reason.contains("not valid JSON"), "got: {reason}");
    }
}
