//! JSON Schema for one event submission.
//!
//! Structural checks only.  Enum names are matched case-insensitively when
//! the submission is mapped, so the schema accepts any non-empty string there.

use serde_json::{json, Value};

/// Draft 2020-12 schema for the camelCase submission format.
pub fn submission_schema() -> Value {
    let text = json!({ "type": "string", "minLength": 1 });
    let optional_text = json!({ "type": ["string", "null"] });
    let string_map = json!({
        "type": ["object", "null"],
        "additionalProperties": { "type": "string" }
    });
    let json_map = json!({ "type": ["object", "null"] });

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "EventSubmission",
        "type": "object",
        "required": ["actor", "action", "resource"],
        "additionalProperties": false,
        "properties": {
            "id": { "type": ["string", "null"] },
            "timestamp": optional_text,
            "signature": optional_text,
            "actor": {
                "type": "object",
                "required": ["id", "type"],
                "additionalProperties": false,
                "properties": {
                    "id": text,
                    "type": text,
                    "name": optional_text,
                    "ip": optional_text,
                    "userAgent": optional_text,
                    "attributes": string_map
                }
            },
            "action": {
                "type": "object",
                "required": ["type"],
                "additionalProperties": false,
                "properties": {
                    "type": text,
                    "description": optional_text,
                    "category": optional_text
                }
            },
            "resource": {
                "type": "object",
                "required": ["id", "type"],
                "additionalProperties": false,
                "properties": {
                    "id": text,
                    "type": text,
                    "name": optional_text,
                    "before": json_map,
                    "after": json_map
                }
            },
            "metadata": {
                "type": ["object", "null"],
                "required": ["source", "tenantId"],
                "additionalProperties": false,
                "properties": {
                    "source": text,
                    "tenantId": text,
                    "correlationId": optional_text,
                    "sessionId": optional_text,
                    "tags": string_map,
                    "extra": json_map
                }
            }
        }
    })
}
