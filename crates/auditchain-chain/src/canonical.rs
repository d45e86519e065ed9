//! Canonical byte encoding of an event body (version 1).
//!
//! This layout is an interoperability contract: any implementation that
//! writes the same bytes produces the same chain.  Changing it requires a new
//! domain tag.
//!
//! Layout, in order:
//!   1. `DOMAIN_TAG`
//!   2. previous_hash
//!   3. timestamp, RFC 3339 UTC with nanoseconds and a `Z` suffix
//!   4. actor: id, type, name, ip?, user_agent?, attributes
//!   5. action: type, description?, category?
//!   6. resource: id, type, name, before?, after?
//!   7. metadata: tenant_id, source, correlation_id?, session_id?, tags?, extra?
//!
//! Primitive encodings:
//!   - string: u64 little-endian byte length, then the UTF-8 bytes
//!   - optional: `0x00` when absent, `0x01` followed by the value when present
//!   - string map: u64 little-endian entry count, then key/value strings in
//!     ascending key order
//!   - JSON map: a string holding compact JSON whose object keys are sorted at
//!     every depth
//!   - enum: its upper-case wire name as a string

use chrono::SecondsFormat;
use serde_json::Value;

use auditchain_contracts::event::{EventBody, JsonMap, StringMap};

/// Prefix that versions the encoding.
pub const DOMAIN_TAG: &[u8] = b"auditchain/event/v1";

/// Build the exact hash input for `body` linked to `previous_hash`.
pub fn encode(body: &EventBody, previous_hash: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(512);
    out.extend_from_slice(DOMAIN_TAG);
    put_str(&mut out, previous_hash);
    put_str(
        &mut out,
        &body.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
    );

    let actor = &body.actor;
    put_str(&mut out, &actor.id);
    put_str(&mut out, actor.actor_type.as_str());
    put_str(&mut out, &actor.name);
    put_opt_str(&mut out, actor.ip.as_deref());
    put_opt_str(&mut out, actor.user_agent.as_deref());
    put_string_map(&mut out, &actor.attributes);

    let action = &body.action;
    put_str(&mut out, action.action_type.as_str());
    put_opt_str(&mut out, action.description.as_deref());
    put_opt_str(&mut out, action.category.as_deref());

    let resource = &body.resource;
    put_str(&mut out, &resource.id);
    put_str(&mut out, resource.resource_type.as_str());
    put_str(&mut out, &resource.name);
    put_opt_json_map(&mut out, resource.before.as_ref());
    put_opt_json_map(&mut out, resource.after.as_ref());

    let metadata = &body.metadata;
    put_str(&mut out, &metadata.tenant_id);
    put_str(&mut out, &metadata.source);
    put_opt_str(&mut out, metadata.correlation_id.as_deref());
    put_opt_str(&mut out, metadata.session_id.as_deref());
    match &metadata.tags {
        None => out.push(0),
        Some(tags) => {
            out.push(1);
            put_string_map(&mut out, tags);
        }
    }
    put_opt_json_map(&mut out, metadata.extra.as_ref());

    out
}

/// Compact JSON with object keys sorted at every depth.
///
/// Independent of whether `serde_json` was built with `preserve_order`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_json(&mut out, value);
    out
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn put_opt_str(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => out.push(0),
        Some(s) => {
            out.push(1);
            put_str(out, s);
        }
    }
}

fn put_string_map(out: &mut Vec<u8>, map: &StringMap) {
    out.extend_from_slice(&(map.len() as u64).to_le_bytes());
    // BTreeMap iterates in ascending key order.
    for (key, value) in map {
        put_str(out, key);
        put_str(out, value);
    }
}

fn put_opt_json_map(out: &mut Vec<u8>, map: Option<&JsonMap>) {
    match map {
        None => out.push(0),
        Some(map) => {
            out.push(1);
            let mut json = String::from("{");
            for (i, (key, value)) in map.iter().enumerate() {
                if i > 0 {
                    json.push(',');
                }
                write_json_string(&mut json, key);
                json.push(':');
                write_json(&mut json, value);
            }
            json.push('}');
            put_str(out, &json);
        }
    }
}

fn write_json(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(out, key);
                out.push(':');
                write_json(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(out, item);
            }
            out.push(']');
        }
        // Scalars have a single compact rendering.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push_str(&Value::String(s.to_string()).to_string());
}
