//! Derive — the per-record enrichment pipeline.
//!
//! Stage order matters: `status_type` depends on `status`, `bytes_sent`
//! aliases `body_bytes_sent` before conversion. Every stage skips fields
//! that are already typed, so running `derive` on its own output is the
//! identity. A stage that fails to convert drops the whole record
//! (`None`); the caller keeps processing subsequent lines.

use crate::format::RawCapture;
use crate::record::model::{Record, Value};

/// Derive a typed record from a raw capture. `None` means the record
/// was dropped on a field conversion failure.
pub fn derive(capture: RawCapture) -> Option<Record> {
    derive_record(Record::from_capture(capture))
}

/// Same pipeline over an already-built record; idempotent.
pub fn derive_record(mut record: Record) -> Option<Record> {
    convert_int(&mut record, "status")?;
    derive_status_type(&mut record);
    alias(&mut record, "bytes_sent", "body_bytes_sent");
    convert_int(&mut record, "bytes_sent")?;
    convert_float(&mut record, "request_time")?;
    derive_request_path(&mut record);
    Some(record)
}

/// Convert a string field in place; absent or already-typed fields are
/// left alone. `None` on a value that is neither numeric nor the `-`
/// placeholder.
fn convert_int(record: &mut Record, field: &str) -> Option<()> {
    if let Some(Value::Str(raw)) = record.get(field) {
        let value = to_int(raw)?;
        record.set(field, Value::Int(value));
    }
    Some(())
}

fn convert_float(record: &mut Record, field: &str) -> Option<()> {
    if let Some(Value::Str(raw)) = record.get(field) {
        let value = to_float(raw)?;
        record.set(field, Value::Float(value));
    }
    Some(())
}

fn to_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return Some(0);
    }
    raw.parse().ok()
}

fn to_float(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return Some(0.0);
    }
    raw.parse().ok()
}

fn derive_status_type(record: &mut Record) {
    if record.contains("status_type") {
        return;
    }
    if let Some(Value::Int(status)) = record.get("status") {
        record.set("status_type", Value::Int(status / 100));
    }
}

/// Copy `source` into `field` when `field` is absent. The copy is still
/// raw; conversion happens in the following stage.
fn alias(record: &mut Record, field: &str, source: &str) {
    if record.contains(field) {
        return;
    }
    if let Some(value) = record.get(source).cloned() {
        record.set(field, value);
    }
}

fn derive_request_path(record: &mut Record) {
    if record.contains("request_path") {
        return;
    }
    let uri = match record.get("request_uri") {
        Some(Value::Str(uri)) => Some(uri.clone()),
        _ => match record.get("request") {
            // "$request" is the whole request line: METHOD URI PROTOCOL.
            Some(Value::Str(request)) => {
                request.split_whitespace().nth(1).map(str::to_string)
            }
            _ => None,
        },
    };
    if let Some(uri) = uri {
        record.set("request_path", Value::Str(uri_path(&uri).to_string()));
    }
}

/// Path component of a URI: authority skipped for absolute forms, query
/// string and fragment stripped.
fn uri_path(uri: &str) -> &str {
    let after_authority = match uri.find("://") {
        Some(scheme_end) => {
            let rest = &uri[scheme_end + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "",
            }
        }
        None => uri,
    };
    match after_authority.find(['?', '#']) {
        Some(end) => &after_authority[..end],
        None => after_authority,
    }
}
