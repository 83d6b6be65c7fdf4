//! Deterministic request fingerprints.
//!
//! The canonical form is only ever hashed into a [`CacheKey`]; nothing parses
//! it back. Attribute names are sorted, records recurse, and set members are
//! rendered, sorted and deduplicated, so two requests that differ only in
//! insertion order produce the same key.

use authz_cache::CacheKey;

use crate::errors::AuthzError;
use crate::model::{AttrValue, AuthorizationRequest, Context, EntityUid};
use crate::policy::PolicySetVersion;

const FORMAT_TAG: &str = "authz-key:v1";

pub fn derive_key(
    request: &AuthorizationRequest,
    version: PolicySetVersion,
) -> Result<CacheKey, AuthzError> {
    let canonical = canonical_form(request, version)?;
    Ok(CacheKey::from_canonical(&canonical))
}

/// Fails with `InvalidRequest` before touching anything else when an
/// identifier does not follow `Type::"id"`.
pub fn canonical_form(
    request: &AuthorizationRequest,
    version: PolicySetVersion,
) -> Result<String, AuthzError> {
    let principal = EntityUid::parse("principal", request.principal())?;
    let action = EntityUid::parse("action", request.action())?;
    let resource = EntityUid::parse("resource", request.resource())?;

    let mut out = String::with_capacity(128);
    out.push_str(FORMAT_TAG);
    push_line(&mut out, "p", &principal.to_string());
    push_line(&mut out, "a", &action.to_string());
    push_line(&mut out, "r", &resource.to_string());

    out.push_str("\nc:");
    write_context(request.context(), &mut out);

    out.push_str("\ne:");
    match request.entities() {
        Some(store) => {
            write_string(&store.store_id, &mut out);
            out.push('@');
            out.push_str(&store.revision.to_string());
        }
        None => out.push('-'),
    }

    push_line(&mut out, "pv", &version.to_string());
    Ok(out)
}

fn push_line(out: &mut String, tag: &str, value: &str) {
    out.push('\n');
    out.push_str(tag);
    out.push(':');
    out.push_str(value);
}

fn write_context(context: &Context, out: &mut String) {
    let mut entries: Vec<(&String, &AttrValue)> = context.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    write_entries(entries, out);
}

fn write_entries(entries: Vec<(&String, &AttrValue)>, out: &mut String) {
    out.push('{');
    for (idx, (name, value)) in entries.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        write_string(name, out);
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

fn write_value(value: &AttrValue, out: &mut String) {
    match value {
        AttrValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        AttrValue::Long(n) => out.push_str(&n.to_string()),
        AttrValue::String(s) => write_string(s, out),
        AttrValue::Set(items) => {
            let mut rendered: Vec<String> = items
                .iter()
                .map(|item| {
                    let mut buf = String::new();
                    write_value(item, &mut buf);
                    buf
                })
                .collect();
            rendered.sort();
            rendered.dedup();
            out.push('[');
            out.push_str(&rendered.join(","));
            out.push(']');
        }
        AttrValue::Record(fields) => {
            let mut entries: Vec<(&String, &AttrValue)> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            write_entries(entries, out);
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&serde_json::Value::from(s).to_string());
}
