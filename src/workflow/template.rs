//! Parameter templating over pod specs
//!
//! Stage pod templates use double-braced `{{name}}` placeholders. Rather
//! than rendering the serialized spec as one opaque string, the renderer
//! walks the JSON form of the spec structurally and substitutes only inside
//! string leaves, preserving the placeholder syntax and its semantics:
//! unknown names render as the empty string.

use std::collections::BTreeMap;

use serde_json::Value;

/// Substitute `{{name}}` placeholders in every string leaf of `value`
pub fn render_params(value: &mut Value, params: &BTreeMap<String, String>) {
    match value {
        Value::String(s) => {
            if s.contains("{{") {
                *s = render_str(s, params);
            }
        }
        Value::Array(items) => {
            for item in items {
                render_params(item, params);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                render_params(item, params);
            }
        }
        _ => {}
    }
}

/// Substitute `{{name}}` placeholders in one string.
///
/// Placeholder names may carry surrounding whitespace (`{{ name }}`).
/// Unterminated placeholders are left as-is.
fn render_str(input: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                if let Some(value) = params.get(name) {
                    out.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                // No closing braces; keep the tail verbatim.
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
