//! TypeScript expressions for recorded values.
//!
//! Every [`TraceValue`] variant maps to a self-contained expression that
//! rebuilds an equal value at replay time. Class-tagged objects are rebuilt
//! on the class prototype reachable through the unit's `__g` global alias,
//! falling back to a plain object when the class is not global.

use retrace_core::TraceValue;
use retrace_infer::is_identifier;

/// Renders `value` as a TypeScript expression.
pub fn value_expr(value: &TraceValue) -> String {
    match value {
        TraceValue::Undefined => "undefined".to_string(),
        TraceValue::Null => "null".to_string(),
        TraceValue::Bool(b) => b.to_string(),
        TraceValue::Number(n) => number_expr(*n),
        TraceValue::BigInt(digits) => format!("{digits}n"),
        TraceValue::String(s) => string_literal(s),
        TraceValue::Array(items) => format!("[{}]", join(items)),
        TraceValue::Set(items) => format!("new Set([{}])", join(items)),
        TraceValue::Map(entries) => {
            let pairs: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("[{}, {}]", value_expr(k), value_expr(v)))
                .collect();
            format!("new Map<any, any>([{}])", pairs.join(", "))
        }
        TraceValue::Date(iso) => format!("new Date({})", string_literal(iso)),
        TraceValue::Binary(bytes) => format!("new Uint8Array([{}]).buffer", byte_list(bytes)),
        TraceValue::View { kind, elements } => view_expr(kind, elements),
        TraceValue::Object { class, fields } => {
            let body = object_literal(fields.iter());
            match class {
                Some(class) => format!(
                    "Object.assign(Object.create(__g[{}]?.prototype ?? Object.prototype), {body})",
                    string_literal(class)
                ),
                None => body,
            }
        }
        TraceValue::Error { name, message } => format!(
            "Object.assign(new Error({}), {{ name: {} }})",
            string_literal(message),
            string_literal(name)
        ),
    }
}

/// `{ a: 1, "b-c": 2 }`, or `{}` without fields.
pub fn object_literal<'a>(fields: impl Iterator<Item = (&'a String, &'a TraceValue)>) -> String {
    let entries: Vec<String> = fields
        .map(|(name, value)| format!("{}: {}", property_key(name), value_expr(value)))
        .collect();
    if entries.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", entries.join(", "))
    }
}

/// A property name as written in an object literal.
pub fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        string_literal(name)
    }
}

/// Double-quoted string literal with JSON-compatible escapes.
pub fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn number_expr(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else {
        n.to_string()
    }
}

fn view_expr(kind: &str, elements: &[TraceValue]) -> String {
    if kind == "DataView" {
        let bytes: Vec<String> = elements.iter().map(value_expr).collect();
        return format!("new DataView(new Uint8Array([{}]).buffer)", bytes.join(", "));
    }
    if is_identifier(kind) {
        format!("new {kind}([{}])", join(elements))
    } else {
        tracing::debug!(kind, "view kind is not a constructor name; emitting a plain array");
        format!("[{}]", join(elements))
    }
}

fn join(items: &[TraceValue]) -> String {
    items.iter().map(value_expr).collect::<Vec<_>>().join(", ")
}

fn byte_list(bytes: &[u8]) -> String {
    bytes.iter().map(u8::to_string).collect::<Vec<_>>().join(", ")
}
