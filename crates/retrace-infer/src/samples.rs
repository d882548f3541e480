//! Numeric sample extraction from recorded values.

use retrace_core::TraceValue;

/// Every numeric leaf reachable from `values`, in traversal order.
///
/// Recurses through arrays, sets, map keys and values, object fields and
/// typed views. Bytes of a binary buffer count as numbers. Bigints, dates
/// and errors contribute nothing.
pub fn collect_numbers<'a>(values: impl IntoIterator<Item = &'a TraceValue>) -> Vec<f64> {
    let mut out = Vec::new();
    for value in values {
        collect_into(value, &mut out);
    }
    out
}

fn collect_into(value: &TraceValue, out: &mut Vec<f64>) {
    match value {
        TraceValue::Number(n) => out.push(*n),
        TraceValue::Array(items) | TraceValue::Set(items) => {
            items.iter().for_each(|item| collect_into(item, out));
        }
        TraceValue::View { elements, .. } => {
            elements.iter().for_each(|item| collect_into(item, out));
        }
        TraceValue::Map(entries) => {
            for (key, val) in entries {
                collect_into(key, out);
                collect_into(val, out);
            }
        }
        TraceValue::Binary(bytes) => out.extend(bytes.iter().map(|b| f64::from(*b))),
        TraceValue::Object { fields, .. } => {
            fields.values().for_each(|item| collect_into(item, out));
        }
        TraceValue::Undefined
        | TraceValue::Null
        | TraceValue::Bool(_)
        | TraceValue::BigInt(_)
        | TraceValue::String(_)
        | TraceValue::Date(_)
        | TraceValue::Error { .. } => {}
    }
}
