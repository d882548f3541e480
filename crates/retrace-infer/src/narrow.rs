//! Numeric kind classification and descriptor resolution.
//!
//! A descriptor tree is resolved against the values recorded at its slot
//! across many invocations. Containers narrow their sample set to the
//! matching part of every sample (elements, tuple positions, map keys or
//! values, object properties) before recursing; a placeholder leaf is
//! replaced by the kind of every number reachable at its position.

use std::fmt;

use serde::{Deserialize, Serialize};

use retrace_core::TraceValue;

use crate::descriptor::{parse_descriptor, TypeDesc};
use crate::samples::collect_numbers;

const I32_MIN: f64 = i32::MIN as f64;
const I32_MAX: f64 = i32::MAX as f64;

/// Concrete numeric kind chosen for a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberKind {
    I32,
    I64,
    F32,
    F64,
}

impl NumberKind {
    pub const ALL: [NumberKind; 4] = [NumberKind::I32, NumberKind::I64, NumberKind::F32, NumberKind::F64];

    pub fn as_str(self) -> &'static str {
        match self {
            NumberKind::I32 => "i32",
            NumberKind::I64 => "i64",
            NumberKind::F32 => "f32",
            NumberKind::F64 => "f64",
        }
    }
}

impl fmt::Display for NumberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the narrowest kind able to hold every sample.
///
/// - any non-finite value forces `f64`
/// - any fractional value forces a float, `f64` if some value is not exactly
///   representable in single precision
/// - otherwise an integer, `i64` if some value leaves the `i32` range
///
/// No samples at all yields `i32`.
pub fn classify(samples: &[f64]) -> NumberKind {
    let mut has_float = false;
    let mut needs_f64 = false;
    let mut needs_i64 = false;

    for &value in samples {
        if !value.is_finite() {
            needs_f64 = true;
        } else if value.fract() != 0.0 {
            has_float = true;
            if f64::from(value as f32) != value {
                needs_f64 = true;
            }
        } else if !(I32_MIN..=I32_MAX).contains(&value) {
            needs_i64 = true;
        }
    }

    match (has_float || needs_f64, needs_f64, needs_i64) {
        (true, true, _) => NumberKind::F64,
        (true, false, _) => NumberKind::F32,
        (false, _, true) => NumberKind::I64,
        (false, _, false) => NumberKind::I32,
    }
}

/// Resolves every placeholder of `desc` against `samples`.
pub fn resolve(desc: &TypeDesc, samples: &[&TraceValue]) -> TypeDesc {
    match desc {
        TypeDesc::Plain(_) if desc.is_placeholder() => {
            TypeDesc::Plain(classify(&collect_numbers(samples.iter().copied())).to_string())
        }
        TypeDesc::Plain(_) => desc.clone(),
        TypeDesc::Array(elem) => TypeDesc::Array(Box::new(resolve(elem, &elements_of(samples)))),
        TypeDesc::Tuple(items) => TypeDesc::Tuple(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let at: Vec<&TraceValue> = samples
                        .iter()
                        .filter_map(|s| s.elements().and_then(|els| els.get(i)))
                        .collect();
                    resolve(item, &at)
                })
                .collect(),
        ),
        TypeDesc::Generic { name, args } => TypeDesc::Generic {
            name: name.clone(),
            args: resolve_generic_args(name, args, samples),
        },
        TypeDesc::Object(props) => TypeDesc::Object(
            props
                .iter()
                .map(|prop| {
                    let at: Vec<&TraceValue> =
                        samples.iter().filter_map(|s| s.field(&prop.name)).collect();
                    let mut prop = prop.clone();
                    prop.ty = resolve(&prop.ty, &at);
                    prop
                })
                .collect(),
        ),
        TypeDesc::Union(members) => {
            TypeDesc::Union(members.iter().map(|m| resolve(m, samples)).collect())
        }
    }
}

fn resolve_generic_args(name: &str, args: &[TypeDesc], samples: &[&TraceValue]) -> Vec<TypeDesc> {
    match (name, args) {
        ("Array" | "ReadonlyArray" | "Set" | "ReadonlySet", [elem]) => {
            vec![resolve(elem, &elements_of(samples))]
        }
        ("Map" | "ReadonlyMap" | "WeakMap", [key, value]) => {
            let (keys, values) = map_entries_of(samples);
            vec![resolve(key, &keys), resolve(value, &values)]
        }
        ("Record", [key, value]) => {
            let values: Vec<&TraceValue> = samples
                .iter()
                .copied()
                .filter_map(TraceValue::fields)
                .flat_map(|fields| fields.values())
                .collect();
            // Field names are strings; a numeric key gets no samples.
            vec![resolve(key, &[]), resolve(value, &values)]
        }
        _ => args.iter().map(|arg| resolve(arg, samples)).collect(),
    }
}

fn elements_of<'a>(samples: &[&'a TraceValue]) -> Vec<&'a TraceValue> {
    samples
        .iter()
        .copied()
        .filter_map(TraceValue::elements)
        .flatten()
        .collect()
}

fn map_entries_of<'a>(samples: &[&'a TraceValue]) -> (Vec<&'a TraceValue>, Vec<&'a TraceValue>) {
    let mut keys = Vec::new();
    let mut values = Vec::new();
    for &sample in samples {
        if let TraceValue::Map(entries) = sample {
            for (k, v) in entries {
                keys.push(k);
                values.push(v);
            }
        }
    }
    (keys, values)
}

/// Narrows descriptor text; text without a placeholder or outside the
/// descriptor grammar is returned unchanged.
pub fn narrow_descriptor(text: &str, samples: &[&TraceValue]) -> String {
    let desc = match parse_descriptor(text) {
        Ok(desc) => desc,
        Err(e) => {
            tracing::trace!(descriptor = text, error = %e, "leaving descriptor as recorded");
            return text.to_string();
        }
    };
    if !desc.contains_placeholder() {
        return text.to_string();
    }
    resolve(&desc, samples).to_string()
}
