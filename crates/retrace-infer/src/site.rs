//! Signature narrowing across every recorded invocation of one call site.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use retrace_core::{CallTriple, FnId, OutcomeTypes, TraceValue};

use crate::narrow::narrow_descriptor;

/// Narrowed type descriptors of one call site.
///
/// Every slot is aggregated from the matching slot of all sample triples;
/// the descriptor text itself comes from the first triple that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrowedSignature {
    pub fn_id: FnId,
    pub this_type: String,
    pub args_types: Vec<String>,
    /// Pre-call env descriptors.
    pub env_types: IndexMap<String, String>,
    /// Post-call env descriptors.
    pub exit_env_types: IndexMap<String, String>,
    pub outcome_types: OutcomeTypes,
}

/// Narrows every typed slot of a call site from its sample triples.
///
/// Returns `None` if no triple carries an enter or exit event.
pub fn narrow_call_site(triples: &[CallTriple]) -> Option<NarrowedSignature> {
    let base_enter = triples.iter().find_map(|t| t.enter.as_ref());
    let base_exit = triples.iter().find_map(|t| t.exit.as_ref());
    let fn_id = base_enter
        .map(|e| e.fn_id.clone())
        .or_else(|| base_exit.map(|e| e.fn_id.clone()))?;

    let enters: Vec<_> = triples.iter().filter_map(|t| t.enter.as_ref()).collect();
    let exits: Vec<_> = triples.iter().filter_map(|t| t.exit.as_ref()).collect();

    let mut sig = NarrowedSignature {
        fn_id,
        this_type: String::new(),
        args_types: Vec::new(),
        env_types: IndexMap::new(),
        exit_env_types: IndexMap::new(),
        outcome_types: OutcomeTypes::default(),
    };

    if let Some(base) = base_enter {
        let receivers: Vec<&TraceValue> = enters
            .iter()
            .map(|e| &e.this_value)
            .filter(|v| !v.is_undefined())
            .collect();
        sig.this_type = narrow_descriptor(&base.this_type, &receivers);

        sig.args_types = base
            .args_types
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                let at: Vec<&TraceValue> = enters.iter().filter_map(|e| e.args.get(i)).collect();
                narrow_descriptor(ty, &at)
            })
            .collect();

        sig.env_types = base
            .env_types
            .iter()
            .map(|(name, ty)| {
                let at: Vec<&TraceValue> = enters.iter().filter_map(|e| e.env.get(name)).collect();
                (name.clone(), narrow_descriptor(ty, &at))
            })
            .collect();
    }

    if let Some(base) = base_exit {
        sig.exit_env_types = base
            .env_types
            .iter()
            .map(|(name, ty)| {
                let at: Vec<&TraceValue> = exits.iter().filter_map(|e| e.env.get(name)).collect();
                (name.clone(), narrow_descriptor(ty, &at))
            })
            .collect();

        let returned: Vec<&TraceValue> = exits.iter().filter_map(|e| e.outcome.returned()).collect();
        let thrown: Vec<&TraceValue> = exits.iter().filter_map(|e| e.outcome.thrown()).collect();
        sig.outcome_types = OutcomeTypes::new(
            narrow_descriptor(base.outcome_types.return_type(), &returned),
            narrow_descriptor(base.outcome_types.error_type(), &thrown),
        );
    }

    Some(sig)
}

impl NarrowedSignature {
    /// Copy of `triple` with this signature's descriptors in place of the
    /// recorded ones. Slots the triple lacks are left empty.
    pub fn apply(&self, triple: &CallTriple) -> CallTriple {
        let mut out = triple.clone();
        if let Some(enter) = out.enter.as_mut() {
            enter.this_type = self.this_type.clone();
            if enter.args_types.len() == self.args_types.len() {
                enter.args_types = self.args_types.clone();
            }
            overwrite_types(&mut enter.env_types, &self.env_types);
        }
        if let Some(exit) = out.exit.as_mut() {
            exit.outcome_types = self.outcome_types.clone();
            overwrite_types(&mut exit.env_types, &self.exit_env_types);
        }
        out
    }
}

fn overwrite_types(target: &mut IndexMap<String, String>, narrowed: &IndexMap<String, String>) {
    for (name, ty) in target.iter_mut() {
        if let Some(n) = narrowed.get(name) {
            *ty = n.clone();
        }
    }
}
