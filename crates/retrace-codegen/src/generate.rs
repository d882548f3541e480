//! Replay unit synthesis for one call triple.
//!
//! A unit is a standalone TypeScript module exporting
//! `replay_wrapper(): boolean`. It rebuilds the recorded inputs as literals,
//! swaps every recorded collaborator for a stub that replays its recorded
//! outcome, performs the call and compares the live outcome and environment
//! with the recording.

use indexmap::IndexMap;

use retrace_core::{
    sanitize_segment, CallId, CallTriple, EnterEvent, ExitEvent, FnId, FnIdParts, FnKind, Invocation,
    Outcome, TraceValue,
};
use retrace_infer::{is_identifier, narrow_call_site, parse_descriptor, NumberKind, ShapeRegistry};
use retrace_storage::{find_site_triples, require_triple, ReplayIndex, StorageError};

use crate::emitter::Emitter;
use crate::error::CodegenError;
use crate::literal::{object_literal, string_literal, value_expr};
use crate::ReplayOptions;

/// Helpers shared by every unit: deep equality, sequential stubs and
/// restorable installation.
pub const PRELUDE: &str = r#"function __replayEq(a: unknown, b: unknown): boolean {
  if (Object.is(a, b)) return true;
  if (typeof a === "number" && typeof b === "number") return a === b;
  if (typeof a !== "object" || typeof b !== "object" || a === null || b === null) return false;
  if (a instanceof Date && b instanceof Date) return Object.is(a.getTime(), b.getTime());
  if (a instanceof Error && b instanceof Error) return a.name === b.name && a.message === b.message;
  if (a instanceof Map && b instanceof Map) {
    if (a.size !== b.size) return false;
    const right = [...b.entries()];
    return [...a.entries()].every(([k, v], i) => __replayEq(k, right[i][0]) && __replayEq(v, right[i][1]));
  }
  if (a instanceof Set && b instanceof Set) return __replayEq([...a], [...b]);
  if (a instanceof ArrayBuffer && b instanceof ArrayBuffer) {
    return __replayEq(new Uint8Array(a), new Uint8Array(b));
  }
  if (ArrayBuffer.isView(a) && ArrayBuffer.isView(b)) {
    const left = new Uint8Array(a.buffer, a.byteOffset, a.byteLength);
    const right = new Uint8Array(b.buffer, b.byteOffset, b.byteLength);
    return left.length === right.length && left.every((x, i) => x === right[i]);
  }
  if (Array.isArray(a) || Array.isArray(b)) {
    if (!Array.isArray(a) || !Array.isArray(b) || a.length !== b.length) return false;
    return a.every((x, i) => __replayEq(x, b[i]));
  }
  const left = a as Record<string, unknown>;
  const right = b as Record<string, unknown>;
  const keys = Object.keys(left);
  if (keys.length !== Object.keys(right).length) return false;
  return keys.every((k) => Object.prototype.hasOwnProperty.call(right, k) && __replayEq(left[k], right[k]));
}

type __ReplayCall = { args: unknown[]; run: (args: unknown[]) => unknown };

function __replayStub(name: string, calls: __ReplayCall[]): any {
  let next = 0;
  return function (this: unknown, ...args: unknown[]): unknown {
    const call = calls[next++];
    if (call === undefined) {
      throw new Error(`replay diverged: unexpected call #${next} to ${name}`);
    }
    if (!__replayEq(args, call.args)) {
      throw new Error(`replay diverged: ${name} received unexpected arguments`);
    }
    return call.run(args);
  };
}

function __replayInstall(owner: any, key: string, value: unknown, restores: (() => void)[]): void {
  const had = Object.prototype.hasOwnProperty.call(owner, key);
  const previous = owner[key];
  owner[key] = value;
  restores.push(() => {
    if (had) owner[key] = previous;
    else delete owner[key];
  });
}
"#;

const RESERVED_WORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
    "null", "package", "private", "protected", "public", "return", "static", "super", "switch",
    "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
];

/// `replay_<fnId>_<callId>.generated.ts`, both ids sanitized.
pub fn replay_unit_file_name(fn_id: &FnId, call_id: &CallId) -> String {
    format!(
        "replay_{}_{}.generated.ts",
        sanitize_segment(fn_id.as_str()),
        sanitize_segment(call_id.as_str())
    )
}

/// Generates the replay unit of `triple`.
///
/// Child triples are looked up through `index`. With
/// [`ReplayOptions::use_type_names`] set, the descriptors already on
/// `triple` are emitted as annotations and every collaborator's descriptors
/// are narrowed across its whole call site first.
pub fn generate_replay_source(
    triple: &CallTriple,
    index: &ReplayIndex,
    options: &ReplayOptions,
) -> Result<String, CodegenError> {
    let Some(enter) = triple.enter.as_ref() else {
        return Err(CodegenError::MissingEnter {
            call_id: triple.call_id().cloned().unwrap_or_else(|| CallId::new("?")),
        });
    };
    if let Some(exit) = &triple.exit {
        if exit.env.len() != enter.env.len() {
            return Err(CodegenError::EnvSizeMismatch {
                call_id: enter.call_id.clone(),
                enter: enter.env.len(),
                exit: exit.env.len(),
            });
        }
    }
    triple.validate()?;

    let parts = enter.fn_id.parts()?;
    let mut unit = UnitWriter {
        index,
        typed: options.use_type_names,
        shapes: ShapeRegistry::new(),
        out: Emitter::new(),
    };
    unit.wrapper(triple, enter, &parts)?;
    let body = std::mem::take(&mut unit.out).finish();

    let mut out = Emitter::new();
    out.line(&format!("// fnId: {} callId: {}", enter.fn_id, enter.call_id));
    out.blank();
    out.line("const __g = globalThis as any;");
    out.blank();
    if unit.typed {
        for kind in NumberKind::ALL {
            out.line(&format!("type {kind} = number;"));
        }
        for (name, shape) in unit.shapes.declarations() {
            out.line(&format!("interface {name} {shape}"));
        }
        out.blank();
    }
    out.push_str(PRELUDE);
    out.blank();
    out.push_str(&body);
    Ok(out.finish())
}

struct UnitWriter<'a> {
    index: &'a ReplayIndex,
    typed: bool,
    shapes: ShapeRegistry,
    out: Emitter,
}

/// Stubs of one collaborator, in recorded call order.
struct StubGroup {
    parts: FnIdParts,
    calls: Vec<CallTriple>,
    /// Name of the captured real class, for constructor stubs.
    real: Option<String>,
}

impl UnitWriter<'_> {
    fn wrapper(&mut self, triple: &CallTriple, enter: &EnterEvent, parts: &FnIdParts) -> Result<(), CodegenError> {
        let kind = parts.kind();
        let children = triple.children();
        let implicit_ctor = match children.first() {
            Some(first) if kind == FnKind::Method && builds_receiver(enter, parts, first)? => Some(first),
            _ => None,
        };
        let collaborators = if implicit_ctor.is_some() {
            &children[1..]
        } else {
            children
        };
        let mut groups = self.stub_groups(&enter.call_id, collaborators)?;

        self.out.open_block("export function replay_wrapper(): boolean");

        self.out.line("// arguments");
        let mut names = Vec::with_capacity(enter.args.len());
        for (i, arg) in enter.args.iter().enumerate() {
            let name = format!("__arg{i}");
            let ty = self.annotation(enter.args_types.get(i).map(String::as_str));
            self.out.line(&format!("const {name}{ty} = {};", value_expr(arg)));
            names.push(name);
        }
        self.out.line(&format!("const __args: any[] = [{}];", names.join(", ")));

        let exit_env = triple.exit.as_ref().map(|exit| &exit.env);
        let composite_env = enter
            .env
            .keys()
            .chain(exit_env.into_iter().flat_map(|env| env.keys()))
            .any(|name| !is_plain_binding(name));
        if !enter.env.is_empty() || exit_env.is_some_and(|env| !env.is_empty()) {
            self.out.line("// environment");
            self.env_bindings(enter, triple.exit.as_ref(), composite_env);
        }

        self.out.line("// target");
        match &parts.declaring_type {
            Some(ty) => self.out.line(&format!("const __Type = __g[{}];", string_literal(ty))),
            None => self.out.line(&format!("const __target = __g[{}];", string_literal(&parts.name))),
        }
        if kind == FnKind::Method {
            self.receiver(enter, parts, implicit_ctor)?;
        }

        let mut real_count = 0;
        for group in groups.values_mut() {
            if group.parts.is_constructor() {
                let real = format!("__real{real_count}");
                real_count += 1;
                let class = group.parts.declaring_type.as_deref().unwrap_or(&group.parts.name);
                self.out.line(&format!("const {real} = __g[{}];", string_literal(class)));
                group.real = Some(real);
            }
        }

        self.out.line("const __restores: (() => void)[] = [];");
        self.out.open_block("try");
        if !enter.env.is_empty() {
            self.out.line("// environment");
            self.install_env(enter, composite_env);
        }
        if !groups.is_empty() {
            self.out.line("// collaborators");
            for group in groups.values() {
                self.install_stub(group);
            }
        }
        self.out.line("// call");
        let call = match kind {
            FnKind::Function => "__target(...__args)",
            FnKind::Method => "__method.apply(__this, __args)",
            FnKind::Constructor => "new __Type(...__args)",
        };
        self.call_and_check(call, triple.exit.as_ref());
        if let Some(exit) = triple.exit.as_ref().filter(|exit| !exit.env.is_empty()) {
            // Read back before the finally block restores the globals.
            self.out.line("// environment check");
            self.check_env(enter, exit, composite_env);
        }
        self.out.continue_block("finally");
        self.out.line("for (const restore of __restores.reverse()) restore();");
        self.out.close_block();
        self.out.line("return true;");
        self.out.close_block();
        Ok(())
    }

    /// Resolves every collaborator triple and groups them by fnId.
    fn stub_groups(
        &mut self,
        parent: &CallId,
        children: &[Invocation],
    ) -> Result<IndexMap<FnId, StubGroup>, CodegenError> {
        let mut groups: IndexMap<FnId, StubGroup> = IndexMap::new();
        for child in children {
            let triple = self.child_triple(parent, child)?;
            if let Some(group) = groups.get_mut(&child.fn_id) {
                group.calls.push(triple);
                continue;
            }
            groups.insert(
                child.fn_id.clone(),
                StubGroup {
                    parts: child.fn_id.parts()?,
                    calls: vec![triple],
                    real: None,
                },
            );
        }

        if self.typed {
            for group in groups.values_mut() {
                let Some(call_id) = group.calls.first().and_then(|t| t.call_id().cloned()) else {
                    continue;
                };
                let site = find_site_triples(&call_id, self.index)?;
                if let Some(sig) = narrow_call_site(&site) {
                    group.calls = group.calls.iter().map(|t| sig.apply(t)).collect();
                }
            }
        }
        Ok(groups)
    }

    /// Looks up a child's triple, which must carry the child's fnId.
    fn child_triple(&self, parent: &CallId, child: &Invocation) -> Result<CallTriple, CodegenError> {
        let triple = require_triple(&child.call_id, self.index).map_err(|e| match e {
            StorageError::UnknownCall(_) => CodegenError::UnknownChild {
                parent: parent.clone(),
                child: child.clone(),
            },
            other => other.into(),
        })?;
        match triple.fn_id() {
            Some(found) if found == &child.fn_id => Ok(triple),
            found => Err(CodegenError::ChildMismatch {
                parent: parent.clone(),
                child: child.clone(),
                found: found.cloned(),
            }),
        }
    }

    fn env_bindings(&mut self, enter: &EnterEvent, exit: Option<&ExitEvent>, composite: bool) {
        if composite {
            self.out.line(&format!("const env: any = {};", object_literal(enter.env.iter())));
            if let Some(exit) = exit {
                self.out
                    .line(&format!("const expectedEnv: any = {};", object_literal(exit.env.iter())));
            }
            return;
        }
        for (name, value) in &enter.env {
            let ty = self.annotation(enter.env_types.get(name).map(String::as_str));
            self.out.line(&format!("let {name}{ty} = {};", value_expr(value)));
        }
        if let Some(exit) = exit {
            for (name, value) in &exit.env {
                let ty = self.annotation(exit.env_types.get(name).map(String::as_str));
                self.out.line(&format!("const expected_{name}{ty} = {};", value_expr(value)));
            }
        }
    }

    /// Installs the pre-call environment on the global object so the target
    /// reads it. Restored by the finally block.
    fn install_env(&mut self, enter: &EnterEvent, composite: bool) {
        if composite {
            self.out.line(
                "for (const [key, value] of Object.entries(env)) __replayInstall(__g, key, value, __restores);",
            );
            return;
        }
        for name in enter.env.keys() {
            self.out
                .line(&format!("__replayInstall(__g, {}, {name}, __restores);", string_literal(name)));
        }
    }

    /// Compares the live globals with the post-call environment.
    fn check_env(&mut self, enter: &EnterEvent, exit: &ExitEvent, composite: bool) {
        if composite {
            self.out.line("const __envAfter: any = {};");
            self.out
                .line("for (const key of Object.keys(expectedEnv)) __envAfter[key] = __g[key];");
            self.out.line("if (!__replayEq(__envAfter, expectedEnv)) return false;");
            return;
        }
        for name in exit.env.keys() {
            let live = format!("__g[{}]", string_literal(name));
            if enter.env.contains_key(name) {
                self.out.line(&format!("{name} = {live};"));
                self.out
                    .line(&format!("if (!__replayEq({name}, expected_{name})) return false;"));
            } else {
                self.out
                    .line(&format!("if (!__replayEq({live}, expected_{name})) return false;"));
            }
        }
    }

    /// Binds `__this` and `__method` for a method call.
    fn receiver(
        &mut self,
        enter: &EnterEvent,
        parts: &FnIdParts,
        ctor: Option<&Invocation>,
    ) -> Result<(), CodegenError> {
        self.out.line("// receiver");
        match ctor {
            Some(ctor) => {
                let ctor_triple = self.child_triple(&enter.call_id, ctor)?;
                let ctor_enter = ctor_triple.require_enter()?;
                let mut names = Vec::with_capacity(ctor_enter.args.len());
                for (i, arg) in ctor_enter.args.iter().enumerate() {
                    let name = format!("__ctorArg{i}");
                    let ty = self.annotation(ctor_enter.args_types.get(i).map(String::as_str));
                    self.out.line(&format!("const {name}{ty} = {};", value_expr(arg)));
                    names.push(name);
                }
                let ctor_class = ctor.fn_id.parts()?.declaring_type;
                let class = match ctor_class {
                    Some(c) if Some(&c) != parts.declaring_type.as_ref() => format!("__g[{}]", string_literal(&c)),
                    _ => "__Type".to_string(),
                };
                self.out.line(&format!("const __this: any = new {class}({});", names.join(", ")));
            }
            None if enter.this_value.is_undefined() => self.out.line("const __this: any = __Type;"),
            None => self.out.line("const __this: any = Object.create(__Type.prototype);"),
        }
        if let Some(fields) = enter.this_value.fields() {
            for (field, value) in fields {
                self.out
                    .line(&format!("__this[{}] = {};", string_literal(field), value_expr(value)));
            }
        }
        self.out
            .line(&format!("const __method = __this[{}];", string_literal(&parts.name)));
        Ok(())
    }

    fn install_stub(&mut self, group: &StubGroup) {
        let parts = &group.parts;
        let label = match &parts.declaring_type {
            Some(ty) if parts.is_constructor() => ty.clone(),
            Some(ty) => format!("{ty}.{}", parts.name),
            None => parts.name.clone(),
        };

        if let Some(real) = &group.real {
            let class = string_literal(&label);
            self.out.open_block("");
            self.out.line(&format!("const __stub = __replayStub({class}, ["));
            self.out.indent();
            for call in &group.calls {
                let args = recorded_args(call);
                self.out
                    .line(&format!("{{ args: {args}, run: (a) => Reflect.construct({real}, a) }},"));
            }
            self.out.dedent();
            self.out.line("]);");
            self.out.line(&format!("__stub.prototype = {real}.prototype;"));
            self.out.line(&format!("__replayInstall(__g, {class}, __stub, __restores);"));
            self.out.close_block();
            return;
        }

        let owner = match &parts.declaring_type {
            None => "__g".to_string(),
            Some(ty) if is_static_call(group) => format!("__g[{}]", string_literal(ty)),
            Some(ty) => format!("__g[{}].prototype", string_literal(ty)),
        };
        self.out.line(&format!(
            "__replayInstall({owner}, {}, __replayStub({}, [",
            string_literal(&parts.name),
            string_literal(&label)
        ));
        self.out.indent();
        for call in &group.calls {
            let args = recorded_args(call);
            let run = self.stub_run(call);
            self.out.line(&format!("{{ args: {args}, run: {run} }},"));
        }
        self.out.dedent();
        self.out.line("]), __restores);");
    }

    fn stub_run(&mut self, call: &CallTriple) -> String {
        let Some(exit) = &call.exit else {
            return "() => undefined".to_string();
        };
        match &exit.outcome {
            Outcome::Threw { error } => format!("() => {{ throw {}; }}", value_expr(error)),
            Outcome::Returned { value } => {
                let ty = self.annotation(Some(exit.outcome_types.return_type()));
                format!("(){ty} => {}", value_expr(value))
            }
        }
    }

    fn call_and_check(&mut self, call: &str, exit: Option<&ExitEvent>) {
        let Some(exit) = exit else {
            self.out.line(&format!("{call};"));
            return;
        };
        match &exit.outcome {
            Outcome::Threw { .. } => {
                self.out.line("let __threw = false;");
                self.out.open_block("try");
                self.out.line(&format!("{call};"));
                self.out.continue_block("catch");
                self.out.line("__threw = true;");
                self.out.close_block();
                self.out.line("if (!__threw) return false;");
            }
            Outcome::Returned { value } if !value.is_undefined() && exit.outcome_types.return_type() != "void" => {
                let ty = self.annotation(Some(exit.outcome_types.return_type()));
                self.out.line(&format!("const __expected{ty} = {};", value_expr(value)));
                self.out.line(&format!("const __ret = {call};"));
                self.out.line("if (!__replayEq(__ret, __expected)) return false;");
            }
            Outcome::Returned { .. } => self.out.line(&format!("{call};")),
        }
    }

    /// `: T` for a recorded descriptor in typed mode, empty otherwise.
    fn annotation(&mut self, descriptor: Option<&str>) -> String {
        let Some(descriptor) = descriptor.map(str::trim).filter(|d| self.typed && !d.is_empty()) else {
            return String::new();
        };
        match parse_descriptor(descriptor) {
            Ok(desc) => format!(": {}", self.shapes.name_shapes(&desc)),
            Err(_) => format!(": {descriptor}"),
        }
    }
}

fn recorded_args(call: &CallTriple) -> String {
    let args: &[TraceValue] = call.enter.as_ref().map(|e| e.args.as_slice()).unwrap_or(&[]);
    format!("[{}]", args.iter().map(value_expr).collect::<Vec<_>>().join(", "))
}

/// Whether `first`, the first child of a method call, constructed that
/// method's receiver.
///
/// It must be a constructor of the receiver's recorded class (the method's
/// declaring type when the receiver carries no class) and must have started
/// before the method. Any other constructor child was called from inside
/// the method and is stubbed like every other collaborator.
fn builds_receiver(enter: &EnterEvent, parts: &FnIdParts, first: &Invocation) -> Result<bool, CodegenError> {
    let ctor = first.fn_id.parts()?;
    if !ctor.is_constructor() {
        return Ok(false);
    }
    let receiver_class = match &enter.this_value {
        TraceValue::Object { class: Some(class), .. } => Some(class.as_str()),
        _ => parts.declaring_type.as_deref(),
    };
    if ctor.declaring_type.as_deref() != receiver_class {
        return Ok(false);
    }
    Ok(matches!(
        (first.call_id.counter(), enter.call_id.counter()),
        (Some(ctor_call), Some(method_call)) if ctor_call < method_call
    ))
}

/// A method collaborator whose receivers were all recorded as `undefined`
/// was called on the class itself.
fn is_static_call(group: &StubGroup) -> bool {
    group
        .calls
        .iter()
        .filter_map(|t| t.enter.as_ref())
        .all(|e| e.this_value.is_undefined())
}

/// Env names usable as standalone `let` bindings without shadowing the
/// unit's own names. Any other name switches the unit to a composite
/// `env` object.
fn is_plain_binding(name: &str) -> bool {
    is_identifier(name)
        && !RESERVED_WORDS.contains(&name)
        && !name.starts_with("__")
        && !name.starts_with("expected_")
        && name != "env"
        && name != "expectedEnv"
}
