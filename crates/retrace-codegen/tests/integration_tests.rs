//! End-to-end tests for replay unit generation.
//!
//! Traces are produced either by a real `RecorderSession` or written by hand
//! when a test needs a deliberately malformed log. Units are generated
//! through `generate_replay_source` or the `run_replay` batch pipeline and
//! checked for the statements that drive the replay.
//!
//! Tests cover:
//! - Free-function collaborators and determinism
//! - Throwing invocations
//! - Method replay with receiver construction from the constructor child
//! - Constructor stubs and environment comparison
//! - Typed mode (numeric aliases and shape interfaces)
//! - Malformed traces: env size mismatch, unknown or mismatched children,
//!   missing enter, sessions sharing a directory
//! - Batch pipeline output and per-unit failures

use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use retrace_codegen::{
    generate_replay_source, replay_unit_file_name, run_replay, CodegenError, ReplayOptions,
};
use retrace_core::{
    CallEvent, CallId, CallTriple, EnterEvent, ExitEvent, FnId, Invocation, Outcome, OutcomeTypes,
    ReceiverId, TraceEvent, TraceValue,
};
use retrace_recorder::{EnterCall, ExitCall, RecorderConfig, RecorderSession};
use retrace_storage::{ensure_index, find_triple, ReplayIndex};

const OUTER: &str = "src/math.ts#-#outer#L1C1";
const INNER: &str = "src/math.ts#-#inner#L5C1";
const MAIN: &str = "src/main.ts#-#main#L1C1";
const CTOR: &str = "src/account.ts#Account#constructor#L3C3";
const DEPOSIT: &str = "src/account.ts#Account#deposit#L8C3";
const AUDIT: &str = "src/audit.ts#-#audit#L2C1";
const SCALE: &str = "src/scale.ts#-#scale#L1C1";
const SVC_RUN: &str = "src/svc.ts#Svc#run#L4C3";
const POINT_CTOR: &str = "src/point.ts#Point#constructor#L2C3";

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn num(n: f64) -> TraceValue {
    TraceValue::Number(n)
}

/// Records `outer()` calling `inner(2)`, which returns 4.
fn record_outer_inner(dir: &Path, inner_throws: bool) {
    let mut session = RecorderSession::new(RecorderConfig::new(dir));
    let outer = session.enter(EnterCall::function(OUTER)).unwrap();
    let inner = session
        .enter(EnterCall::function(INNER).with_args(vec![num(2.0)], vec![]))
        .unwrap();
    session
        .exit(ExitCall::returned(&FnId::new(INNER), &inner, num(4.0)))
        .unwrap();
    let exit = if inner_throws {
        ExitCall::threw(
            &FnId::new(OUTER),
            &outer,
            TraceValue::Error {
                name: "Error".into(),
                message: "too big".into(),
            },
        )
    } else {
        ExitCall::returned(&FnId::new(OUTER), &outer, num(5.0))
    };
    session.exit(exit).unwrap();
    session.finish().unwrap();
}

/// Records `main()` constructing an `Account` and depositing into it; the
/// deposit calls `audit`, which throws.
fn record_account(dir: &Path) {
    let mut session = RecorderSession::new(RecorderConfig::new(dir));
    let acct = ReceiverId(1);

    let main = session
        .enter(EnterCall::function(MAIN).with_env_entry("total", num(0.0), "number"))
        .unwrap();
    let ctor = session
        .enter(
            EnterCall::constructor(CTOR, acct)
                .with_args(vec![TraceValue::from("alice")], vec!["string".into()]),
        )
        .unwrap();
    session
        .exit(ExitCall::returned(&FnId::new(CTOR), &ctor, TraceValue::Undefined))
        .unwrap();

    let this = TraceValue::instance(
        "Account",
        [("owner", TraceValue::from("alice")), ("balance", num(0.0))],
    );
    let deposit = session
        .enter(
            EnterCall::method(DEPOSIT, acct)
                .with_this(this, "Account")
                .with_args(vec![num(12.5)], vec!["number".into()]),
        )
        .unwrap();
    let audit = session
        .enter(EnterCall::function(AUDIT).with_args(vec![num(f64::INFINITY)], vec!["number".into()]))
        .unwrap();
    session
        .exit(
            ExitCall::threw(
                &FnId::new(AUDIT),
                &audit,
                TraceValue::Error {
                    name: "RangeError".into(),
                    message: "bad amount".into(),
                },
            )
            .with_types("void", "RangeError"),
        )
        .unwrap();
    session
        .exit(ExitCall::returned(&FnId::new(DEPOSIT), &deposit, num(12.5)).with_types("number", ""))
        .unwrap();
    session
        .exit(
            ExitCall::returned(&FnId::new(MAIN), &main, TraceValue::Undefined)
                .with_types("void", "")
                .with_env_entry("total", num(12.5), "number"),
        )
        .unwrap();
    session.finish().unwrap();
}

fn unit_for(dir: &Path, call: u64, options: &ReplayOptions) -> Result<String, CodegenError> {
    let index = ensure_index(dir).unwrap();
    let triple = find_triple(&CallId::from_counter(call), &index).unwrap().unwrap();
    generate_replay_source(&triple, &index, options)
}

fn enter_event(fn_id: &str, call: u64, args: Vec<TraceValue>) -> EnterEvent {
    EnterEvent {
        fn_id: FnId::new(fn_id),
        call_id: CallId::from_counter(call),
        this_value: TraceValue::Undefined,
        this_type: String::new(),
        args,
        args_types: Vec::new(),
        env: IndexMap::new(),
        env_types: IndexMap::new(),
    }
}

fn exit_event(fn_id: &str, call: u64, value: TraceValue) -> ExitEvent {
    ExitEvent {
        fn_id: FnId::new(fn_id),
        call_id: CallId::from_counter(call),
        outcome: Outcome::Returned { value },
        outcome_types: OutcomeTypes::default(),
        env: IndexMap::new(),
        env_types: IndexMap::new(),
    }
}

fn write_log(path: &Path, events: &[TraceEvent]) {
    let lines: Vec<String> = events
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

/// `outer` (call 1) lists a child (call 99) that was never recorded;
/// `inner` (call 2) is complete.
fn write_broken_log(path: &Path) {
    write_log(
        path,
        &[
            TraceEvent::Enter(enter_event(OUTER, 1, vec![])),
            TraceEvent::Call(CallEvent {
                fn_id: FnId::new(OUTER),
                call_id: CallId::from_counter(1),
                child_invocations: vec![Invocation::new(FnId::new(INNER), CallId::from_counter(99))],
            }),
            TraceEvent::Exit(exit_event(OUTER, 1, num(1.0))),
            TraceEvent::Enter(enter_event(INNER, 2, vec![num(3.0)])),
            TraceEvent::Exit(exit_event(INNER, 2, num(6.0))),
        ],
    );
}

/// A method call whose only child is a constructor call.
fn write_method_with_ctor_child(
    path: &Path,
    method: &str,
    method_call: u64,
    this: TraceValue,
    ctor: &str,
    ctor_call: u64,
) {
    let mut enter = enter_event(method, method_call, vec![]);
    enter.this_value = this;
    write_log(
        path,
        &[
            TraceEvent::Enter(enter_event(ctor, ctor_call, vec![num(3.0), num(4.0)])),
            TraceEvent::Exit(exit_event(ctor, ctor_call, TraceValue::Undefined)),
            TraceEvent::Enter(enter),
            TraceEvent::Call(CallEvent {
                fn_id: FnId::new(method),
                call_id: CallId::from_counter(method_call),
                child_invocations: vec![Invocation::new(FnId::new(ctor), CallId::from_counter(ctor_call))],
            }),
            TraceEvent::Exit(exit_event(method, method_call, TraceValue::Undefined)),
        ],
    );
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

#[test]
fn outer_unit_stubs_inner_and_checks_return() {
    let dir = tempfile::tempdir().unwrap();
    record_outer_inner(dir.path(), false);
    let src = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap();

    assert!(src.starts_with(&format!("// fnId: {OUTER} callId: 1\n")));
    assert!(src.contains("export function replay_wrapper(): boolean {"));
    assert!(src.contains("const __args: any[] = [];"));
    assert!(src.contains("const __target = __g[\"outer\"];"));
    assert!(src.contains("__replayInstall(__g, \"inner\", __replayStub(\"inner\", ["));
    assert!(src.contains("{ args: [2], run: () => 4 },"));
    assert!(src.contains("const __expected = 5;"));
    assert!(src.contains("const __ret = __target(...__args);"));
    assert!(src.contains("if (!__replayEq(__ret, __expected)) return false;"));
    assert!(src.contains("for (const restore of __restores.reverse()) restore();"));
    assert!(!src.contains("Reflect.construct"));
    assert!(!src.contains("type i32"));
}

#[test]
fn generation_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    record_outer_inner(dir.path(), false);
    let first = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap();
    let second = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn throwing_call_asserts_the_throw() {
    let dir = tempfile::tempdir().unwrap();
    record_outer_inner(dir.path(), true);
    let src = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap();

    assert!(src.contains("let __threw = false;"));
    assert!(src.contains("__target(...__args);"));
    assert!(src.contains("} catch {"));
    assert!(src.contains("if (!__threw) return false;"));
    assert!(!src.contains("__expected"));
}

#[test]
fn leaf_unit_has_no_collaborators() {
    let dir = tempfile::tempdir().unwrap();
    record_outer_inner(dir.path(), false);
    let src = unit_for(dir.path(), 2, &ReplayOptions::default()).unwrap();

    assert!(src.contains("const __arg0 = 2;"));
    assert!(src.contains("const __args: any[] = [__arg0];"));
    assert!(!src.contains("// collaborators"));
}

// ---------------------------------------------------------------------------
// Methods, constructors and environment
// ---------------------------------------------------------------------------

#[test]
fn method_unit_builds_receiver_from_constructor_child() {
    let dir = tempfile::tempdir().unwrap();
    record_account(dir.path());
    let src = unit_for(dir.path(), 3, &ReplayOptions::default()).unwrap();

    assert!(src.contains("const __Type = __g[\"Account\"];"));
    assert!(src.contains("const __ctorArg0 = \"alice\";"));
    assert!(src.contains("const __this: any = new __Type(__ctorArg0);"));
    assert!(src.contains("__this[\"owner\"] = \"alice\";"));
    assert!(src.contains("__this[\"balance\"] = 0;"));
    assert!(src.contains("const __method = __this[\"deposit\"];"));
    assert!(src.contains(
        "{ args: [Infinity], run: () => { throw Object.assign(new Error(\"bad amount\"), { name: \"RangeError\" }); } },"
    ));
    assert!(src.contains("const __ret = __method.apply(__this, __args);"));
    // The implicit constructor entry builds the receiver; it is never stubbed.
    assert!(!src.contains("__replayStub(\"Account\""));
}

#[test]
fn constructor_children_are_stubbed_by_delegation() {
    let dir = tempfile::tempdir().unwrap();
    record_account(dir.path());
    let src = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap();

    assert!(src.contains("const __real0 = __g[\"Account\"];"));
    assert!(src.contains("const __stub = __replayStub(\"Account\", ["));
    assert!(src.contains("{ args: [\"alice\"], run: (a) => Reflect.construct(__real0, a) },"));
    assert!(src.contains("__stub.prototype = __real0.prototype;"));
    assert!(src.contains(
        "__replayInstall(__g[\"Account\"].prototype, \"deposit\", __replayStub(\"Account.deposit\", ["
    ));
    assert!(src.contains("{ args: [12.5], run: () => 12.5 },"));
    // Stubs are installed after the target and the real class are captured.
    let captured = src.find("const __real0").unwrap();
    let installed = src.find("__replayInstall(__g, \"Account\"").unwrap();
    assert!(captured < installed);
}

#[test]
fn env_is_installed_on_globals_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    record_account(dir.path());
    let src = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap();

    assert!(src.contains("let total = 0;"));
    assert!(src.contains("const expected_total = 12.5;"));
    assert!(src.contains("__replayInstall(__g, \"total\", total, __restores);"));
    assert!(src.contains("total = __g[\"total\"];"));
    assert!(src.contains("if (!__replayEq(total, expected_total)) return false;"));

    // The target sees the recorded value, and the live value is read back
    // before the finally block restores the global.
    let try_start = src.find("try {").unwrap();
    let install = src.find("__replayInstall(__g, \"total\"").unwrap();
    let call = src.find("__target(...__args);").unwrap();
    let read_back = src.find("total = __g[\"total\"];").unwrap();
    let finally = src.find("} finally {").unwrap();
    assert!(try_start < install && install < call);
    assert!(call < read_back && read_back < finally);
}

#[test]
fn non_identifier_env_uses_composite_binding() {
    let dir = tempfile::tempdir().unwrap();
    let index = ensure_index(dir.path()).unwrap();
    let mut enter = enter_event(OUTER, 1, vec![]);
    enter.env.insert("a-b".into(), num(1.0));
    let mut exit = exit_event(OUTER, 1, TraceValue::Undefined);
    exit.env.insert("a-b".into(), num(2.0));
    let triple = CallTriple {
        enter: Some(enter),
        call: None,
        exit: Some(exit),
    };

    let src = generate_replay_source(&triple, &index, &ReplayOptions::default()).unwrap();
    assert!(src.contains("const env: any = { \"a-b\": 1 };"));
    assert!(src.contains("const expectedEnv: any = { \"a-b\": 2 };"));
    assert!(src.contains(
        "for (const [key, value] of Object.entries(env)) __replayInstall(__g, key, value, __restores);"
    ));
    assert!(src.contains("for (const key of Object.keys(expectedEnv)) __envAfter[key] = __g[key];"));
    assert!(src.contains("if (!__replayEq(__envAfter, expectedEnv)) return false;"));
    let check = src.find("if (!__replayEq(__envAfter").unwrap();
    let finally = src.find("} finally {").unwrap();
    assert!(check < finally);
}

#[test]
fn constructor_of_another_class_is_not_the_receiver() {
    let dir = tempfile::tempdir().unwrap();
    // `new Point(3, 4)` recorded before `svc.run()`: the first child is a
    // constructor, but of the wrong class for the receiver.
    let this = TraceValue::instance("Svc", [("name", TraceValue::from("s"))]);
    write_method_with_ctor_child(&dir.path().join("trace.jsonl"), SVC_RUN, 2, this, POINT_CTOR, 1);
    let src = unit_for(dir.path(), 2, &ReplayOptions::default()).unwrap();

    assert!(src.contains("const __this: any = Object.create(__Type.prototype);"));
    assert!(src.contains("__this[\"name\"] = \"s\";"));
    assert!(!src.contains("__ctorArg0"));
    assert!(src.contains("const __real0 = __g[\"Point\"];"));
    assert!(src.contains("const __stub = __replayStub(\"Point\", ["));
    assert!(src.contains("{ args: [3, 4], run: (a) => Reflect.construct(__real0, a) },"));
}

#[test]
fn constructor_started_inside_the_method_is_stubbed() {
    let dir = tempfile::tempdir().unwrap();
    // `deposit` (1) builds another Account (2) while it runs.
    let this = TraceValue::instance("Account", [("balance", num(0.0))]);
    write_method_with_ctor_child(&dir.path().join("trace.jsonl"), DEPOSIT, 1, this, CTOR, 2);
    let src = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap();

    assert!(src.contains("const __this: any = Object.create(__Type.prototype);"));
    assert!(!src.contains("new __Type(__ctorArg0)"));
    assert!(src.contains("const __stub = __replayStub(\"Account\", ["));
}

// ---------------------------------------------------------------------------
// Typed mode
// ---------------------------------------------------------------------------

#[test]
fn typed_batch_emits_aliases_and_shapes() {
    let trace = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut session = RecorderSession::new(RecorderConfig {
        trace_dir: trace.path().to_path_buf(),
        group_by_function: false,
        event_flush_threshold: 1024,
    });
    for (n, x, ret) in [(1.0, 1.0, 2.0), (2.5, 3.0, 5.0)] {
        let call = session
            .enter(EnterCall::function(SCALE).with_args(
                vec![num(n), TraceValue::object([("x", num(x))])],
                vec!["number".into(), "{ x: number }".into()],
            ))
            .unwrap();
        session
            .exit(ExitCall::returned(&FnId::new(SCALE), &call, num(ret)).with_types("number", ""))
            .unwrap();
    }
    session.finish().unwrap();

    let options = ReplayOptions {
        out_dir: Some(out.path().to_path_buf()),
        use_type_names: true,
    };
    let report = run_replay(&trace.path().join("trace.jsonl"), &options).unwrap();
    assert_eq!(report.triples, 2);
    assert_eq!(report.generated.len(), 2);
    assert!(report.failures.is_empty());

    let path = out
        .path()
        .join(replay_unit_file_name(&FnId::new(SCALE), &CallId::from_counter(1)));
    let src = fs::read_to_string(path).unwrap();
    assert!(src.contains("type i32 = number;"));
    assert!(src.contains("type f32 = number;"));
    assert!(src.contains("interface Shape_x { x: i32 }"));
    assert!(src.contains("const __arg0: f32 = 1;"));
    assert!(src.contains("const __arg1: Shape_x = { x: 1 };"));
    assert!(src.contains("const __expected: i32 = 2;"));
}

// ---------------------------------------------------------------------------
// Malformed traces
// ---------------------------------------------------------------------------

#[test]
fn env_size_mismatch_is_a_generation_error() {
    let dir = tempfile::tempdir().unwrap();
    let index = ensure_index(dir.path()).unwrap();
    let mut enter = enter_event(OUTER, 7, vec![]);
    enter.env.insert("x".into(), num(1.0));
    let triple = CallTriple {
        enter: Some(enter),
        call: None,
        exit: Some(exit_event(OUTER, 7, TraceValue::Undefined)),
    };

    let err = generate_replay_source(&triple, &index, &ReplayOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        CodegenError::EnvSizeMismatch { enter: 1, exit: 0, .. }
    ));
}

#[test]
fn missing_enter_is_a_generation_error() {
    let index = ReplayIndex::default();
    let triple = CallTriple {
        enter: None,
        call: None,
        exit: Some(exit_event(OUTER, 3, num(1.0))),
    };
    let err = generate_replay_source(&triple, &index, &ReplayOptions::default()).unwrap_err();
    match err {
        CodegenError::MissingEnter { call_id } => assert_eq!(call_id, CallId::from_counter(3)),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_child_is_a_generation_error() {
    let dir = tempfile::tempdir().unwrap();
    write_broken_log(&dir.path().join("broken.jsonl"));
    let err = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap_err();
    match err {
        CodegenError::UnknownChild { parent, child } => {
            assert_eq!(parent, CallId::from_counter(1));
            assert_eq!(child.call_id, CallId::from_counter(99));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn child_resolving_to_another_function_is_a_generation_error() {
    let dir = tempfile::tempdir().unwrap();
    // Call 2 is listed as `inner` but the directory recorded `audit` under it.
    write_log(
        &dir.path().join("trace.jsonl"),
        &[
            TraceEvent::Enter(enter_event(OUTER, 1, vec![])),
            TraceEvent::Call(CallEvent {
                fn_id: FnId::new(OUTER),
                call_id: CallId::from_counter(1),
                child_invocations: vec![Invocation::new(FnId::new(INNER), CallId::from_counter(2))],
            }),
            TraceEvent::Exit(exit_event(OUTER, 1, num(1.0))),
            TraceEvent::Enter(enter_event(AUDIT, 2, vec![])),
            TraceEvent::Exit(exit_event(AUDIT, 2, TraceValue::Undefined)),
        ],
    );
    let err = unit_for(dir.path(), 1, &ReplayOptions::default()).unwrap_err();
    match err {
        CodegenError::ChildMismatch { parent, child, found } => {
            assert_eq!(parent, CallId::from_counter(1));
            assert_eq!(child.fn_id.as_str(), INNER);
            assert_eq!(found, Some(FnId::new(AUDIT)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn sessions_sharing_a_directory_fail_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    // Two per-function sessions, each numbering its calls from 1.
    for fn_id in [OUTER, AUDIT] {
        let mut session = RecorderSession::new(RecorderConfig::new(dir.path()));
        let id = session.enter(EnterCall::function(fn_id)).unwrap();
        session
            .exit(ExitCall::returned(&FnId::new(fn_id), &id, TraceValue::Undefined))
            .unwrap();
        session.finish().unwrap();
    }
    let trace = dir.path().join("src_math.ts_-_outer_L1C1.jsonl");
    let err = run_replay(&trace, &ReplayOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        CodegenError::Storage(retrace_storage::StorageError::DuplicateCall { .. })
    ));
}

// ---------------------------------------------------------------------------
// Batch pipeline
// ---------------------------------------------------------------------------

#[test]
fn batch_reports_failures_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("broken.jsonl");
    write_broken_log(&trace);

    let report = run_replay(&trace, &ReplayOptions::default()).unwrap();
    assert_eq!(report.triples, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].call_id, CallId::from_counter(1));
    assert_eq!(report.failures[0].fn_id, FnId::new(OUTER));
    assert!(report.failures[0].message.contains("not in the replay index"));

    // Units land next to the trace by default.
    assert_eq!(report.generated.len(), 1);
    let unit = &report.generated[0];
    assert_eq!(unit.parent(), Some(dir.path()));
    assert!(fs::read_to_string(unit).unwrap().contains("const __arg0 = 3;"));
}

#[test]
fn batch_over_per_function_logs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("replays");
    record_account(dir.path());

    let options = ReplayOptions {
        out_dir: Some(out.clone()),
        use_type_names: false,
    };
    let deposit_log = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.to_string_lossy().contains("deposit"))
        .unwrap();
    let report = run_replay(&deposit_log, &options).unwrap();
    assert_eq!(report.triples, 1);
    assert!(report.failures.is_empty());
    assert_eq!(
        report.generated,
        vec![out.join(replay_unit_file_name(&FnId::new(DEPOSIT), &CallId::from_counter(3)))]
    );
}

#[test]
fn trace_path_without_directory_is_rejected() {
    let err = run_replay(Path::new(""), &ReplayOptions::default()).unwrap_err();
    assert!(matches!(err, CodegenError::NoTraceDir(_)));
}
