//! Events written by a recorder session read back into identical triples.

use std::collections::HashMap;

use retrace_core::{CallId, CallTriple, FnId, ReceiverId, TraceValue};
use retrace_recorder::{EnterCall, ExitCall, RecorderConfig, RecorderSession};
use retrace_storage::{ensure_index, find_triple, group_into_triples, read_events};

const MAIN: &str = "src/main.ts#-#main#L1C1";
const CTOR: &str = "src/account.ts#Account#constructor#L3C3";
const DEPOSIT: &str = "src/account.ts#Account#deposit#L8C3";
const AUDIT: &str = "src/audit.ts#-#audit#L2C1";

fn record(session: &mut RecorderSession) {
    let acct = ReceiverId(1);

    let main = session
        .enter(EnterCall::function(MAIN).with_env_entry("total", TraceValue::Number(0.0), "number"))
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
        [("owner", TraceValue::from("alice")), ("balance", TraceValue::Number(0.0))],
    );
    let deposit = session
        .enter(
            EnterCall::method(DEPOSIT, acct)
                .with_this(this, "Account")
                .with_args(vec![TraceValue::Number(12.5)], vec!["number".into()]),
        )
        .unwrap();
    let audit = session
        .enter(EnterCall::function(AUDIT).with_args(vec![TraceValue::Number(f64::INFINITY)], vec!["number".into()]))
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
        .exit(
            ExitCall::returned(&FnId::new(DEPOSIT), &deposit, TraceValue::Number(12.5))
                .with_types("number", ""),
        )
        .unwrap();

    session
        .exit(
            ExitCall::returned(&FnId::new(MAIN), &main, TraceValue::Undefined)
                .with_types("void", "")
                .with_env_entry("total", TraceValue::Number(12.5), "number"),
        )
        .unwrap();
}

fn by_call_id(triples: Vec<CallTriple>) -> HashMap<CallId, CallTriple> {
    triples
        .into_iter()
        .map(|t| (t.call_id().cloned().unwrap(), t))
        .collect()
}

#[test]
fn combined_log_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = RecorderSession::new(RecorderConfig {
        trace_dir: dir.path().to_path_buf(),
        group_by_function: false,
        event_flush_threshold: 1024,
    });
    record(&mut session);
    let expected = by_call_id(group_into_triples(session.pending_events()));
    session.finish().unwrap();

    let events = read_events(&dir.path().join("trace.jsonl")).unwrap();
    let actual = by_call_id(group_into_triples(events));
    assert_eq!(actual.len(), 4);
    assert_eq!(actual, expected);

    let audit = &actual[&CallId::from_counter(4)];
    let arg = audit.enter.as_ref().unwrap().args[0].as_number().unwrap();
    assert!(arg.is_infinite());
    assert!(audit.exit.as_ref().unwrap().outcome.is_throw());
}

#[test]
fn per_function_logs_round_trip_through_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = RecorderSession::new(RecorderConfig::new(dir.path()));
    record(&mut session);
    let expected = by_call_id(group_into_triples(session.pending_events()));
    session.finish().unwrap();

    let index = ensure_index(dir.path()).unwrap();
    assert_eq!(index.len(), expected.len());
    for (call_id, triple) in &expected {
        let found = find_triple(call_id, &index).unwrap().unwrap();
        assert_eq!(&found, triple);
        assert!(found.validate().is_ok());
    }

    let deposit = &expected[&CallId::from_counter(3)];
    let children: Vec<&str> = deposit.children().iter().map(|c| c.fn_id.as_str()).collect();
    assert_eq!(children, vec![CTOR, AUDIT]);
}

#[tokio::test]
async fn graceful_shutdown_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = RecorderSession::new(RecorderConfig::new(dir.path()));
    record(&mut session);
    let expected = by_call_id(group_into_triples(session.pending_events()));
    session.shutdown_graceful().await;

    let index = ensure_index(dir.path()).unwrap();
    for call_id in expected.keys() {
        assert_eq!(
            find_triple(call_id, &index).unwrap().as_ref(),
            expected.get(call_id)
        );
    }
}
