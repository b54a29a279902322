//! Protected execution of script units: failure stages, isolation and output.

mod common;

use common::{local, printed, Harness};
use luascript_bridge::{Bridge, BufferSink, MemoryHttpClient, Stage, UnitScope};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::rc::Rc;

#[tokio::test]
async fn print_joins_arguments_with_tabs() {
    local(async {
        let harness = Harness::new();
        let (outcome, sink) = harness.run("print('a', 1, true, nil)").await;
        assert!(outcome.is_completed());
        assert_eq!(printed(&sink), vec!["a\t1\ttrue\tnil"]);
    })
    .await;
}

#[tokio::test]
async fn display_joins_arguments_with_spaces() {
    local(async {
        let harness = Harness::new();
        let (_, sink) = harness
            .run("local ls = require('luascript'); ls.display('x', 'y', 2)")
            .await;
        assert_eq!(printed(&sink), vec!["x y 2"]);
    })
    .await;
}

#[tokio::test]
async fn output_tolerates_bytes_that_are_not_utf8() {
    local(async {
        let harness = Harness::new();
        let (outcome, sink) = harness
            .run("print('a\\255b')\nrequire('luascript').display('\\255', 1)\nprint('after')")
            .await;
        assert!(outcome.is_completed());
        assert_eq!(printed(&sink), vec!["a\u{FFFD}b", "\u{FFFD} 1", "after"]);
    })
    .await;
}

#[tokio::test]
async fn syntax_error_reports_syntax_stage() {
    local(async {
        let harness = Harness::new();
        let (outcome, sink) = harness.run("local x = = 1").await;
        let diagnostic = outcome.diagnostic().unwrap();
        assert_eq!(diagnostic.stage, Stage::Syntax);
        assert!(sink.lines()[0].starts_with("[LuaError] syntax:"));
    })
    .await;
}

#[tokio::test]
async fn runtime_error_keeps_output_written_before_it() {
    local(async {
        let harness = Harness::new();
        let (outcome, sink) = harness.run("print('before')\nerror('boom')").await;
        let diagnostic = outcome.diagnostic().unwrap();
        assert_eq!(diagnostic.stage, Stage::Runtime);
        assert!(diagnostic.message.contains("boom"));

        let lines = printed(&sink);
        assert_eq!(lines[0], "before");
        assert!(lines[1].starts_with("[LuaError] runtime:"));
    })
    .await;
}

#[tokio::test]
async fn failures_stay_silent_without_diagnostics() {
    local(async {
        let harness = Harness::new();
        let sink = BufferSink::new();
        let unit = luascript_bridge::ScriptUnit::inline("quiet", "error('hidden')")
            .with_sink(Rc::new(sink.clone()));
        let outcome = harness.host.run_unit(&unit).await;
        assert!(!outcome.is_completed());
        assert!(sink.lines().is_empty());
    })
    .await;
}

#[tokio::test]
async fn failed_unit_does_not_stop_the_next_one() {
    local(async {
        let harness = Harness::new();
        let (first, _) = harness.run("shared = 41\nerror('first fails')").await;
        assert!(!first.is_completed());

        let (second, sink) = harness.run("print(shared + 1)").await;
        assert!(second.is_completed());
        assert_eq!(printed(&sink), vec!["42"]);
    })
    .await;
}

#[tokio::test]
async fn units_share_one_interpreter() {
    local(async {
        let harness = Harness::new();
        harness.run("function greet(n) return 'hi ' .. n end").await;
        let (_, sink) = harness.run("print(greet('there'))").await;
        assert_eq!(printed(&sink), vec!["hi there"]);
    })
    .await;
}

#[tokio::test]
async fn diagnostics_announce_finished_units() {
    local(async {
        let harness = Harness::new();
        let (_, sink) = harness.run("local _ = 1").await;
        assert_eq!(sink.lines(), vec!["[LuaDebug] finished script unit: test"]);
    })
    .await;
}

fn bridge() -> Bridge {
    Bridge::builder()
        .http(Rc::new(MemoryHttpClient::new()))
        .build()
        .unwrap()
}

fn malformed_source() -> impl Strategy<Value = String> {
    let name = "v_[a-z]{1,8}";
    prop_oneof![
        name.prop_map(|n| format!("local {n} = = 1")),
        name.prop_map(|n| format!("function {n}( end")),
        name.prop_map(|n| format!("{n} = {{ 1, 2")),
        name.prop_map(|n| format!("if {n} then")),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn malformed_sources_never_run(source in malformed_source()) {
        let bridge = bridge();
        let sink = BufferSink::new();
        let scope = UnitScope::new(Rc::new(sink.clone()), true);
        let diagnostic = bridge.run_source(&source, "prop", scope).unwrap_err();
        prop_assert_eq!(diagnostic.stage, Stage::Syntax);
        prop_assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn raised_messages_reach_the_diagnostic(message in "[a-z][a-z ]{0,20}") {
        let bridge = bridge();
        let scope = UnitScope::new(Rc::new(BufferSink::new()), false);
        let source = format!("error('{message}')");
        let diagnostic = bridge.run_source(&source, "prop", scope).unwrap_err();
        prop_assert_eq!(diagnostic.stage, Stage::Runtime);
        prop_assert!(diagnostic.message.contains(message.trim_end()));
    }
}
