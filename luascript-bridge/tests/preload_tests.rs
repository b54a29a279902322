//! Module configuration documents and `require`.

mod common;

use common::{local, printed, Harness};
use luascript_bridge::{BufferSink, HttpResponse, ScriptUnit, Stage, UnitOutcome};
use pretty_assertions::assert_eq;
use std::rc::Rc;

const CONFIG: &str = r#"{ "modules": { "greet": "greet.lua", "util": "../lib/util.lua" } }"#;

fn serve_modules(harness: &Harness) {
    harness.http.route_text("https://x/mods/config.json", CONFIG);
    harness.http.route_text(
        "https://x/mods/greet.lua",
        "print('loading greet')\nreturn { hello = function(n) return 'hello ' .. n end }",
    );
    harness
        .http
        .route_text("https://x/lib/util.lua", "return { twice = function(n) return n * 2 end }");
}

fn configured(code: &str, sink: &BufferSink) -> ScriptUnit {
    ScriptUnit::inline("configured", code)
        .with_config("mods/config.json")
        .with_debug(true)
        .with_sink(Rc::new(sink.clone()))
}

#[tokio::test]
async fn modules_resolve_against_the_config_url() {
    local(async {
        let harness = Harness::new();
        serve_modules(&harness);
        let sink = BufferSink::new();
        let unit = configured(
            r#"
            local greet = require("greet")
            local again = require("greet")
            print(greet.hello("lua"), greet == again, require("util").twice(21))
            "#,
            &sink,
        );

        let outcome = harness.host.run_unit(&unit).await;
        assert!(outcome.is_completed());
        assert_eq!(printed(&sink), vec!["loading greet", "hello lua\ttrue\t42"]);
        let loaded = "[LuaDebug] config module loaded: greet <- https://x/mods/greet.lua";
        assert!(sink.lines().iter().any(|line| line == loaded));
    })
    .await;
}

#[tokio::test]
async fn applied_config_is_not_fetched_again() {
    local(async {
        let harness = Harness::new();
        serve_modules(&harness);
        let sink = BufferSink::new();

        harness.host.run_unit(&configured("", &sink)).await;
        harness.host.run_unit(&configured("", &sink)).await;
        assert_eq!(harness.bridge().apply_config("mods/config.json").await.unwrap(), 0);
        assert_eq!(harness.http.request_count("https://x/mods/config.json"), 1);
        assert_eq!(harness.http.request_count("https://x/mods/greet.lua"), 1);
    })
    .await;
}

#[tokio::test]
async fn missing_config_skips_the_unit() {
    local(async {
        let harness = Harness::new();
        harness
            .http
            .route("https://x/mods/config.json", HttpResponse::new(404, "nope"));
        let sink = BufferSink::new();

        let outcome = harness
            .host
            .run_unit(&configured("print('never')", &sink))
            .await;
        let UnitOutcome::Skipped(diagnostic) = outcome else {
            panic!("expected a skipped unit, got {outcome:?}");
        };
        assert_eq!(diagnostic.stage, Stage::Config);
        assert!(diagnostic.message.contains("404"));
        assert_eq!(printed(&sink).len(), 1);
        assert!(printed(&sink)[0].starts_with("[LuaError] config:"));
    })
    .await;
}

#[tokio::test]
async fn malformed_config_is_a_config_failure() {
    local(async {
        let harness = Harness::new();
        harness.http.route_text("https://x/mods/config.json", "{ modules: ");
        let sink = BufferSink::new();

        let outcome = harness.host.run_unit(&configured("", &sink)).await;
        assert_eq!(outcome.diagnostic().unwrap().stage, Stage::Config);
        assert!(outcome
            .diagnostic()
            .unwrap()
            .message
            .starts_with("https://x/mods/config.json:"));
    })
    .await;
}

#[tokio::test]
async fn failed_config_is_retried_by_the_next_unit() {
    local(async {
        let harness = Harness::new();
        harness.http.route_text("https://x/mods/config.json", CONFIG);
        let sink = BufferSink::new();

        let first = harness.host.run_unit(&configured("", &sink)).await;
        assert!(!first.is_completed());

        serve_modules(&harness);
        let second = harness
            .host
            .run_unit(&configured("print(require('util').twice(2))", &sink))
            .await;
        assert!(second.is_completed());
        assert_eq!(printed(&sink).last().unwrap(), "4");
    })
    .await;
}

#[tokio::test]
async fn inline_modules_and_the_builtin_module() {
    local(async {
        let harness = Harness::new();
        harness
            .bridge()
            .register_module("answer", "return 42")
            .unwrap();
        harness.bridge().register_module("side", "loaded_side = true").unwrap();

        let (_, sink) = harness
            .run(
                "print(require('answer'), require('side'), loaded_side, \
                 type(require('luascript').when))",
            )
            .await;
        assert_eq!(printed(&sink), vec!["42\ttrue\ttrue\tfunction"]);

        let modules = harness.bridge().modules();
        assert!(modules.contains(&("luascript".to_string(), "builtin".to_string())));
        assert!(modules.contains(&("answer".to_string(), "inline".to_string())));
    })
    .await;
}

#[tokio::test]
async fn module_errors_surface_through_require() {
    local(async {
        let harness = Harness::new();
        harness.bridge().register_module("broken", "return {").unwrap();
        let (outcome, _) = harness.run("require('broken')").await;
        assert_eq!(outcome.diagnostic().unwrap().stage, Stage::Runtime);
    })
    .await;
}
