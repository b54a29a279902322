//! Delegated event bindings driven through the in-memory document.

mod common;

use common::{local, printed, Harness};
use pretty_assertions::assert_eq;

fn button(harness: &Harness) -> (usize, usize) {
    let doc = &harness.document;
    let button = doc.element(doc.body(), "button", &[("id", "go"), ("class", "btn primary")]);
    let label = doc.element(button, "span", &[]);
    (button, label)
}

#[tokio::test]
async fn handlers_fire_in_registration_order_with_payload() {
    local(async {
        let harness = Harness::new();
        let (_, label) = button(&harness);
        let (outcome, sink) = harness
            .run(
                r##"
                local ls = require("luascript")
                ls.when("click", "#go", function(kind, pattern, id, class)
                  print("first", kind, pattern, id, class)
                end)
                ls.when("click", "#go", function() print("second") end)
                "##,
            )
            .await;
        assert!(outcome.is_completed());

        harness.document.dispatch_event("click", label);
        assert_eq!(
            printed(&sink),
            vec!["first\tclick\t#go\tgo\tbtn primary", "second"]
        );
    })
    .await;
}

#[tokio::test]
async fn one_host_listener_per_event_type() {
    local(async {
        let harness = Harness::new();
        button(&harness);
        harness
            .run(
                r##"
                local ls = require("luascript")
                ls.when("click", "#go", function() end)
                ls.when("click", ".btn", function() end)
                ls.when("input", "#go", function() end)
                "##,
            )
            .await;

        assert_eq!(harness.document.listener_count("click"), 1);
        assert_eq!(harness.document.listener_count("input"), 1);
        assert!(harness.bridge().is_event_bound("click"));
        assert!(!harness.bridge().is_event_bound("change"));
    })
    .await;
}

#[tokio::test]
async fn unmatched_bindings_are_skipped() {
    local(async {
        let harness = Harness::new();
        let (button, _) = button(&harness);
        let other = harness.document.element(harness.document.body(), "div", &[("id", "other")]);
        let (_, sink) = harness
            .run(
                r##"
                local ls = require("luascript")
                ls.when("click", "#other", function() print("other") end)
                ls.when("click", "#go", function() print("go") end)
                "##,
            )
            .await;

        harness.document.dispatch_event("click", button);
        harness.document.dispatch_event("click", other);
        assert_eq!(printed(&sink), vec!["go", "other"]);
    })
    .await;
}

#[tokio::test]
async fn raising_handler_does_not_stop_the_rest() {
    local(async {
        let harness = Harness::new();
        let (button, _) = button(&harness);
        let (_, sink) = harness
            .run(
                r##"
                local ls = require("luascript")
                ls.when("click", "#go", function() error("handler broke") end)
                ls.when("click", "#go", function() print("still here") end)
                "##,
            )
            .await;

        harness.document.dispatch_event("click", button);
        let lines = printed(&sink);
        assert!(lines[0].starts_with("[LuaError] callback:"));
        assert!(lines[0].contains("handler broke"));
        assert_eq!(lines[1], "still here");
    })
    .await;
}

#[tokio::test]
async fn off_removes_binding_and_releases_handlers() {
    local(async {
        let harness = Harness::new();
        let (button, _) = button(&harness);
        let (_, sink) = harness
            .run(
                r##"
                local ls = require("luascript")
                ls.when("click", "#go", function() print("clicked") end)
                print(ls.off("click", "#go"), ls.off("click", "#go"))
                "##,
            )
            .await;

        harness.document.dispatch_event("click", button);
        assert_eq!(printed(&sink), vec!["true\tfalse"]);
        assert_eq!(harness.bridge().live_callbacks(), 0);
        assert_eq!(harness.document.listener_count("click"), 1);
    })
    .await;
}

#[tokio::test]
async fn global_name_handlers_resolve_at_dispatch() {
    local(async {
        let harness = Harness::new();
        let (button, _) = button(&harness);
        let (_, sink) = harness
            .run(r##"require("luascript").when("click", "#go", "on_go")"##)
            .await;

        harness.document.dispatch_event("click", button);
        assert!(printed(&sink).is_empty());

        harness
            .run_into("function on_go(kind) print('named', kind) end", &sink)
            .await;
        harness.document.dispatch_event("click", button);
        assert_eq!(printed(&sink), vec!["named\tclick"]);
    })
    .await;
}
