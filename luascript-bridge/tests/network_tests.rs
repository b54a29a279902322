//! `http_get` / `http_request` against wiremock and the in-memory client.

mod common;

use common::{local, printed, Harness};
use luascript_bridge::{Bridge, BufferSink, HttpResponse, ReqwestClient, ScriptHost, ScriptUnit};
use pretty_assertions::assert_eq;
use std::rc::Rc;
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn network_host() -> ScriptHost {
    let client = ReqwestClient::new(Duration::from_secs(5), "luascript-tests").unwrap();
    ScriptHost::new(Bridge::builder().http(Rc::new(client)).build().unwrap())
}

async fn run_to_idle(host: &ScriptHost, code: &str) -> BufferSink {
    let sink = BufferSink::new();
    let unit = ScriptUnit::inline("net", code).with_sink(Rc::new(sink.clone()));
    assert!(host.run_unit(&unit).await.is_completed());
    host.bridge().wait_idle().await;
    sink
}

#[tokio::test]
async fn get_and_request_reach_a_real_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hi there"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("x-token", "abc"))
        .and(body_string("payload"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_string("made")
                .insert_header("x-reply", "yes"),
        )
        .mount(&server)
        .await;

    local(async {
        let host = network_host();
        let code = format!(
            r#"
            local ls = require("luascript")
            local base = "{base}"
            ls.http_get(base .. "/hello", function(status, body)
              print("get", status, body)
            end)
            ls.http_request("POST", base .. "/echo", {{ ["X-Token"] = "abc" }}, "payload",
              function(status, body, headers)
                print("post", status, body, headers:find('"x%-reply":"yes"') ~= nil)
              end)
            "#,
            base = server.uri()
        );
        let mut lines = run_to_idle(&host, &code).await.lines();
        lines.sort();
        assert_eq!(lines, vec!["get\t200\thi there", "post\t201\tmade\ttrue"]);
        assert_eq!(host.bridge().live_callbacks(), 0);
    })
    .await;
}

#[tokio::test]
async fn unreachable_host_reports_status_zero() {
    local(async {
        let host = network_host();
        let lines = run_to_idle(
            &host,
            r#"
            local ls = require("luascript")
            ls.http_get("http://127.0.0.1:1/", function(status, err)
              print(status, #err > 0)
            end)
            ls.http_request(nil, "http://127.0.0.1:1/", nil, nil, function(status, err, headers)
              print(status, #err > 0, headers)
            end)
            "#,
        )
        .await
        .lines();
        let mut lines = lines;
        lines.sort();
        assert_eq!(lines, vec!["0\ttrue", "0\ttrue\t{}"]);
    })
    .await;
}

#[tokio::test]
async fn error_statuses_still_deliver_the_body() {
    local(async {
        let harness = Harness::new();
        harness
            .http
            .route("https://x/fail", HttpResponse::new(500, "server sad"));
        let (_, sink) = harness
            .run_to_idle(
                r#"
                require("luascript").get("https://x/fail", function(status, body)
                  print(status, body)
                end)
                "#,
            )
            .await;
        assert_eq!(printed(&sink), vec!["500\tserver sad"]);
    })
    .await;
}

#[tokio::test]
async fn request_defaults_and_sorted_headers() {
    local(async {
        let harness = Harness::new();
        harness.http.route_text("https://x/api", "ok");
        harness
            .run_to_idle(
                r#"
                require("luascript").request(nil, "https://x/api", { b = "2", a = 1 }, "data",
                  function() end)
                "#,
            )
            .await;

        let requests = harness.http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(
            requests[0].headers,
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
        assert_eq!(requests[0].body.as_deref(), Some("data"));
    })
    .await;
}

#[tokio::test]
async fn request_handler_counts_as_pending_until_it_runs() {
    local(async {
        let harness = Harness::new();
        harness.http.route_text("https://x/slow", "done");
        let (_, sink) = harness
            .run(r#"require("luascript").get("https://x/slow", function(_, body) print(body) end)"#)
            .await;
        assert_eq!(harness.bridge().pending(), 1);
        harness.bridge().wait_idle().await;
        assert_eq!(harness.bridge().pending(), 0);
        assert_eq!(printed(&sink), vec!["done"]);
    })
    .await;
}

#[tokio::test]
async fn overlapping_units_keep_config_diagnostics_apart() {
    let server = MockServer::start().await;
    for (name, delay_ms) in [("fast", 0), ("slow", 300)] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}/config.json")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"{{ "modules": {{ "{name}": "{name}.lua" }} }}"#))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{name}/{name}.lua")))
            .respond_with(ResponseTemplate::new(200).set_body_string("return true"))
            .mount(&server)
            .await;
    }

    local(async {
        let host = network_host();
        let unit = |name: &str, sink: &BufferSink| {
            ScriptUnit::inline(name, format!("require('{name}')"))
                .with_config(format!("{}/{name}/config.json", server.uri()))
                .with_debug(true)
                .with_sink(Rc::new(sink.clone()))
        };
        let (fast_sink, slow_sink) = (BufferSink::new(), BufferSink::new());
        let (fast, slow) = (unit("fast", &fast_sink), unit("slow", &slow_sink));

        // The first unit entered finishes its config first.
        let (a, b) = tokio::join!(host.run_unit(&fast), host.run_unit(&slow));
        assert!(a.is_completed() && b.is_completed());

        let loaded = |sink: &BufferSink| -> Vec<String> {
            sink.lines()
                .into_iter()
                .filter(|line| line.contains("config module loaded"))
                .collect()
        };
        let fast_lines = loaded(&fast_sink);
        let slow_lines = loaded(&slow_sink);
        assert_eq!(fast_lines.len(), 1);
        assert_eq!(slow_lines.len(), 1);
        assert!(fast_lines[0].contains("loaded: fast <- "));
        assert!(slow_lines[0].contains("loaded: slow <- "));
    })
    .await;
}
