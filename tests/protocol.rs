mod support;

use std::sync::Arc;
use std::time::Duration;

use flowfill::{
    Agent, EffectMode, Event, Flow, MemoryDocument, ReplayConfig, Request, Response, RunStatus,
    ScanConfig,
};
use serde_json::{json, Value};

use support::{people, signup, signup_mapping, signup_with};

fn agent(doc: &MemoryDocument) -> Agent<MemoryDocument> {
    Agent::with_config(
        Arc::new(doc.clone()),
        ScanConfig::default(),
        ReplayConfig::default().row_delay(Duration::from_millis(10)),
    )
}

async fn call(agent: &Agent<MemoryDocument>, request: Value) -> Value {
    let raw = agent.handle_json(&request.to_string()).await;
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test(start_paused = true)]
async fn detect_fields_lists_the_current_form() {
    let doc = signup();
    let response = call(&agent(&doc), json!({ "type": "detectFields" })).await;

    assert_eq!(response["type"], "fields");
    assert_eq!(response["ok"], true);
    let fields = response["fields"].as_array().unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0]["selector"], "[name=\"first\"]");
    assert_eq!(fields[0]["tag"], "input");
    assert_eq!(fields[0]["inputType"], "text");
    assert_eq!(fields[0]["domId"], "first");
    assert_eq!(fields[0]["label"], "First name");
}

#[tokio::test(start_paused = true)]
async fn scanned_flow_feeds_a_bulk_run() {
    let doc = signup();
    let agent = agent(&doc);
    let mut events = agent.events().subscribe();

    let scanned = call(&agent, json!({ "type": "scanFlow", "maxSteps": 5 })).await;
    assert_eq!(scanned["type"], "flow");
    assert_eq!(scanned["flow"].as_array().unwrap().len(), 2);
    doc.goto(0);

    let started = call(
        &agent,
        json!({
            "type": "startBulk",
            "flow": scanned["flow"],
            "rows": [
                { "First": "Ann", "Last": "Lee", "Email": "a@x.com" },
                { "First": "Bo", "Last": "Ng", "Email": "b@x.com" },
            ],
            "mapping": {
                "[name=\"first\"]": "First",
                "[name=\"last\"]": "Last",
                "[name=\"email\"]": "Email",
            },
        }),
    )
    .await;
    assert_eq!(started, json!({ "type": "started", "accepted": true }));

    let summary = loop {
        match events.recv().await.unwrap() {
            Event::Finished { summary } => break summary,
            Event::Stopped { .. } => panic!("run stopped"),
            _ => continue,
        }
    };
    assert_eq!(summary.completed, 2);

    let status = call(&agent, json!({ "type": "status" })).await;
    assert_eq!(status["progress"]["status"], "finished");
    assert_eq!(status["progress"]["currentRow"], 2);
    assert_eq!(doc.journal().completed_requests.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn busy_engine_rejects_start_and_scan() {
    let doc = signup_with(Duration::from_millis(500));
    let agent = agent(&doc);
    let flow = match agent.handle(Request::ScanFlow { max_steps: None }).await {
        Response::Flow { flow, .. } => flow,
        other => panic!("unexpected {other:?}"),
    };
    doc.goto(0);

    let start = || Request::StartBulk {
        flow: flow.clone(),
        rows: support::people(),
        mapping: support::signup_mapping(),
        delay_ms: None,
    };
    assert!(matches!(
        agent.handle(start()).await,
        Response::Started { accepted: true }
    ));
    assert!(matches!(
        agent.handle(start()).await,
        Response::Started { accepted: false }
    ));
    assert!(matches!(
        agent.handle(Request::ScanFlow { max_steps: None }).await,
        Response::Error { ok: false, .. }
    ));

    let stopped = call(&agent, json!({ "type": "stopBulk" })).await;
    assert_eq!(stopped, json!({ "type": "stopped", "acknowledged": true }));
    assert_eq!(agent.runner().state().status(), RunStatus::Stopping);
}

#[tokio::test(start_paused = true)]
async fn stop_while_idle_is_acknowledged() {
    let doc = signup();
    let agent = agent(&doc);
    let stopped = call(&agent, json!({ "type": "stopBulk" })).await;
    assert_eq!(stopped["acknowledged"], true);
    let status = call(&agent, json!({ "type": "status" })).await;
    assert_eq!(status["progress"]["status"], "idle");
}

#[tokio::test(start_paused = true)]
async fn malformed_requests_get_an_error_response() {
    let doc = signup();
    let agent = agent(&doc);

    let unknown = call(&agent, json!({ "type": "launchRockets" })).await;
    assert_eq!(unknown["type"], "error");
    assert_eq!(unknown["ok"], false);

    // Rows must be objects keyed by column name.
    let array_rows = call(
        &agent,
        json!({
            "type": "startBulk",
            "flow": [],
            "rows": [["Ann", "Lee"]],
            "mapping": {},
        }),
    )
    .await;
    assert_eq!(array_rows["type"], "error");
    assert!(array_rows["message"]
        .as_str()
        .unwrap()
        .starts_with("invalid request"));
    assert_eq!(agent.runner().state().status(), RunStatus::Idle);

    let raw = agent.handle_json("not json").await;
    assert!(raw.contains("\"ok\":false"));
}

#[tokio::test(start_paused = true)]
async fn abandoned_scan_request_frees_the_agent() {
    let doc = signup();
    let agent = agent(&doc);

    let scan = agent.handle(Request::ScanFlow { max_steps: None });
    assert!(tokio::time::timeout(Duration::from_millis(100), scan)
        .await
        .is_err());
    assert_eq!(doc.effect_mode(), EffectMode::Live);
    assert!(!agent.runner().state().is_scanning());

    doc.goto(0);
    let started = agent
        .handle(Request::StartBulk {
            flow: Flow::new(Vec::new()),
            rows: people(),
            mapping: signup_mapping(),
            delay_ms: None,
        })
        .await;
    assert!(matches!(started, Response::Started { accepted: true }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_scan_and_start_never_share_the_document() {
    let doc = signup();
    let agent = Arc::new(Agent::with_config(
        Arc::new(doc.clone()),
        ScanConfig::default().settle_delay(Duration::from_millis(50)),
        ReplayConfig::default(),
    ));

    let scan = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.handle(Request::ScanFlow { max_steps: None }).await })
    };
    let start = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            agent
                .handle(Request::StartBulk {
                    flow: Flow::new(Vec::new()),
                    rows: people(),
                    mapping: signup_mapping(),
                    // Keeps the run active long after any scan would finish.
                    delay_ms: Some(60_000),
                })
                .await
        })
    };

    let scanned = matches!(scan.await.unwrap(), Response::Flow { .. });
    let accepted = matches!(start.await.unwrap(), Response::Started { accepted: true });
    assert_ne!(scanned, accepted, "exactly one of scan and run may win");
    agent.runner().stop();
}
