use std::{convert::Infallible, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use berth_api::{HttpApi, PipelineAdapter, WireMessage};
use berth_core::{
    memory::{MemoryCluster, MemoryDns, MemoryRoutes},
    pipeline::{Pipeline, PipelineConfig},
};
use berth_model::{ContainerSpec, FailureKind, RunResult, SessionEnd, SessionFrame};
use berth_prometheus::PrometheusMetrics;
use berth_session::DETACH_HINT;
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    io::StreamReader,
};
use tower::util::ServiceExt;

const TENANT: &str = r#"{"id":"t1","namespace":"tenant-1","createdAtMs":1700000000000}"#;

fn pipeline(cluster: &MemoryCluster) -> Pipeline {
    Pipeline::new(
        Arc::new(cluster.clone()),
        Arc::new(MemoryDns::new()),
        Arc::new(MemoryRoutes::new("apps.test")),
        PipelineConfig::default(),
    )
}

fn router(adapter: PipelineAdapter) -> Router {
    HttpApi::new(Arc::new(adapter)).router()
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn tenant() -> serde_json::Value {
    serde_json::from_str(TENANT).unwrap()
}

async fn messages(router: Router, req: Request<Body>) -> Vec<WireMessage> {
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/x-ndjson");

    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(body.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Session request whose body stays open; every value sent on the returned channel becomes
/// one more line of it.
fn session(first: serde_json::Value) -> (Request<Body>, mpsc::UnboundedSender<serde_json::Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(first).unwrap();
    let lines = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|v| (Ok::<_, Infallible>(format!("{v}\n")), rx))
    });
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/sessions")
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(lines))
        .unwrap();
    (req, tx)
}

fn wire_lines(body: Body) -> BoxStream<'static, WireMessage> {
    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
    FramedRead::new(reader, LinesCodec::new())
        .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
        .boxed()
}

fn stdout_of(messages: &[WireMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            WireMessage::Frame {
                frame: SessionFrame::Stdout { data },
            } => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn detached_run_streams_progress_then_result() {
    let cluster = MemoryCluster::default();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let req = post(
        "/api/v1/containers",
        json!({ "tenant": tenant(), "spec": { "name": "web", "image": "nginx:1.27", "detach": true } }),
    );
    let out = messages(router, req).await;

    assert!(matches!(out.first(), Some(WireMessage::Progress { .. })));
    match out.last() {
        Some(WireMessage::Result {
            result: RunResult::Running { name, .. },
        }) => assert_eq!(name, "web"),
        other => panic!("unexpected tail {other:?}"),
    }
}

#[tokio::test]
async fn exec_streams_output_and_exit_code() {
    let cluster = MemoryCluster::default();
    cluster
        .insert_ready("tenant-1", &ContainerSpec::new("web", "nginx:1.27"))
        .unwrap();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let req = post(
        "/api/v1/containers/web/exec",
        json!({ "tenant": tenant(), "command": ["echo", "hello"] }),
    );
    let out = messages(router, req).await;

    assert_eq!(stdout_of(&out), "hello\n");
    assert!(out.contains(&WireMessage::Frame {
        frame: SessionFrame::ExitCode { code: 0 }
    }));
    assert!(matches!(out.last(), Some(WireMessage::Result { .. })));
}

#[tokio::test]
async fn exec_on_missing_container_reports_not_found_in_stream() {
    let cluster = MemoryCluster::default();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let req = post(
        "/api/v1/containers/ghost/exec",
        json!({ "tenant": tenant(), "command": ["echo", "hi"] }),
    );
    let out = messages(router, req).await;

    assert!(matches!(
        out.last(),
        Some(WireMessage::Error {
            error: FailureKind::NotFound,
            ..
        })
    ));
}

#[tokio::test]
async fn interactive_run_is_rejected() {
    let cluster = MemoryCluster::default();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let req = post(
        "/api/v1/containers",
        json!({ "tenant": tenant(), "spec": { "name": "sh", "image": "busybox", "interactive": true } }),
    );
    let resp = router.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn session_exec_forwards_stdin_and_reports_exit_code() {
    let cluster = MemoryCluster::default();
    cluster
        .insert_ready("tenant-1", &ContainerSpec::new("web", "nginx:1.27"))
        .unwrap();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let (req, client) = session(json!({
        "op": "exec", "tenant": tenant(), "name": "web", "command": ["cat"]
    }));
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let mut out = wire_lines(resp.into_body());

    client
        .send(json!({ "type": "stdin", "data": b"ping\n".to_vec() }))
        .unwrap();
    let mut echoed = Vec::new();
    while echoed != b"ping\n" {
        match out.next().await {
            Some(WireMessage::Frame {
                frame: SessionFrame::Stdout { data },
            }) => echoed.extend(data),
            Some(_) => {}
            None => panic!("stream ended before the input was echoed"),
        }
    }

    client.send(json!({ "type": "stdin-eof" })).unwrap();
    let rest: Vec<WireMessage> = out.collect().await;

    assert!(rest.contains(&WireMessage::Frame {
        frame: SessionFrame::ExitCode { code: 0 }
    }));
    assert_eq!(
        rest.last(),
        Some(&WireMessage::Result {
            result: RunResult::SessionEnded {
                name: "web".into(),
                end: SessionEnd::InputClosed
            }
        })
    );
}

#[tokio::test]
async fn terminal_session_toggles_raw_mode_and_detaches() {
    let cluster = MemoryCluster::default();
    cluster
        .insert_ready("tenant-1", &ContainerSpec::new("web", "nginx:1.27"))
        .unwrap();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let (req, client) = session(json!({
        "op": "attach", "tenant": tenant(), "name": "web", "terminal": true
    }));
    client
        .send(json!({ "type": "terminal-size", "size": { "cols": 100, "rows": 30 } }))
        .unwrap();
    client
        .send(json!({ "type": "signal", "signal": "interrupt" }))
        .unwrap();
    client.send(json!({ "type": "stdin", "data": [0x10] })).unwrap();
    client.send(json!({ "type": "stdin", "data": [0x11] })).unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let out: Vec<WireMessage> = wire_lines(resp.into_body()).collect().await;
    drop(client);

    let frames: Vec<&SessionFrame> = out
        .iter()
        .filter_map(|m| match m {
            WireMessage::Frame { frame } => Some(frame),
            _ => None,
        })
        .collect();
    let raw: Vec<bool> = frames
        .iter()
        .filter_map(|f| match f {
            SessionFrame::SetRaw { raw } => Some(*raw),
            _ => None,
        })
        .collect();
    assert_eq!(raw, vec![true, false]);
    assert!(frames.iter().any(|f| matches!(
        f,
        SessionFrame::Stderr { data } if String::from_utf8_lossy(data).contains(DETACH_HINT)
    )));
    assert!(!frames.iter().any(|f| matches!(f, SessionFrame::ExitCode { .. })));
    assert_eq!(
        out.last(),
        Some(&WireMessage::Result {
            result: RunResult::SessionEnded {
                name: "web".into(),
                end: SessionEnd::Detached
            }
        })
    );
}

#[tokio::test]
async fn session_without_request_line_is_rejected() {
    let cluster = MemoryCluster::default();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let req = Request::post("/api/v1/sessions").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_run_must_be_interactive() {
    let cluster = MemoryCluster::default();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let (req, _client) = session(json!({
        "op": "run", "tenant": tenant(), "spec": { "name": "web", "image": "nginx:1.27" }
    }));
    let resp = router.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn empty_exec_command_is_rejected() {
    let cluster = MemoryCluster::default();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let req = post(
        "/api/v1/containers/web/exec",
        json!({ "tenant": tenant(), "command": [] }),
    );
    let resp = router.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_endpoint_requires_a_backend() {
    let cluster = MemoryCluster::default();
    let router = router(PipelineAdapter::new(pipeline(&cluster)));

    let req = Request::get("/metrics").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_endpoint_reports_runs() {
    let cluster = MemoryCluster::default();
    let metrics = PrometheusMetrics::new().unwrap();
    let pipeline = pipeline(&cluster).with_metrics(Arc::new(metrics.clone()));
    let router = router(PipelineAdapter::new(pipeline).with_metrics(metrics));

    let req = post(
        "/api/v1/containers",
        json!({ "tenant": tenant(), "spec": { "name": "web", "image": "nginx:1.27", "detach": true } }),
    );
    messages(router.clone(), req).await;

    let req = Request::get("/metrics").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(r#"berth_runs_started_total{op="run"} 1"#));
    assert!(text.contains(r#"berth_runs_completed_total{op="run",outcome="success"} 1"#));
}
