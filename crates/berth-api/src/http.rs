use std::{io, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use berth_model::SessionFrame;
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio_util::{
    codec::{FramedRead, LinesCodec, LinesCodecError},
    io::StreamReader,
    sync::CancellationToken,
};
use tracing::{debug, warn};

use crate::{
    ApiError, ApiHandler, AttachRequest, ExecRequest, RunRequest, SessionRequest, WireStream,
    wire::ndjson,
};

const NDJSON: &str = "application/x-ndjson";

/// Longest accepted line of a session body.
const MAX_LINE: usize = 1024 * 1024;

/// Client frames queued ahead of the session's local end.
const FRAME_BUFFER: usize = 32;

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Routes:
    /// - POST /api/v1/containers - provision a container
    /// - POST /api/v1/containers/{name}/attach - follow its main process
    /// - POST /api/v1/containers/{name}/exec - run a command in it
    /// - POST /api/v1/sessions - interactive run, attach or exec
    /// - GET /metrics
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/containers", post(run::<H>))
            .route("/api/v1/sessions", post(session::<H>))
            .route("/api/v1/containers/{name}/attach", post(attach::<H>))
            .route("/api/v1/containers/{name}/exec", post(exec::<H>))
            .route("/metrics", get(metrics::<H>))
            .with_state(self.handler)
    }
}

fn streaming(messages: WireStream) -> Response {
    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(ndjson(messages))).into_response()
}

fn non_empty(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("name cannot be empty".into()));
    }
    Ok(())
}

/// POST /api/v1/containers
async fn run<H>(
    State(handler): State<Arc<H>>,
    Json(req): Json<RunRequest>,
) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    let stream = handler.run(req, CancellationToken::new()).await?;
    Ok(streaming(stream))
}

/// POST /api/v1/containers/{name}/attach
async fn attach<H>(
    State(handler): State<Arc<H>>,
    Path(name): Path<String>,
    Json(req): Json<AttachRequest>,
) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    non_empty(&name)?;
    let stream = handler.attach(name, req, CancellationToken::new()).await?;
    Ok(streaming(stream))
}

/// POST /api/v1/containers/{name}/exec
async fn exec<H>(
    State(handler): State<Arc<H>>,
    Path(name): Path<String>,
    Json(req): Json<ExecRequest>,
) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    non_empty(&name)?;
    let stream = handler.exec(name, req, CancellationToken::new()).await?;
    Ok(streaming(stream))
}

/// POST /api/v1/sessions
///
/// Output starts streaming while the request body is still being read, so clients need a
/// transport that streams both ways at once (HTTP/2, or full-duplex HTTP/1.1).
async fn session<H>(State(handler): State<Arc<H>>, body: Body) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE));

    let first = lines
        .next()
        .await
        .ok_or_else(|| ApiError::InvalidRequest("missing session request line".into()))?
        .map_err(|e| ApiError::InvalidRequest(format!("unreadable session request: {e}")))?;
    let req: SessionRequest = serde_json::from_str(&first)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid session request: {e}")))?;
    if let SessionRequest::Attach { name, .. } | SessionRequest::Exec { name, .. } = &req {
        non_empty(name)?;
    }

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(forward_frames(lines, tx, cancel.clone()));

    // Stops the frame reader if the handler rejects the session.
    let rejected = cancel.clone().drop_guard();
    let stream = handler.session(req, rx, cancel).await?;
    rejected.disarm();
    Ok(streaming(stream))
}

/// Decode client frames from the rest of a session body until it ends or `cancel` fires.
///
/// Malformed lines are skipped. Dropping `tx` closes local stdin.
async fn forward_frames<S>(mut lines: S, tx: mpsc::Sender<SessionFrame>, cancel: CancellationToken)
where
    S: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next() => line,
        };
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                debug!(error = %e, "session body failed");
                break;
            }
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let frame = match serde_json::from_str::<SessionFrame>(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "skipping malformed session frame");
                continue;
            }
        };
        if tx.send(frame).await.is_err() {
            break;
        }
    }
}

/// GET /metrics
async fn metrics<H>(State(handler): State<Arc<H>>) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    let (body, content_type) = handler.metrics().await?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
