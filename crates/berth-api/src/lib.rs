//! HTTP driver for the provisioning pipeline.
//!
//! Operations answer with a newline-delimited JSON stream of [`WireMessage`]s. Closing the
//! response body cancels the operation. The container routes are output-only: stdin is closed
//! and no terminal is attached. `POST /api/v1/sessions` is the interactive route: its request
//! body is itself newline-delimited JSON, a [`SessionRequest`] line followed by client frames.
mod error;
pub use error::ApiError;

mod wire;
pub use wire::{WireMessage, WireStream};

mod handler;
pub use handler::{ApiHandler, AttachRequest, ExecRequest, RunRequest, SessionRequest};

mod adapter;
pub use adapter::PipelineAdapter;

mod http;
pub use http::HttpApi;
