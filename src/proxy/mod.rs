//! Proxy Pipeline (§4.6) and Streaming Tap (§4.7): the request-plane heart of
//! LLMLab. A single inbound request to `/api/v1/proxy/{provider}/...` is
//! authenticated against a proxy key, checked against the response cache,
//! forwarded to the upstream provider (buffered or streamed), metered, and
//! logged — all without altering request/response semantics (§1 Non-goals).

mod pipeline;
mod stream_tap;

pub use pipeline::{run, PipelineDeps};
pub use stream_tap::StreamTap;
