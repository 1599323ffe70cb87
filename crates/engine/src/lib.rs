//! The AgentGate invocation engine.
//!
//! Everything between "raw request bytes arrived" and "uniform envelope goes
//! out" lives here:
//!
//! - [`merge`] — memory merge/truncation policy
//! - [`prompt`] — deterministic prompt assembly
//! - [`repair`] — backend call + bounded output repair (≤2 calls, hard)
//! - [`postprocess`] — per-primitive output normalization
//! - [`envelope`] — the uniform success/error response shape
//! - [`fault`] — the tagged error type threaded through pipeline steps
//! - [`pipeline`] — the orchestrating [`InvocationPipeline`]
//!
//! The pipeline's `invoke` is a total function: every fault path is
//! converted into an error envelope before return.

pub mod envelope;
pub mod fault;
pub mod merge;
pub mod pipeline;
pub mod postprocess;
pub mod prompt;
pub mod repair;

pub use envelope::{Envelope, Meta, new_request_id};
pub use fault::{ErrorCode, Fault};
pub use merge::merge_events;
pub use pipeline::{InvocationPipeline, InvokeOutcome};
pub use prompt::{assemble, PromptSpec};
pub use repair::GeneratedOutput;
