//! Chat request orchestration
//!
//! Ties retrieval, fusion and prompt composition to a model call, and owns
//! the choice between a buffered reply and an event stream together with
//! the failure path each one takes.

mod assistant;
mod lifecycle;
mod streamer;

pub use assistant::{PreparedPrompt, TravelAssistant};
pub use lifecycle::{ChatPhase, RequestLifecycle, ResponseMode};
pub use streamer::{EventStream, StreamEvent};
