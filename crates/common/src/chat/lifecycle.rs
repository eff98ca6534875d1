//! Per-request state machine
//!
//! ```text
//! Idle -> Retrieving -> Composing -> ModelCall -> Streaming | Buffering
//!                                              -> Completed | FailedBeforeSend | FailedMidSend
//! ```
//!
//! Which failure phase a request ends in depends only on the explicit
//! commit flag, set when the event-stream response is handed to the
//! transport.

use crate::errors::{AppError, Result};
use crate::metrics;
use std::fmt;
use std::time::Instant;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Buffered,
    Streaming,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Buffered => "buffered",
            ResponseMode::Streaming => "streaming",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    Retrieving,
    Composing,
    ModelCall,
    Streaming,
    Buffering,
    Completed,
    FailedBeforeSend,
    FailedMidSend,
}

impl ChatPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatPhase::Idle => "idle",
            ChatPhase::Retrieving => "retrieving",
            ChatPhase::Composing => "composing",
            ChatPhase::ModelCall => "model_call",
            ChatPhase::Streaming => "streaming",
            ChatPhase::Buffering => "buffering",
            ChatPhase::Completed => "completed",
            ChatPhase::FailedBeforeSend => "failed_before_send",
            ChatPhase::FailedMidSend => "failed_mid_send",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatPhase::Completed | ChatPhase::FailedBeforeSend | ChatPhase::FailedMidSend
        )
    }

    pub fn can_transition_to(&self, next: ChatPhase) -> bool {
        use ChatPhase::*;
        matches!(
            (self, next),
            (Idle, Retrieving)
                | (Idle, FailedBeforeSend)
                | (Retrieving, Composing)
                | (Retrieving, FailedBeforeSend)
                | (Composing, ModelCall)
                | (Composing, FailedBeforeSend)
                | (ModelCall, Streaming)
                | (ModelCall, Buffering)
                | (ModelCall, FailedBeforeSend)
                | (ModelCall, FailedMidSend)
                | (Streaming, Completed)
                | (Streaming, FailedMidSend)
                | (Buffering, Completed)
                | (Buffering, FailedBeforeSend)
        )
    }
}

impl fmt::Display for ChatPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one chat request from receipt to its terminal phase
#[derive(Debug)]
pub struct RequestLifecycle {
    mode: ResponseMode,
    phase: ChatPhase,
    committed: bool,
    started: Instant,
    recorded: bool,
}

impl RequestLifecycle {
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            mode,
            phase: ChatPhase::Idle,
            committed: false,
            started: Instant::now(),
            recorded: false,
        }
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&mut self, next: ChatPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(AppError::Internal {
                message: format!("illegal chat transition {} -> {}", self.phase, next),
            });
        }
        if next == ChatPhase::FailedMidSend && !self.committed {
            return Err(AppError::Internal {
                message: "mid-send failure on an uncommitted response".to_string(),
            });
        }

        self.phase = next;
        if next.is_terminal() {
            self.record(next.as_str());
        }
        Ok(())
    }

    /// The event-stream response has been handed to the transport.
    ///
    /// Only streaming requests commit, and only before the model is called.
    pub fn commit(&mut self) -> Result<()> {
        if self.mode != ResponseMode::Streaming || self.phase != ChatPhase::Composing {
            return Err(AppError::Internal {
                message: format!(
                    "cannot commit a {} response in phase {}",
                    self.mode.as_str(),
                    self.phase
                ),
            });
        }
        self.committed = true;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.advance(ChatPhase::Completed)
    }

    /// Record `error` as the end of the request and hand it back.
    ///
    /// The terminal phase is `FailedMidSend` once committed and
    /// `FailedBeforeSend` otherwise.
    pub fn fail(&mut self, error: AppError) -> AppError {
        let next = if self.committed {
            ChatPhase::FailedMidSend
        } else {
            ChatPhase::FailedBeforeSend
        };

        error!(
            error = %error,
            mode = self.mode.as_str(),
            phase = %self.phase,
            terminal = %next,
            "Chat request failed"
        );

        if self.phase.is_terminal() {
            warn!(phase = %self.phase, "Failure reported after terminal phase");
            return error;
        }
        // Every non-terminal phase may fail, so bypass the table here
        self.phase = next;
        self.record(next.as_str());
        error
    }

    fn record(&mut self, outcome: &str) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        metrics::record_chat(
            self.mode.as_str(),
            outcome,
            self.started.elapsed().as_secs_f64(),
        );
    }
}

impl Drop for RequestLifecycle {
    fn drop(&mut self) {
        if !self.recorded && self.phase != ChatPhase::Idle {
            warn!(
                mode = self.mode.as_str(),
                phase = %self.phase,
                committed = self.committed,
                "Chat request cancelled by caller"
            );
            self.record("cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_paths_are_legal() {
        let mut streaming = RequestLifecycle::new(ResponseMode::Streaming);
        streaming.advance(ChatPhase::Retrieving).unwrap();
        streaming.advance(ChatPhase::Composing).unwrap();
        streaming.commit().unwrap();
        streaming.advance(ChatPhase::ModelCall).unwrap();
        streaming.advance(ChatPhase::Streaming).unwrap();
        streaming.complete().unwrap();
        assert_eq!(streaming.phase(), ChatPhase::Completed);

        let mut buffered = RequestLifecycle::new(ResponseMode::Buffered);
        for phase in [
            ChatPhase::Retrieving,
            ChatPhase::Composing,
            ChatPhase::ModelCall,
            ChatPhase::Buffering,
            ChatPhase::Completed,
        ] {
            buffered.advance(phase).unwrap();
        }
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut lifecycle = RequestLifecycle::new(ResponseMode::Buffered);
        assert!(lifecycle.advance(ChatPhase::ModelCall).is_err());
        assert_eq!(lifecycle.phase(), ChatPhase::Idle);

        assert!(!ChatPhase::Completed.can_transition_to(ChatPhase::Streaming));
        assert!(!ChatPhase::FailedMidSend.can_transition_to(ChatPhase::Completed));
        assert!(!ChatPhase::Buffering.can_transition_to(ChatPhase::FailedMidSend));
    }

    #[test]
    fn test_failure_before_commit() {
        let mut lifecycle = RequestLifecycle::new(ResponseMode::Streaming);
        lifecycle.advance(ChatPhase::Retrieving).unwrap();
        let err = lifecycle.fail(AppError::Composition {
            message: "boom".to_string(),
        });
        assert!(matches!(err, AppError::Composition { .. }));
        assert_eq!(lifecycle.phase(), ChatPhase::FailedBeforeSend);
    }

    #[test]
    fn test_failure_after_commit() {
        let mut lifecycle = RequestLifecycle::new(ResponseMode::Streaming);
        lifecycle.advance(ChatPhase::Retrieving).unwrap();
        lifecycle.advance(ChatPhase::Composing).unwrap();
        lifecycle.commit().unwrap();
        lifecycle.advance(ChatPhase::ModelCall).unwrap();
        lifecycle.advance(ChatPhase::Streaming).unwrap();

        lifecycle.fail(AppError::ModelCall {
            message: "reset".to_string(),
        });
        assert_eq!(lifecycle.phase(), ChatPhase::FailedMidSend);

        // terminal phases stay put
        lifecycle.fail(AppError::ModelCall {
            message: "again".to_string(),
        });
        assert_eq!(lifecycle.phase(), ChatPhase::FailedMidSend);
        assert!(lifecycle.complete().is_err());
    }

    #[test]
    fn test_commit_rules() {
        let mut buffered = RequestLifecycle::new(ResponseMode::Buffered);
        buffered.advance(ChatPhase::Retrieving).unwrap();
        buffered.advance(ChatPhase::Composing).unwrap();
        assert!(buffered.commit().is_err());
        assert!(!buffered.is_committed());

        let mut early = RequestLifecycle::new(ResponseMode::Streaming);
        assert!(early.commit().is_err());

        let mut uncommitted = RequestLifecycle::new(ResponseMode::Streaming);
        uncommitted.advance(ChatPhase::Retrieving).unwrap();
        uncommitted.advance(ChatPhase::Composing).unwrap();
        uncommitted.advance(ChatPhase::ModelCall).unwrap();
        assert!(uncommitted.advance(ChatPhase::FailedMidSend).is_err());
    }
}
