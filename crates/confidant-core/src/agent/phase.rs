//! Per-request turn phases, logged as the orchestrator moves through them.

use std::fmt;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Received,
    LoadingState,
    Compressing,
    PromptAssembled,
    CallingProvider,
    Streaming,
    Buffered,
    Persisting,
    Done,
    Error,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Received => "RECEIVED",
            TurnPhase::LoadingState => "LOADING_STATE",
            TurnPhase::Compressing => "COMPRESSING",
            TurnPhase::PromptAssembled => "PROMPT_ASSEMBLED",
            TurnPhase::CallingProvider => "CALLING_PROVIDER",
            TurnPhase::Streaming => "STREAMING",
            TurnPhase::Buffered => "BUFFERED",
            TurnPhase::Persisting => "PERSISTING",
            TurnPhase::Done => "DONE",
            TurnPhase::Error => "ERROR",
        };
        f.write_str(name)
    }
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnPhase::Done | TurnPhase::Error)
    }
}

/// Tracks the current phase of one request.
#[derive(Debug)]
pub struct PhaseTracker {
    current: TurnPhase,
    history: Vec<TurnPhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        debug!(phase = %TurnPhase::Received, "Turn received");
        Self {
            current: TurnPhase::Received,
            history: vec![TurnPhase::Received],
        }
    }

    pub fn current(&self) -> TurnPhase {
        self.current
    }

    /// Phases visited so far, in order.
    pub fn history(&self) -> &[TurnPhase] {
        &self.history
    }

    /// Move to `next`. Transitions out of a terminal phase are ignored.
    pub fn advance(&mut self, next: TurnPhase) {
        if self.current.is_terminal() {
            return;
        }
        debug!(from = %self.current, to = %next, "Turn phase transition");
        self.current = next;
        self.history.push(next);
    }

    pub fn fail(&mut self, reason: &str) {
        if !self.current.is_terminal() {
            debug!(from = %self.current, reason, "Turn failed");
        }
        self.advance(TurnPhase::Error);
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
