//! Per-request lifecycle.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use ragbot_core::RequestId;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Where a request is in its lifecycle.
///
/// ```text
/// Received → Retrieving → Assembling → Generating → Completed
///                 ↘            ↘            ↘
///                  Failed       Failed       Failed
/// (any non-terminal state) → Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Received,
    Retrieving,
    Assembling,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        match (self, next) {
            (from, Cancelled) => !from.is_terminal(),
            (Received, Retrieving)
            | (Retrieving, Assembling)
            | (Retrieving, Failed)
            | (Assembling, Generating)
            | (Assembling, Failed)
            | (Generating, Completed)
            | (Generating, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The visited states of one request. The last entry is the current state.
#[derive(Debug)]
pub struct Lifecycle {
    request_id: RequestId,
    visited: Mutex<Vec<RequestState>>,
}

impl Lifecycle {
    pub fn new(request_id: RequestId) -> Self {
        Self { request_id, visited: Mutex::new(vec![RequestState::Received]) }
    }

    pub fn current(&self) -> RequestState {
        let visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
        visited.last().copied().unwrap_or(RequestState::Received)
    }

    pub fn visited(&self) -> Vec<RequestState> {
        self.visited.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Move to `next`. Returns `false`, leaving the state unchanged, when the
    /// transition is not allowed from the current state.
    pub fn advance(&self, next: RequestState) -> bool {
        let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
        let current = visited.last().copied().unwrap_or(RequestState::Received);
        if !current.can_transition_to(next) {
            return false;
        }
        visited.push(next);
        debug!(
            request_id = %self.request_id,
            from = %current,
            state = %next,
            "request state changed"
        );
        true
    }
}

/// Lifecycle plus cancellation token of one in-flight request.
#[derive(Debug)]
pub struct RequestControl {
    lifecycle: Lifecycle,
    token: CancellationToken,
}

impl RequestControl {
    pub fn new(request_id: RequestId) -> Self {
        Self { lifecycle: Lifecycle::new(request_id), token: CancellationToken::new() }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Move the request to `Cancelled` and fire its token.
    ///
    /// Returns `false` if the request had already reached a terminal state.
    pub fn cancel(&self) -> bool {
        let cancelled = self.lifecycle.advance(RequestState::Cancelled);
        if cancelled {
            self.token.cancel();
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.lifecycle.current() == RequestState::Cancelled
    }
}
