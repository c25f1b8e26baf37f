use common::error::diagnostics::DiagnosticMessage;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

/// Which half of the exchange a timeout hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the status line and headers.
    FirstByte,
    /// Waiting for the rest of the body.
    Body,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::FirstByte => f.write_str("first byte"),
            Phase::Body => f.write_str("response body"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("timed out waiting for {phase}: {context}")]
    Timeout {
        phase: Phase,
        context: DiagnosticMessage,
    },
    #[error("transport error: {context}")]
    Transport {
        context: DiagnosticMessage,
        #[source]
        source: Option<reqwest::Error>,
    },
    #[error("protocol error: {context}")]
    Protocol {
        status: Option<u16>,
        context: DiagnosticMessage,
    },
    #[error("unrecognized completion: {context}")]
    Parse { context: DiagnosticMessage },
}

impl LlmError {
    #[track_caller]
    pub fn timeout(phase: Phase, budget: Duration) -> Self {
        Self::Timeout {
            phase,
            context: DiagnosticMessage::new(format!(
                "no {} within {} ms",
                phase,
                budget.as_millis()
            )),
        }
    }

    #[track_caller]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }

    #[track_caller]
    pub fn protocol(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Protocol {
            status,
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Timeouts and transport failures: the service was unreachable rather
    /// than answering badly.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

impl From<reqwest::Error> for LlmError {
    #[track_caller]
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LlmError::parse(err.to_string())
        } else if let Some(status) = err.status() {
            LlmError::protocol(Some(status.as_u16()), err.to_string())
        } else {
            let message = err.to_string();
            LlmError::Transport {
                context: DiagnosticMessage::new(message),
                source: Some(err),
            }
        }
    }
}
