//! Error kinds surfaced to the host binary (§7).

use std::fmt;
use thiserror::Error;

/// Which dial failed, for [`ForwarderError::Dial`].
#[derive(Debug)]
pub enum DialTarget {
    Router,
    LocalPort,
    LocalWebSocket,
    LegacyControl,
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialTarget::Router => write!(f, "router"),
            DialTarget::LocalPort => write!(f, "local port"),
            DialTarget::LocalWebSocket => write!(f, "local websocket"),
            DialTarget::LegacyControl => write!(f, "legacy control channel"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("dial failed ({target}): {source}")]
    Dial {
        target: DialTarget,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("token refresh failed: {0}")]
    Auth(Box<dyn std::error::Error + Send + Sync>),

    #[error("peer closed the tunnel")]
    PeerClosed,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Frame(#[from] tunnel_protocol::FrameError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("bridge cancelled")]
    Cancelled,
}

impl ForwarderError {
    pub fn dial(target: DialTarget, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        ForwarderError::Dial {
            target,
            source: Box::new(source),
        }
    }

    /// As [`Self::dial`], but for failures only available as a displayable
    /// message (e.g. an `anyhow::Error` from a lookup helper).
    pub fn dial_msg(target: DialTarget, message: impl fmt::Display) -> Self {
        ForwarderError::Dial {
            target,
            source: Box::new(Opaque(message.to_string())),
        }
    }

    pub fn auth(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        ForwarderError::Auth(Box::new(source))
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Opaque(String);

pub type Result<T> = std::result::Result<T, ForwarderError>;
