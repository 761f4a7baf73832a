//! Wire protocol and tunnel abstraction shared by `router` and `agent`.
//!
//! - [`frame`] — the length-delimited frame codec (§2.1).
//! - [`tunnel`] — the bidirectional byte-stream abstraction (§4.1).
//! - [`message`] — new-transport Init-frame types (§3, §6.3).
//! - [`udp`] — the 6-byte UDP peer header (§3, §4.4).
//! - [`legacy`] — the legacy control-channel JSON protocol (§4.7, §6.3).

pub mod error;
pub mod frame;
pub mod legacy;
pub mod message;
pub mod tunnel;
pub mod udp;

pub use error::FrameError;
pub use message::{
    AgentInit, InitMessage, Operation, PortForwardProtocol, RsyncDirection, SessionKey, UserInit,
    WorkflowId, COLLISION_RESET_CODE,
};
pub use tunnel::{Tunnel, TunnelRecvHalf, TunnelSendHalf};
pub use udp::{UdpHeader, UDP_HEADER_LEN};
