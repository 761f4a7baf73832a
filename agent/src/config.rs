//! Configuration surface consumed from the host binary (§6.1).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a token refresh, as returned by a [`TokenRefresher`].
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub token: String,
    pub expires_at: Instant,
}

pub type RefresherFuture =
    Pin<Box<dyn Future<Output = anyhow::Result<RefreshedToken>> + Send>>;

/// Caller-supplied hook invoked by the [`crate::token::TokenManager`] on refresh.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self) -> RefresherFuture;
}

impl<F> TokenRefresher for F
where
    F: Fn() -> RefresherFuture + Send + Sync,
{
    fn refresh(&self) -> RefresherFuture {
        (self)()
    }
}

/// Retry budget shared across the local-port, local-WS, and legacy
/// control-channel dial call sites (§9 open question: unify retry counts).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Defaults matching §4.8's stated numbers for each call site.
impl RetryPolicy {
    pub const LOCAL_PORT: RetryPolicy = RetryPolicy::new(5, Duration::from_secs(1));
    pub const LOCAL_WS: RetryPolicy = RetryPolicy::new(5, Duration::from_secs(1));
    pub const LEGACY_CONTROL: RetryPolicy = RetryPolicy::new(10, Duration::from_secs(1));
}

/// TLS behavior for the new-transport QUIC dial. Insecure verification is
/// only honored when `router_address` carries the `insecure:` prefix.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub insecure: bool,
}

#[derive(Clone)]
pub struct ForwarderConfig {
    /// `host:port`, optionally prefixed `insecure:` to opt into a
    /// self-signed/unverified QUIC handshake for local development.
    pub router_address: String,
    /// URL of the legacy control-channel router (e.g. `ws://host:port/legacy/control`).
    pub legacy_router_url: Option<String>,
    /// Selects 4.3/4.4/4.5/4.6 (new-transport) vs 4.7 (legacy).
    pub use_new_transport: bool,
    pub workflow_id: String,
    /// Metadata key under which the JWT is attached on each dial.
    pub token_header_name: String,
    pub token_refresher: Arc<dyn TokenRefresher>,
    pub tls: TlsConfig,
    pub local_port_retry: RetryPolicy,
    pub local_ws_retry: RetryPolicy,
    pub legacy_control_retry: RetryPolicy,
    /// Caps concurrent sub-connections spawned by the legacy forwarder.
    /// `None` preserves the teacher's unbounded-spawn behavior (§9).
    pub max_concurrent_legacy_sessions: Option<usize>,
}

impl ForwarderConfig {
    /// Whether the QUIC dial should skip certificate verification, and the
    /// router address with any `insecure:` prefix stripped.
    ///
    /// Per §6.1, insecure verification requires *both* `tls.insecure` and
    /// the `insecure:` address prefix — either alone is not enough. This
    /// guards against an address pasted with a stray prefix silently
    /// disabling verification, and against a `tls.insecure = true` default
    /// silently applying to a production address that lacks the prefix.
    pub fn parsed_router_address(&self) -> (bool, &str) {
        match self.router_address.strip_prefix("insecure:") {
            Some(rest) => (self.tls.insecure, rest),
            None => (false, self.router_address.as_str()),
        }
    }
}
