use thiserror::Error;

/// Errors surfaced while encoding or decoding frames on a tunnel.
///
/// Mirrors the `ProtocolError`/`TransportError` split from the forwarder's
/// error taxonomy, but scoped to what this crate alone can detect.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("transport closed while reading a frame")]
    Eof,

    #[error("frame of {len} bytes exceeds the configured max of {max} bytes")]
    TooLarge { len: u32, max: u32 },

    #[error("malformed init frame: {0}")]
    Malformed(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
