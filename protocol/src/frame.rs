//! Length-delimited frame codec.
//!
//! Every tunnel carries a stream of frames: a 4-byte big-endian length
//! prefix followed by that many body bytes. Frame 1 is always the Init
//! message (bincode-encoded); UDP-mode tunnels use framing again for every
//! payload frame afterward (to preserve datagram boundaries over a byte
//! stream). TCP/WS/raw-conn tunnels never frame payload bytes — they copy
//! the raw stream directly, which is why this module only covers the Init
//! handshake and UDP datagrams.

use crate::error::FrameError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Default upper bound on a single frame body, within the 16-64 MiB range
/// spec.md names for the transport's max-message-size.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 32 * 1024 * 1024;

/// Writes one length-delimited frame.
///
/// Does not flush; callers that need the frame to actually hit the wire
/// immediately (e.g. a control message that a peer is waiting on) should
/// call `writer.flush()` afterward.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), FrameError> {
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge {
        len: u32::MAX,
        max: DEFAULT_MAX_FRAME_BYTES,
    })?;
    writer.write_u32(len).await?;
    writer.write_all(body).await?;
    Ok(())
}

/// Reads one length-delimited frame, enforcing `max_len`.
///
/// Returns [`FrameError::Eof`] if the peer closed before a length prefix
/// could be read at all (a clean end-of-stream); any other I/O failure
/// while reading the body surfaces as `FrameError::Io`.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: u32,
) -> Result<Vec<u8>, FrameError> {
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Eof),
        Err(e) => return Err(e.into()),
    };
    if len > max_len {
        warn!(len, max_len, "rejecting oversized frame");
        return Err(FrameError::TooLarge { len, max: max_len });
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let body = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn round_trips_an_exactly_empty_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &[]).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let body = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn rejects_a_frame_over_the_configured_max() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &[0u8; 100]).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor, 10).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { len: 100, max: 10 }));
    }

    #[tokio::test]
    async fn eof_on_empty_stream_is_reported_as_eof_not_io_error() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Eof));
    }
}
