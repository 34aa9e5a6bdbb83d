//! Length-prefixed bincode frames
//!
//! Every frame is a little-endian `u32` payload length followed by the
//! bincode encoding of a [`Frame`].

use super::TransportError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024; // 64MB max frame

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame<T> {
    /// Connector announces itself after connecting
    Hello,
    /// Binder accepts the connector; data may flow afterwards
    Welcome,
    Data(T),
    /// No more data from this sender
    Terminator,
    /// Receiver has queued everything up to and including the terminator
    Ack,
    /// Broadcast shutdown request
    Stop,
}

/// Encode a frame with its length prefix
pub fn encode_frame<T: Serialize>(frame: &Frame<T>) -> Result<Vec<u8>, TransportError> {
    let payload = bincode::serialize(frame)?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a frame payload (after the length prefix)
pub fn decode_frame<T: DeserializeOwned>(data: &[u8]) -> Result<Frame<T>, TransportError> {
    Ok(bincode::deserialize(data)?)
}

pub async fn write_frame<W, T>(writer: &mut W, frame: &Frame<T>) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = encode_frame(frame)?;
    writer.write_all(&encoded).await?;
    Ok(())
}

/// Read the next frame; `None` when the peer closed the connection between
/// frames
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<Frame<T>>, TransportError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_frame(&payload).map(Some)
}
