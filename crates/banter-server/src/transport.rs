//! TCP framing and per-connection tasks.
//!
//! Each accepted connection gets two tasks: a reader that turns
//! length-prefixed frames into [`ServerEvent`]s, and a writer that drains
//! a per-session queue of encoded frames. The reader task owning the
//! read half keeps the multiplexer's dispatch loop free of per-client
//! blocking: a slow or malicious handshake only ever stalls its own
//! tasks.

use banter_proto::{MAX_FRAME_SIZE, ProtocolError};
use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc,
};

use crate::driver::ServerEvent;

/// Read frames from one connection and feed them into the event queue.
///
/// Ends on EOF, on a hard receive error, or once the event queue is
/// gone. Transient interrupts are retried rather than treated as
/// disconnects.
pub(crate) async fn read_loop(
    mut reader: OwnedReadHalf,
    session_id: u64,
    events: mpsc::Sender<ServerEvent>,
) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(bytes)) => {
                if events.send(ServerEvent::FrameReceived { session_id, bytes }).await.is_err() {
                    return;
                }
            },
            Ok(None) => {
                let _ = events.send(ServerEvent::ConnectionClosed { session_id }).await;
                return;
            },
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
            Err(e) => {
                tracing::warn!("receive error on session {session_id}: {e}");
                let _ = events.send(ServerEvent::ConnectionClosed { session_id }).await;
                return;
            },
        }
    }
}

/// Drain the per-session outbound queue onto the socket.
///
/// Runs until the queue's senders are dropped (session removal), then
/// flushes and shuts the write half down - so a farewell frame queued
/// just before removal still reaches the peer. A write failure reports
/// `SendFailed` and ends the task; the driver removes the session.
pub(crate) async fn write_loop(
    mut writer: OwnedWriteHalf,
    session_id: u64,
    mut outbound: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<ServerEvent>,
) {
    while let Some(bytes) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &bytes).await {
            tracing::warn!("send error on session {session_id}: {e}");
            let _ = events.try_send(ServerEvent::SendFailed { session_id });
            return;
        }
    }

    let _ = writer.shutdown().await;
}

/// Read one length-prefixed frame. `Ok(None)` on clean EOF before the
/// length prefix.
async fn read_frame(reader: &mut OwnedReadHalf) -> std::io::Result<Option<Bytes>> {
    let mut prefix = [0u8; 4];

    match reader.read_exact(&mut prefix).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        let err = ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE };
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(Bytes::from(body)))
}

/// Write one length-prefixed frame.
async fn write_frame(writer: &mut OwnedWriteHalf, body: &[u8]) -> std::io::Result<()> {
    let len = u32::try_from(body.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "frame body exceeds u32 length")
    })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}
