//! TCP transport for the client.
//!
//! Provides [`connect`], which establishes the TCP connection (bounded
//! timeout) and drives the Sans-IO [`ClientSession`] against it. This is
//! a thin layer: protocol logic stays in the state machine, the driver
//! task only moves frames and executes actions.
//!
//! Two mpsc channels face the caller: commands in (text, password
//! answers, quit), notices out. A dedicated reader task owns the read
//! half so the driver's `select!` only ever polls cancel-safe channel
//! receivers.

use std::time::Duration;

use banter_proto::{MAX_FRAME_SIZE, ProtocolError};
use bytes::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    time::timeout,
};

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent, ClientNotice},
    session::ClientSession,
};

/// Bound on how long the initial TCP connect may take.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// User intents forwarded into the running session.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// Send chat text.
    SendText(String),
    /// Answer the password challenge; `None` aborts it.
    SubmitPassword(Option<String>),
    /// Close the session and the transport.
    Quit,
}

/// Handle to a connected client.
///
/// Dropping the command sender (or sending [`ClientCommand::Quit`])
/// closes the session; the notice receiver yields events until then.
pub struct ConnectedClient {
    /// Send user intents to the session.
    pub commands: mpsc::Sender<ClientCommand>,
    /// Receive observer notices from the session.
    pub notices: mpsc::Receiver<ClientNotice>,
    /// Abort handle for the driver task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Stop the connection immediately, without a graceful close.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Connect to a banter server and start the session.
///
/// The TCP connect is bounded by [`CONNECT_TIMEOUT`]; the handshake
/// itself is driven by the returned channels (the first notice is
/// `Connected`, `PasswordRequired`, or a terminal `SessionFailed`).
///
/// # Errors
///
/// - `ClientError::Connect` if the transport cannot be established in
///   time
pub async fn connect(server_addr: &str, name: &str) -> Result<ConnectedClient, ClientError> {
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(server_addr))
        .await
        .map_err(|_| ClientError::Connect(format!("timed out after {CONNECT_TIMEOUT:?}")))?
        .map_err(|e| ClientError::Connect(e.to_string()))?;

    let (read_half, write_half) = stream.into_split();

    let mut session = ClientSession::new(name);
    session
        .handle(ClientEvent::TransportConnected)
        .map_err(|e| ClientError::Connect(e.to_string()))?;

    let (command_tx, command_rx) = mpsc::channel::<ClientCommand>(32);
    let (notice_tx, notice_rx) = mpsc::channel::<ClientNotice>(32);
    let (frame_tx, frame_rx) = mpsc::channel::<ReaderEvent>(32);

    tokio::spawn(read_loop(read_half, frame_tx));
    let driver = tokio::spawn(drive_session(session, write_half, frame_rx, command_rx, notice_tx));

    Ok(ConnectedClient {
        commands: command_tx,
        notices: notice_rx,
        abort_handle: driver.abort_handle(),
    })
}

/// What the reader task observed on the wire.
enum ReaderEvent {
    /// A complete frame body.
    Frame(Bytes),
    /// Clean EOF from the server.
    Closed,
    /// Receive failure (I/O error or oversized frame).
    Failed(String),
}

/// Read length-prefixed frames until EOF or error.
async fn read_loop(mut reader: OwnedReadHalf, frames: mpsc::Sender<ReaderEvent>) {
    loop {
        let event = match read_frame(&mut reader).await {
            Ok(Some(bytes)) => ReaderEvent::Frame(bytes),
            Ok(None) => ReaderEvent::Closed,
            Err(e) => ReaderEvent::Failed(e.to_string()),
        };

        let terminal = !matches!(event, ReaderEvent::Frame(_));
        if frames.send(event).await.is_err() || terminal {
            break;
        }
    }
}

/// Drive the session: feed reader events and user commands through the
/// state machine and execute the resulting actions.
async fn drive_session(
    mut session: ClientSession,
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::Receiver<ReaderEvent>,
    mut commands: mpsc::Receiver<ClientCommand>,
    notices: mpsc::Sender<ClientNotice>,
) {
    loop {
        let event = tokio::select! {
            reader_event = frames.recv() => match reader_event {
                Some(ReaderEvent::Frame(bytes)) => ClientEvent::FrameReceived(bytes),
                Some(ReaderEvent::Failed(context)) => {
                    let _ = notices.send(ClientNotice::TransportError { context }).await;
                    ClientEvent::TransportClosed
                },
                Some(ReaderEvent::Closed) | None => ClientEvent::TransportClosed,
            },
            command = commands.recv() => match command {
                Some(ClientCommand::SendText(body)) => ClientEvent::SubmitText(body),
                Some(ClientCommand::SubmitPassword(password)) => {
                    ClientEvent::SubmitPassword(password)
                },
                Some(ClientCommand::Quit) | None => ClientEvent::Quit,
            },
        };

        let actions = match session.handle(event) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!("client event rejected: {e}");
                continue;
            },
        };

        if execute_actions(actions, &mut writer, &notices).await {
            break;
        }
    }

    let _ = writer.shutdown().await;
}

/// Execute session actions. Returns true once the session is done.
async fn execute_actions(
    actions: Vec<ClientAction>,
    writer: &mut OwnedWriteHalf,
    notices: &mpsc::Sender<ClientNotice>,
) -> bool {
    let mut done = false;

    for action in actions {
        match action {
            ClientAction::Send(message) => match message.to_bytes() {
                Ok(bytes) => {
                    if let Err(e) = write_frame(writer, &bytes).await {
                        let _ = notices
                            .send(ClientNotice::TransportError { context: e.to_string() })
                            .await;
                        done = true;
                    }
                },
                Err(e) => tracing::warn!("failed to encode outbound message: {e}"),
            },
            ClientAction::SendIdentity(identity) => match identity.to_bytes() {
                Ok(bytes) => {
                    if let Err(e) = write_frame(writer, &bytes).await {
                        let _ = notices
                            .send(ClientNotice::TransportError { context: e.to_string() })
                            .await;
                        done = true;
                    }
                },
                Err(e) => tracing::warn!("failed to encode identity: {e}"),
            },
            ClientAction::Notify(notice) => {
                let _ = notices.send(notice).await;
            },
            ClientAction::Close { reason } => {
                tracing::debug!("session closed: {reason}");
                done = true;
            },
        }
    }

    done
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
