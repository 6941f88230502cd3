//! RTMP client connection.
//!
//! [`RtmpConnection::connect`] dials the server, completes the handshake and
//! the connect command exchange, then hands the socket to a background task.
//! The returned handle is cheap to clone and talks to the task over a
//! channel, so calls, media writes and the inbound message loop never
//! contend on a lock. Server initiated traffic surfaces on the event
//! receiver returned alongside the handle.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::amf::AmfValue;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder};
use crate::protocol::constants::*;
use crate::protocol::handshake::{Handshake, HandshakeRole};
use crate::protocol::message::{Command, RtmpMessage, UserControlEvent};
use crate::stats::{ConnectionStats, StatsSample};

use super::auth;
use super::config::{ClientConfig, RtmpUrl};

// Codec support flags advertised in the connect command.
const SUPPORT_SOUND_AAC: f64 = 0x0400 as f64;
const SUPPORT_VIDEO_H264: f64 = 0x0080 as f64;
const DEFAULT_CAPABILITIES: f64 = 239.0;
const VIDEO_FUNCTION_CLIENT_SEEK: f64 = 1.0;

/// Traffic surfaced to the application by the connection task.
#[derive(Debug)]
pub enum RtmpEvent {
    /// An onStatus or other status bearing command from the server.
    Status {
        stream_id: u32,
        code: String,
        description: String,
    },
    /// Metadata object from a data message.
    Metadata(AmfValue),
    /// Audio message, timestamp in milliseconds and FLV tag body.
    Audio { timestamp: u32, data: Bytes },
    /// Video message, timestamp in milliseconds and FLV tag body.
    Video { timestamp: u32, data: Bytes },
    /// Periodic connection statistics.
    Stats(StatsSample),
    /// The connection finished, voluntarily or not.
    Disconnected,
}

enum ConnectionRequest {
    Call {
        command: Command,
        respond: Option<oneshot::Sender<Result<Vec<AmfValue>>>>,
    },
    Message {
        message: RtmpMessage,
        csid: u32,
        timestamp: u32,
        stream_id: u32,
    },
    Close,
}

/// Handle to a connected RTMP client session.
#[derive(Clone)]
pub struct RtmpConnection {
    requests: mpsc::Sender<ConnectionRequest>,
}

impl RtmpConnection {
    /// Connects, handshakes and authenticates against `config.url`.
    ///
    /// Adobe authentication rejections are retried internally with the
    /// credentials from the URL. On success the connection task is spawned
    /// and a handle plus the event receiver are returned.
    pub async fn connect(config: ClientConfig) -> Result<(Self, mpsc::Receiver<RtmpEvent>)> {
        let mut url_string = config.url.clone();
        let mut announced_auth = false;

        loop {
            let url = RtmpUrl::parse(&url_string)?;
            match Self::establish(&config, &url).await {
                Ok(transport) => {
                    let (request_tx, request_rx) = mpsc::channel(256);
                    let (event_tx, event_rx) = mpsc::channel(256);
                    tokio::spawn(ConnectionTask::new(transport, event_tx).run(request_rx));
                    return Ok((RtmpConnection { requests: request_tx }, event_rx));
                }
                Err(Error::Rejected(description)) => {
                    tracing::info!(description = %description, "connect rejected");
                    let username = url.username.clone().unwrap_or_default();
                    let password = url.password.clone().unwrap_or_default();
                    if auth::is_terminal_rejection(&description) {
                        return Err(Error::Rejected(description));
                    } else if auth::needs_challenge(&description) {
                        if username.is_empty() || password.is_empty() {
                            return Err(Error::Rejected(description));
                        }
                        match auth::challenge_response_url(
                            &url_string,
                            &username,
                            &password,
                            &description,
                        ) {
                            Some(next) => url_string = next,
                            None => return Err(Error::Rejected(description)),
                        }
                    } else if auth::wants_adobe_auth(&description) && !announced_auth {
                        if username.is_empty() || password.is_empty() {
                            return Err(Error::Rejected(description));
                        }
                        url_string = auth::initial_auth_url(&url_string, &username);
                        announced_auth = true;
                    } else {
                        return Err(Error::Rejected(description));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn establish(config: &ClientConfig, url: &RtmpUrl) -> Result<Transport<TcpStream>> {
        let addr = url.socket_addr();
        let socket = timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;
        if config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        let mut transport = Transport::new(socket);
        timeout(config.connect_timeout, transport.handshake())
            .await
            .map_err(|_| Error::Timeout)??;
        tracing::debug!(host = %url.host, "handshake complete");
        timeout(config.connect_timeout, transport.connect_exchange(config, url))
            .await
            .map_err(|_| Error::Timeout)??;
        Ok(transport)
    }

    /// Invokes a server command and waits for its _result arguments.
    pub async fn call(&self, name: &str, arguments: Vec<AmfValue>) -> Result<Vec<AmfValue>> {
        let (tx, rx) = oneshot::channel();
        let command = Command::new(name, 0.0, AmfValue::Null).with_arguments(arguments);
        self.requests
            .send(ConnectionRequest::Call {
                command,
                respond: Some(tx),
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Sends a command without waiting for a response.
    pub async fn notify(&self, name: &str, arguments: Vec<AmfValue>) -> Result<()> {
        let command = Command::new(name, 0.0, AmfValue::Null).with_arguments(arguments);
        self.send_command(command).await
    }

    pub(crate) async fn send_command(&self, command: Command) -> Result<()> {
        self.requests
            .send(ConnectionRequest::Call {
                command,
                respond: None,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    pub(crate) async fn send_message(
        &self,
        message: RtmpMessage,
        csid: u32,
        timestamp: u32,
        stream_id: u32,
    ) -> Result<()> {
        self.requests
            .send(ConnectionRequest::Message {
                message,
                csid,
                timestamp,
                stream_id,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Asks the server for a new message stream and returns its id.
    pub async fn create_stream(&self) -> Result<u32> {
        let results = self.call(CMD_CREATE_STREAM, Vec::new()).await?;
        results
            .first()
            .and_then(|v| v.as_number())
            .map(|id| id as u32)
            .ok_or_else(|| Error::Protocol(ProtocolError::MissingField("stream id".into())))
    }

    /// Closes the connection. Outstanding calls resolve with an error.
    pub async fn close(&self) {
        let _ = self.requests.send(ConnectionRequest::Close).await;
    }
}

/// Socket halves plus codec state for one connection.
struct Transport<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    next_transaction_id: u32,
    window_ack_size: u32,
}

impl<S: AsyncRead + AsyncWrite> Transport<S> {
    fn new(socket: S) -> Self {
        let (read_half, write_half) = tokio::io::split(socket);
        Transport {
            reader: BufReader::with_capacity(64 * 1024, read_half),
            writer: BufWriter::with_capacity(64 * 1024, write_half),
            read_buf: BytesMut::with_capacity(64 * 1024),
            write_buf: BytesMut::with_capacity(64 * 1024),
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            next_transaction_id: 0,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        let mut handshake = Handshake::new(HandshakeRole::Client);
        if let Some(c0c1) = handshake.generate_initial() {
            self.writer.write_all(&c0c1).await?;
            self.writer.flush().await?;
        }
        while !handshake.is_done() {
            let n = self.reader.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            let mut data = Bytes::copy_from_slice(&self.read_buf);
            let response = handshake.process(&mut data)?;
            let consumed = self.read_buf.len() - data.len();
            self.read_buf.advance(consumed);
            if let Some(response) = response {
                self.writer.write_all(&response).await?;
                self.writer.flush().await?;
            }
        }
        Ok(())
    }

    /// Sends the connect command and processes messages until the server
    /// accepts or rejects it.
    async fn connect_exchange(&mut self, config: &ClientConfig, url: &RtmpUrl) -> Result<()> {
        self.next_transaction_id += 1;
        let connect = Command::new(
            CMD_CONNECT,
            self.next_transaction_id as f64,
            connect_object(config, url),
        );
        self.write_message(&RtmpMessage::Command(connect), CSID_COMMAND, 0, 0)
            .await?;

        loop {
            while let Some(chunk) = self.decoder.decode(&mut self.read_buf)? {
                match RtmpMessage::from_chunk(chunk)? {
                    RtmpMessage::SetChunkSize(size) => {
                        self.decoder.set_chunk_size(size);
                    }
                    RtmpMessage::WindowAckSize(size) => {
                        self.window_ack_size = size;
                        self.write_message(
                            &RtmpMessage::WindowAckSize(CLIENT_WINDOW_ACK_SIZE),
                            CSID_PROTOCOL_CONTROL,
                            0,
                            0,
                        )
                        .await?;
                    }
                    RtmpMessage::Command(cmd) if cmd.name == CMD_RESULT => {
                        return match cmd.code() {
                            Some(NC_CONNECT_SUCCESS) | None => {
                                self.encoder.set_chunk_size(config.chunk_size);
                                self.write_message(
                                    &RtmpMessage::SetChunkSize(config.chunk_size),
                                    CSID_PROTOCOL_CONTROL,
                                    0,
                                    0,
                                )
                                .await?;
                                tracing::info!(app = %url.app, tc_url = %url.tc_url(), "connected");
                                Ok(())
                            }
                            Some(code) => {
                                let description =
                                    cmd.description().unwrap_or(code).to_string();
                                Err(Error::Rejected(description))
                            }
                        };
                    }
                    RtmpMessage::Command(cmd) if cmd.name == CMD_ERROR => {
                        let description = cmd
                            .description()
                            .or(cmd.code())
                            .unwrap_or("connect refused")
                            .to_string();
                        return Err(Error::Rejected(description));
                    }
                    RtmpMessage::Command(cmd) if cmd.name == CMD_CLOSE => {
                        return Err(Error::ConnectionClosed);
                    }
                    other => {
                        tracing::trace!(message = ?other, "ignored during connect");
                    }
                }
            }

            let n = self.reader.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Writes one message as chunks, returning the bytes put on the wire.
    async fn write_message(
        &mut self,
        message: &RtmpMessage,
        csid: u32,
        timestamp: u32,
        stream_id: u32,
    ) -> Result<usize> {
        let chunk = message.to_chunk(csid, timestamp, stream_id);
        self.write_buf.clear();
        self.encoder.encode(&chunk, &mut self.write_buf);
        let written = self.write_buf.len();
        self.writer.write_all(&self.write_buf).await?;
        self.writer.flush().await?;
        Ok(written)
    }
}

/// Background task owning the socket after connect.
struct ConnectionTask<S> {
    link: Transport<S>,
    call_completions: HashMap<u32, oneshot::Sender<Result<Vec<AmfValue>>>>,
    stats: ConnectionStats,
    events: mpsc::Sender<RtmpEvent>,
}

impl<S: AsyncRead + AsyncWrite + Send + 'static> ConnectionTask<S> {
    fn new(link: Transport<S>, events: mpsc::Sender<RtmpEvent>) -> Self {
        ConnectionTask {
            link,
            call_completions: HashMap::new(),
            stats: ConnectionStats::new(),
            events,
        }
    }

    async fn run(mut self, mut requests: mpsc::Receiver<ConnectionRequest>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => match self.handle_request(request).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            tracing::debug!(error = %e, "write failed");
                            break;
                        }
                    },
                    None => break,
                },
                result = self.link.reader.read_buf(&mut self.link.read_buf) => match result {
                    Ok(0) => {
                        tracing::debug!("server closed the connection");
                        break;
                    }
                    Ok(n) => {
                        self.stats.add_received(n);
                        match self.process_incoming().await {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => {
                                tracing::warn!(error = %e, "protocol error");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "read failed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let sample = self.stats.sample();
                    let _ = self.events.send(RtmpEvent::Stats(sample)).await;
                }
            }
        }

        for (_, respond) in self.call_completions.drain() {
            let _ = respond.send(Err(Error::ConnectionClosed));
        }
        let _ = self.events.send(RtmpEvent::Disconnected).await;
    }

    async fn handle_request(&mut self, request: ConnectionRequest) -> Result<bool> {
        match request {
            ConnectionRequest::Call {
                mut command,
                respond,
            } => {
                self.link.next_transaction_id += 1;
                command.transaction_id = self.link.next_transaction_id as f64;
                if let Some(respond) = respond {
                    self.call_completions
                        .insert(self.link.next_transaction_id, respond);
                }
                let stream_id = command.stream_id;
                let written = self
                    .link
                    .write_message(&RtmpMessage::Command(command), CSID_COMMAND, 0, stream_id)
                    .await?;
                self.stats.add_sent(written);
                Ok(true)
            }
            ConnectionRequest::Message {
                message,
                csid,
                timestamp,
                stream_id,
            } => {
                match &message {
                    RtmpMessage::Audio { .. } => self.stats.add_audio_frame(),
                    RtmpMessage::Video { .. } => self.stats.add_video_frame(),
                    _ => {}
                }
                let written = self
                    .link
                    .write_message(&message, csid, timestamp, stream_id)
                    .await?;
                self.stats.add_sent(written);
                Ok(true)
            }
            ConnectionRequest::Close => Ok(false),
        }
    }

    async fn process_incoming(&mut self) -> Result<bool> {
        while let Some(chunk) = self.link.decoder.decode(&mut self.link.read_buf)? {
            let message = RtmpMessage::from_chunk(chunk)?;
            if !self.dispatch(message).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn dispatch(&mut self, message: RtmpMessage) -> Result<bool> {
        match message {
            RtmpMessage::SetChunkSize(size) => {
                tracing::debug!(size = size, "server chunk size");
                self.link.decoder.set_chunk_size(size);
            }
            RtmpMessage::Abort { csid } => {
                self.link.decoder.abort(csid);
            }
            RtmpMessage::Acknowledgement { sequence } => {
                tracing::trace!(sequence = sequence, "acknowledgement");
            }
            RtmpMessage::WindowAckSize(size) => {
                self.link.window_ack_size = size;
                let written = self
                    .link
                    .write_message(
                        &RtmpMessage::WindowAckSize(CLIENT_WINDOW_ACK_SIZE),
                        CSID_PROTOCOL_CONTROL,
                        0,
                        0,
                    )
                    .await?;
                self.stats.add_sent(written);
            }
            RtmpMessage::SetPeerBandwidth { size, .. } => {
                tracing::trace!(size = size, "peer bandwidth");
            }
            RtmpMessage::UserControl(UserControlEvent::PingRequest(timestamp)) => {
                let written = self
                    .link
                    .write_message(
                        &RtmpMessage::UserControl(UserControlEvent::PingResponse(timestamp)),
                        CSID_PROTOCOL_CONTROL,
                        0,
                        0,
                    )
                    .await?;
                self.stats.add_sent(written);
            }
            RtmpMessage::UserControl(event) => {
                tracing::trace!(event = ?event, "user control");
            }
            RtmpMessage::Audio { timestamp, data } => {
                let _ = self.events.send(RtmpEvent::Audio { timestamp, data }).await;
            }
            RtmpMessage::Video { timestamp, data } => {
                let _ = self.events.send(RtmpEvent::Video { timestamp, data }).await;
            }
            RtmpMessage::Command(cmd) => return self.handle_command(cmd).await,
            RtmpMessage::Data(data) => {
                if data.name == CMD_SET_DATA_FRAME || data.name == CMD_ON_METADATA {
                    if let Some(metadata) = data.metadata() {
                        let _ = self
                            .events
                            .send(RtmpEvent::Metadata(metadata.clone()))
                            .await;
                    }
                }
            }
            RtmpMessage::Unknown { type_id, .. } => {
                tracing::trace!(type_id = type_id, "unhandled message type");
            }
        }
        Ok(true)
    }

    async fn handle_command(&mut self, cmd: Command) -> Result<bool> {
        let transaction = cmd.transaction_id as u32;
        if let Some(respond) = self.call_completions.remove(&transaction) {
            match cmd.name.as_str() {
                CMD_RESULT => {
                    let _ = respond.send(Ok(cmd.arguments));
                    return Ok(true);
                }
                CMD_ERROR => {
                    let description = cmd
                        .description()
                        .or(cmd.code())
                        .unwrap_or("call failed")
                        .to_string();
                    let _ = respond.send(Err(Error::Rejected(description)));
                    return Ok(true);
                }
                _ => {
                    // Not a response after all, keep the completion pending.
                    self.call_completions.insert(transaction, respond);
                }
            }
        }

        if cmd.name == CMD_CLOSE {
            tracing::debug!("server requested close");
            return Ok(false);
        }
        if let Some(code) = cmd.code() {
            if code == NC_CONNECT_CLOSED {
                return Ok(false);
            }
            let event = RtmpEvent::Status {
                stream_id: cmd.stream_id,
                code: code.to_string(),
                description: cmd.description().unwrap_or_default().to_string(),
            };
            let _ = self.events.send(event).await;
        } else {
            tracing::trace!(command = %cmd.name, "unhandled command");
        }
        Ok(true)
    }
}

fn connect_object(config: &ClientConfig, url: &RtmpUrl) -> AmfValue {
    AmfValue::object([
        ("app", AmfValue::from(url.connect_app())),
        ("flashVer", AmfValue::from(config.flash_ver.as_str())),
        ("swfUrl", AmfValue::Null),
        ("tcUrl", AmfValue::from(url.tc_url())),
        ("fpad", AmfValue::from(false)),
        ("capabilities", AmfValue::from(DEFAULT_CAPABILITIES)),
        ("audioCodecs", AmfValue::from(SUPPORT_SOUND_AAC)),
        ("videoCodecs", AmfValue::from(SUPPORT_VIDEO_H264)),
        ("videoFunction", AmfValue::from(VIDEO_FUNCTION_CLIENT_SEEK)),
        ("pageUrl", AmfValue::Null),
        ("objectEncoding", AmfValue::from(0.0)),
    ])
}
