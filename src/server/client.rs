//! Per client connection driver.
//!
//! Each accepted socket gets one [`RtmpServerClient`] running on its own
//! task. After the handshake the driver reads the stream as a sequence of
//! exact sized syntactic units: one byte of basic header, a 3, 7 or 11
//! byte message header, an optional 4 byte extended timestamp, then
//! min(chunk size, message remainder) bytes of payload. Nothing is
//! speculatively buffered past the unit being parsed, so the state
//! machine behaves identically whether bytes arrive one at a time or in
//! large reads.
//!
//! Outbound messages are chunked at the size announced to the client and
//! written as independent type 0 chunks; the server does not compress
//! outbound headers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};
use tokio::time::timeout;

use crate::amf::AmfValue;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::chunk::RtmpChunk;
use crate::protocol::constants::*;
use crate::protocol::handshake::{Handshake, HandshakeRole};
use crate::protocol::message::{
    Command, ConnectParams, DataMessage, PublishParams, RtmpMessage, UserControlEvent,
};
use crate::stats::StreamStats;

use super::chunk_stream::{CompletedMessage, RtmpServerChunkStream};
use super::config::ServerConfig;
use super::handler::RtmpServerHandler;
use super::latency::TargetLatenciesSynchronizer;

/// Serves one publishing client.
pub struct RtmpServerClient<S, H> {
    session_id: u64,
    peer_addr: SocketAddr,
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,
    read_buf: BytesMut,
    config: ServerConfig,
    handler: Arc<H>,
    chunk_streams: HashMap<u32, RtmpServerChunkStream>,
    chunk_size_from_client: u32,
    chunk_size_to_client: u32,
    window_ack_size: u32,
    total_bytes_received: u64,
    total_bytes_acked: u64,
    next_stream_id: u32,
    stream_key: String,
    app: String,
    stats: Option<StreamStats>,
    target_latencies: TargetLatenciesSynchronizer,
}

impl<S, H> RtmpServerClient<S, H>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    H: RtmpServerHandler,
{
    pub fn new(
        stream: S,
        peer_addr: SocketAddr,
        session_id: u64,
        config: ServerConfig,
        handler: Arc<H>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let target_latencies = TargetLatenciesSynchronizer::new(config.target_latency);
        let window_ack_size = config.window_ack_size;
        RtmpServerClient {
            session_id,
            peer_addr,
            reader: BufReader::with_capacity(config.read_buffer_size, read_half),
            writer: BufWriter::with_capacity(config.write_buffer_size, write_half),
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            config,
            handler,
            chunk_streams: HashMap::new(),
            chunk_size_from_client: DEFAULT_CHUNK_SIZE,
            chunk_size_to_client: DEFAULT_CHUNK_SIZE,
            window_ack_size,
            total_bytes_received: 0,
            total_bytes_acked: 0,
            next_stream_id: 0,
            stream_key: String::new(),
            app: String::new(),
            stats: None,
            target_latencies,
        }
    }

    /// Drives the connection until the client disconnects or errors out.
    ///
    /// The handler's `on_client_disconnected` fires exactly once on the
    /// way out, with an empty stream key if the client never published.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        let reason = match &result {
            Ok(()) => "client disconnected".to_string(),
            Err(error) => error.to_string(),
        };
        self.chunk_streams.clear();
        if let Some(stats) = &self.stats {
            tracing::info!(
                stream_key = %stats.stream_key,
                duration_secs = stats.duration().as_secs(),
                bitrate = stats.bitrate(),
                video_frames = stats.video_frames,
                audio_frames = stats.audio_frames,
                keyframes = stats.keyframes,
                "Publish ended"
            );
        }
        self.handler
            .on_client_disconnected(&self.stream_key, &reason)
            .await;
        match &result {
            Ok(()) => tracing::info!(
                session_id = self.session_id,
                peer = %self.peer_addr,
                "Client disconnected"
            ),
            Err(error) => tracing::warn!(
                session_id = self.session_id,
                peer = %self.peer_addr,
                error = %error,
                "Connection failed"
            ),
        }
        result
    }

    async fn serve(&mut self) -> Result<()> {
        timeout(self.config.handshake_timeout, self.handshake())
            .await
            .map_err(|_| Error::Timeout)??;
        tracing::debug!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            "Handshake complete"
        );

        loop {
            match timeout(self.config.idle_timeout, self.read_unit()).await {
                Ok(Ok(())) => {}
                Ok(Err(Error::ConnectionClosed)) => return Ok(()),
                Ok(Err(error)) => return Err(error),
                Err(_) => return Err(Error::Timeout),
            }
            self.maybe_send_acknowledgement().await?;
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        let mut handshake = Handshake::new(HandshakeRole::Server);
        handshake.generate_initial();

        while !handshake.is_done() {
            let mut data = self.read_exact(handshake.bytes_needed()).await?;
            if let Some(response) = handshake.process(&mut data)? {
                self.writer.write_all(&response).await.map_err(Error::Io)?;
                self.writer.flush().await.map_err(Error::Io)?;
            }
        }
        Ok(())
    }

    /// Reads exactly `size` bytes, buffering whatever the socket delivers.
    async fn read_exact(&mut self, size: usize) -> Result<Bytes> {
        while self.read_buf.len() < size {
            let n = self
                .reader
                .read_buf(&mut self.read_buf)
                .await
                .map_err(Error::Io)?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.total_bytes_received += n as u64;
        }
        Ok(self.read_buf.split_to(size).freeze())
    }

    /// Reads one syntactic unit: a basic header, the message header it
    /// announces, any extended timestamp, and one chunk of payload.
    async fn read_unit(&mut self) -> Result<()> {
        let basic = self.read_exact(1).await?[0];
        let format = basic >> 6;
        let csid = (basic & 0x3F) as u32;
        match csid {
            0 => return Err(ProtocolError::UnsupportedBasicHeader(2).into()),
            1 => return Err(ProtocolError::UnsupportedBasicHeader(3).into()),
            _ => {}
        }

        match format {
            CHUNK_FMT_0 => {
                let header = self.read_exact(11).await?;
                let timestamp = u32::from(header[0]) << 16
                    | u32::from(header[1]) << 8
                    | u32::from(header[2]);
                let length = (u32::from(header[3]) << 16
                    | u32::from(header[4]) << 8
                    | u32::from(header[5])) as usize;
                let type_id = header[6];
                let stream_id = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
                self.stream_mut(csid)
                    .set_type0_header(timestamp, length, type_id, stream_id);
            }
            CHUNK_FMT_1 => {
                let header = self.read_exact(7).await?;
                let delta = u32::from(header[0]) << 16
                    | u32::from(header[1]) << 8
                    | u32::from(header[2]);
                let length = (u32::from(header[3]) << 16
                    | u32::from(header[4]) << 8
                    | u32::from(header[5])) as usize;
                let type_id = header[6];
                self.stream_mut(csid).set_type1_header(delta, length, type_id);
            }
            CHUNK_FMT_2 => {
                let header = self.read_exact(3).await?;
                let delta = u32::from(header[0]) << 16
                    | u32::from(header[1]) << 8
                    | u32::from(header[2]);
                self.stream_mut(csid).set_type2_header(delta);
            }
            _ => {}
        }

        let needs_extension = match format {
            CHUNK_FMT_3 => self.stream_mut(csid).extended_timestamp_in_type3(),
            _ => self.stream_mut(csid).timestamp_needs_extension(),
        };
        if needs_extension {
            let data = self.read_exact(4).await?;
            let extended = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            self.stream_mut(csid).set_extended_timestamp(extended);
        }

        let chunk_size = self.chunk_size_from_client;
        let size = self.stream_mut(csid).chunk_data_size(chunk_size);
        if size == 0 {
            return Err(ProtocolError::UnexpectedMessage("zero length message".into()).into());
        }
        let piece = self.read_exact(size).await?;
        if let Some(message) = self.stream_mut(csid).append_body(&piece) {
            self.dispatch(csid, message).await?;
        }
        Ok(())
    }

    fn stream_mut(&mut self, csid: u32) -> &mut RtmpServerChunkStream {
        self.chunk_streams
            .entry(csid)
            .or_insert_with(|| RtmpServerChunkStream::new(csid))
    }

    async fn dispatch(&mut self, csid: u32, message: CompletedMessage) -> Result<()> {
        match message.type_id {
            MSG_AUDIO => self.process_audio(csid, message.body).await,
            MSG_VIDEO => self.process_video(csid, message.body).await,
            _ => {
                let chunk =
                    RtmpChunk::new(csid, 0, message.type_id, message.stream_id, &message.body);
                let message = RtmpMessage::from_chunk(chunk)?;
                self.handle_message(message).await
            }
        }
    }

    async fn process_audio(&mut self, csid: u32, body: Bytes) -> Result<()> {
        let bytes = body.len() as u64;
        let (buffer, timestamp) = {
            let stream = self.stream_mut(csid);
            let buffer = stream.process_audio(body)?;
            (buffer, stream.audio_timestamp())
        };
        if let Some(stats) = &mut self.stats {
            stats.bytes_received += bytes;
            stats.last_audio_timestamp = timestamp as u32;
        }

        let Some(buffer) = buffer else {
            return Ok(());
        };
        if let Some(stats) = &mut self.stats {
            stats.audio_frames += 1;
        }
        self.target_latencies
            .set_latest_audio_presentation_time_stamp(buffer.presentation_time_stamp.seconds());
        self.report_target_latencies().await;
        self.handler.on_audio_buffer(&self.stream_key, buffer).await;
        Ok(())
    }

    async fn process_video(&mut self, csid: u32, body: Bytes) -> Result<()> {
        let bytes = body.len() as u64;
        let (buffer, timestamp) = {
            let stream = self.stream_mut(csid);
            let buffer = stream.process_video(body)?;
            (buffer, stream.video_timestamp())
        };
        if let Some(stats) = &mut self.stats {
            stats.bytes_received += bytes;
            stats.last_video_timestamp = timestamp as u32;
        }

        let Some(buffer) = buffer else {
            return Ok(());
        };
        if let Some(stats) = &mut self.stats {
            stats.video_frames += 1;
            if buffer.sync {
                stats.keyframes += 1;
            }
        }
        self.target_latencies
            .set_latest_video_presentation_time_stamp(buffer.presentation_time_stamp.seconds());
        self.report_target_latencies().await;
        self.handler.on_video_buffer(&self.stream_key, buffer).await;
        Ok(())
    }

    async fn report_target_latencies(&mut self) {
        if let Some((audio_target_latency, video_target_latency)) = self.target_latencies.update() {
            self.handler
                .set_target_latencies(&self.stream_key, video_target_latency, audio_target_latency)
                .await;
        }
    }

    async fn handle_message(&mut self, message: RtmpMessage) -> Result<()> {
        match message {
            RtmpMessage::SetChunkSize(size) => {
                if size == 0 || size > MAX_MESSAGE_SIZE {
                    return Err(
                        ProtocolError::UnexpectedMessage(format!("bad chunk size {size}")).into(),
                    );
                }
                tracing::debug!(session_id = self.session_id, size, "Client chunk size updated");
                self.chunk_size_from_client = size;
                Ok(())
            }
            RtmpMessage::Abort { csid } => {
                if let Some(stream) = self.chunk_streams.get_mut(&csid) {
                    stream.discard_partial_body();
                }
                Ok(())
            }
            RtmpMessage::Acknowledgement { sequence } => {
                tracing::trace!(session_id = self.session_id, sequence, "Acknowledgement");
                Ok(())
            }
            RtmpMessage::WindowAckSize(size) => {
                self.window_ack_size = size;
                Ok(())
            }
            RtmpMessage::SetPeerBandwidth { .. } => Ok(()),
            RtmpMessage::UserControl(event) => self.handle_user_control(event).await,
            RtmpMessage::Command(command) => self.handle_command(command).await,
            RtmpMessage::Data(data) => self.handle_data(data),
            RtmpMessage::Audio { .. } | RtmpMessage::Video { .. } => Ok(()),
            RtmpMessage::Unknown { type_id, .. } => {
                tracing::trace!(session_id = self.session_id, type_id, "Message ignored");
                Ok(())
            }
        }
    }

    async fn handle_user_control(&mut self, event: UserControlEvent) -> Result<()> {
        match event {
            UserControlEvent::PingRequest(timestamp) => {
                self.send_message(
                    RtmpMessage::UserControl(UserControlEvent::PingResponse(timestamp)),
                    CSID_PROTOCOL_CONTROL,
                    0,
                )
                .await
            }
            other => {
                tracing::trace!(session_id = self.session_id, event = ?other, "User control ignored");
                Ok(())
            }
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        tracing::debug!(
            session_id = self.session_id,
            command = %command.name,
            transaction_id = command.transaction_id,
            "Command received"
        );
        match command.name.as_str() {
            CMD_CONNECT => self.handle_connect(command).await,
            CMD_CREATE_STREAM => self.handle_create_stream(command).await,
            CMD_PUBLISH => self.handle_publish(command).await,
            CMD_PLAY => self.handle_play(command).await,
            // Accepted without a response.
            CMD_RELEASE_STREAM | CMD_FC_PUBLISH | CMD_FC_UNPUBLISH | CMD_DELETE_STREAM => Ok(()),
            CMD_CLOSE => Err(Error::ConnectionClosed),
            _ => {
                tracing::trace!(command = %command.name, "Unhandled command");
                Ok(())
            }
        }
    }

    async fn handle_connect(&mut self, command: Command) -> Result<()> {
        let params = ConnectParams::from_amf(&command.command_object);
        self.app = params.app.clone();
        tracing::info!(
            session_id = self.session_id,
            app = %params.app,
            flash_ver = params.flash_ver.as_deref().unwrap_or(""),
            "Connect"
        );

        self.send_message(
            RtmpMessage::WindowAckSize(self.config.window_ack_size),
            CSID_PROTOCOL_CONTROL,
            0,
        )
        .await?;
        self.send_message(
            RtmpMessage::SetPeerBandwidth {
                size: self.config.peer_bandwidth,
                limit_type: BANDWIDTH_LIMIT_DYNAMIC,
            },
            CSID_PROTOCOL_CONTROL,
            0,
        )
        .await?;
        self.send_message(
            RtmpMessage::SetChunkSize(self.config.chunk_size),
            CSID_PROTOCOL_CONTROL,
            0,
        )
        .await?;
        self.chunk_size_to_client = self.config.chunk_size;

        let properties = AmfValue::object([
            ("fmsVer", AmfValue::from("FMS/3,5,7,7009")),
            ("capabilities", AmfValue::from(31.0)),
            ("mode", AmfValue::from(1.0)),
        ]);
        let information = AmfValue::object([
            ("level", AmfValue::from("status")),
            ("code", AmfValue::from(NC_CONNECT_SUCCESS)),
            ("description", AmfValue::from("Connection succeeded.")),
            ("objectEncoding", AmfValue::from(0.0)),
        ]);
        self.send_command(Command::result(command.transaction_id, properties, information))
            .await
    }

    async fn handle_create_stream(&mut self, command: Command) -> Result<()> {
        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        tracing::debug!(session_id = self.session_id, stream_id, "Stream created");
        self.send_command(Command::result(
            command.transaction_id,
            AmfValue::Null,
            AmfValue::from(stream_id as f64),
        ))
        .await
    }

    async fn handle_publish(&mut self, command: Command) -> Result<()> {
        let params = PublishParams::from_command(&command)?;
        if !self.stream_key.is_empty() {
            self.send_command(Command::on_status(
                command.stream_id,
                "error",
                NS_PUBLISH_BAD_NAME,
                "Connection already publishing",
            ))
            .await?;
            return Err(Error::Rejected("duplicate publish".into()));
        }
        self.stream_key = params.stream_key.clone();
        self.stats = Some(StreamStats::new(params.stream_key.clone()));

        self.send_message(
            RtmpMessage::UserControl(UserControlEvent::StreamBegin(command.stream_id)),
            CSID_PROTOCOL_CONTROL,
            0,
        )
        .await?;
        self.send_command(Command::on_status(
            command.stream_id,
            "status",
            NS_PUBLISH_START,
            &format!("{} is now published.", params.stream_key),
        ))
        .await?;

        tracing::info!(
            session_id = self.session_id,
            stream_key = %params.stream_key,
            publish_type = %params.publish_type,
            "Publish started"
        );
        self.handler.on_publish_start(&self.stream_key).await;
        Ok(())
    }

    /// Playback is not served, this is an ingest endpoint.
    async fn handle_play(&mut self, command: Command) -> Result<()> {
        tracing::debug!(session_id = self.session_id, "Play rejected");
        self.send_command(Command::on_status(
            command.stream_id,
            "error",
            NS_PLAY_FAILED,
            "Stream is publish only",
        ))
        .await
    }

    fn handle_data(&mut self, data: DataMessage) -> Result<()> {
        match data.name.as_str() {
            CMD_SET_DATA_FRAME | CMD_ON_METADATA => {
                if let Some(metadata) = data.metadata() {
                    if let Some(stats) = &mut self.stats {
                        stats.apply_metadata(metadata);
                        tracing::debug!(
                            session_id = self.session_id,
                            width = stats.width,
                            height = stats.height,
                            framerate = stats.framerate,
                            "Metadata applied"
                        );
                    }
                }
                Ok(())
            }
            _ => {
                tracing::trace!(name = %data.name, "Data message ignored");
                Ok(())
            }
        }
    }

    async fn maybe_send_acknowledgement(&mut self) -> Result<()> {
        if self.total_bytes_received - self.total_bytes_acked <= u64::from(self.window_ack_size) {
            return Ok(());
        }
        let sequence = (self.total_bytes_received & 0xFFFF_FFFF) as u32;
        self.send_message(
            RtmpMessage::Acknowledgement { sequence },
            CSID_PROTOCOL_CONTROL,
            0,
        )
        .await?;
        self.total_bytes_acked = self.total_bytes_received;
        tracing::trace!(session_id = self.session_id, sequence, "Acknowledgement sent");
        Ok(())
    }

    async fn send_command(&mut self, command: Command) -> Result<()> {
        let stream_id = command.stream_id;
        self.send_message(RtmpMessage::Command(command), CSID_COMMAND, stream_id)
            .await
    }

    async fn send_message(
        &mut self,
        message: RtmpMessage,
        csid: u32,
        stream_id: u32,
    ) -> Result<()> {
        let chunk = message.to_chunk(csid, 0, stream_id);
        for piece in chunk.split(self.chunk_size_to_client as usize) {
            self.writer.write_all(&piece).await.map_err(Error::Io)?;
        }
        self.writer.flush().await.map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder};
    use std::sync::Mutex as StdMutex;
    use tokio::io::{duplex, DuplexStream};

    use crate::media::{AudioSampleBuffer, VideoSampleBuffer};

    #[derive(Default)]
    struct RecordingHandler {
        publishes: StdMutex<Vec<String>>,
        audio: StdMutex<Vec<AudioSampleBuffer>>,
        video: StdMutex<Vec<VideoSampleBuffer>>,
        latencies: StdMutex<Vec<(f64, f64)>>,
        disconnects: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl RtmpServerHandler for RecordingHandler {
        async fn on_publish_start(&self, stream_key: &str) {
            self.publishes.lock().unwrap().push(stream_key.to_string());
        }

        async fn on_video_buffer(&self, _stream_key: &str, sample_buffer: VideoSampleBuffer) {
            self.video.lock().unwrap().push(sample_buffer);
        }

        async fn on_audio_buffer(&self, _stream_key: &str, sample_buffer: AudioSampleBuffer) {
            self.audio.lock().unwrap().push(sample_buffer);
        }

        async fn set_target_latencies(
            &self,
            _stream_key: &str,
            video_target_latency: f64,
            audio_target_latency: f64,
        ) {
            self.latencies
                .lock()
                .unwrap()
                .push((video_target_latency, audio_target_latency));
        }

        async fn on_client_disconnected(&self, stream_key: &str, reason: &str) {
            self.disconnects
                .lock()
                .unwrap()
                .push((stream_key.to_string(), reason.to_string()));
        }
    }

    fn spawn_server(
        handler: Arc<RecordingHandler>,
        config: ServerConfig,
    ) -> (DuplexStream, tokio::task::JoinHandle<Result<()>>) {
        let (near, far) = duplex(256 * 1024);
        let client = RtmpServerClient::new(far, "127.0.0.1:9".parse().unwrap(), 1, config, handler);
        (near, tokio::spawn(client.run()))
    }

    async fn raw_handshake(io: &mut DuplexStream) {
        let mut handshake = Handshake::new(HandshakeRole::Client);
        let c0c1 = handshake.generate_initial().unwrap();
        io.write_all(&c0c1).await.unwrap();

        let mut response = vec![0u8; 1 + 2 * HANDSHAKE_SIZE];
        io.read_exact(&mut response).await.unwrap();
        let mut buf = Bytes::copy_from_slice(&response);
        let c2 = handshake.process(&mut buf).unwrap().unwrap();
        io.write_all(&c2).await.unwrap();
        assert!(handshake.is_done());
    }

    /// Drives the publisher side of the wire with the shared codec.
    struct TestPublisher {
        io: DuplexStream,
        read_buf: BytesMut,
        decoder: ChunkDecoder,
        encoder: ChunkEncoder,
    }

    impl TestPublisher {
        async fn handshake(io: DuplexStream) -> Self {
            let mut publisher = TestPublisher {
                io,
                read_buf: BytesMut::new(),
                decoder: ChunkDecoder::new(),
                encoder: ChunkEncoder::new(),
            };
            raw_handshake(&mut publisher.io).await;
            publisher
        }

        async fn send(&mut self, message: RtmpMessage, csid: u32, timestamp: u32, stream_id: u32) {
            let chunk = message.to_chunk(csid, timestamp, stream_id);
            let mut buf = BytesMut::new();
            self.encoder.encode(&chunk, &mut buf);
            self.io.write_all(&buf).await.unwrap();
        }

        async fn send_command(&mut self, command: Command) {
            let stream_id = command.stream_id;
            self.send(RtmpMessage::Command(command), CSID_COMMAND, 0, stream_id)
                .await;
        }

        async fn read_message(&mut self) -> RtmpMessage {
            loop {
                if let Some(chunk) = self.decoder.decode(&mut self.read_buf).unwrap() {
                    let message = RtmpMessage::from_chunk(chunk).unwrap();
                    if let RtmpMessage::SetChunkSize(size) = &message {
                        self.decoder.set_chunk_size(*size);
                    }
                    return message;
                }
                let n = self.io.read_buf(&mut self.read_buf).await.unwrap();
                assert!(n > 0, "server closed unexpectedly");
            }
        }

        /// Runs the connect exchange, asserting the control preamble.
        async fn connect(&mut self, app: &str) {
            self.send_command(Command::new(
                CMD_CONNECT,
                1.0,
                AmfValue::object([("app", AmfValue::from(app))]),
            ))
            .await;

            let mut saw_window_ack = false;
            let mut saw_peer_bandwidth = false;
            let mut saw_chunk_size = false;
            loop {
                match self.read_message().await {
                    RtmpMessage::WindowAckSize(size) => {
                        assert_eq!(size, DEFAULT_WINDOW_ACK_SIZE);
                        saw_window_ack = true;
                    }
                    RtmpMessage::SetPeerBandwidth { size, limit_type } => {
                        assert_eq!(size, DEFAULT_PEER_BANDWIDTH);
                        assert_eq!(limit_type, BANDWIDTH_LIMIT_DYNAMIC);
                        saw_peer_bandwidth = true;
                    }
                    RtmpMessage::SetChunkSize(size) => {
                        assert_eq!(size, SERVER_CHUNK_SIZE);
                        saw_chunk_size = true;
                    }
                    RtmpMessage::Command(command) => {
                        assert_eq!(command.name, CMD_RESULT);
                        assert_eq!(command.transaction_id, 1.0);
                        assert_eq!(command.code(), Some(NC_CONNECT_SUCCESS));
                        break;
                    }
                    other => panic!("unexpected message {other:?}"),
                }
            }
            assert!(saw_window_ack && saw_peer_bandwidth && saw_chunk_size);
        }
    }

    const AAC_CONFIG: &[u8] = &[0xAF, 0x00, 0x12, 0x10];

    fn aac_frame(len: usize) -> Bytes {
        let mut tag = vec![0xAF, 0x01];
        tag.extend((0..len - 2).map(|i| i as u8));
        Bytes::from(tag)
    }

    fn avc_config_tag() -> Bytes {
        let mut tag = vec![0x17, 0x00, 0x00, 0x00, 0x00];
        tag.extend_from_slice(&[
            0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, 0x01, 0x00,
            0x02, 0x68, 0xEF,
        ]);
        Bytes::from(tag)
    }

    fn avc_keyframe_tag() -> Bytes {
        let mut tag = vec![0x17, 0x01, 0x00, 0x00, 0x00];
        tag.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, 0x65, 0x88, 0x84]);
        Bytes::from(tag)
    }

    #[tokio::test]
    async fn handshake_rejects_wrong_version() {
        let handler = Arc::new(RecordingHandler::default());
        let (mut io, task) = spawn_server(handler.clone(), ServerConfig::default());

        let mut c0c1 = vec![0u8; 1 + HANDSHAKE_SIZE];
        c0c1[0] = 6;
        io.write_all(&c0c1).await.unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Handshake(_))));

        let disconnects = handler.disconnects.lock().unwrap();
        assert_eq!(disconnects.len(), 1);
        assert_eq!(disconnects[0].0, "");
    }

    #[tokio::test]
    async fn multi_byte_basic_headers_are_fatal() {
        for (first_byte, announced_size) in [(0x00u8, 2u8), (0x01, 3)] {
            let handler = Arc::new(RecordingHandler::default());
            let (mut io, task) = spawn_server(handler, ServerConfig::default());

            raw_handshake(&mut io).await;
            io.write_all(&[first_byte]).await.unwrap();

            let result = task.await.unwrap();
            match result {
                Err(Error::Protocol(ProtocolError::UnsupportedBasicHeader(size))) => {
                    assert_eq!(size, announced_size)
                }
                other => panic!("expected basic header error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn connect_create_publish_and_media_flow() {
        let handler = Arc::new(RecordingHandler::default());
        let (io, task) = spawn_server(handler.clone(), ServerConfig::default());

        let mut publisher = TestPublisher::handshake(io).await;
        publisher.connect("live").await;

        publisher
            .send_command(Command::new(CMD_CREATE_STREAM, 2.0, AmfValue::Null))
            .await;
        let reply = publisher.read_message().await;
        let RtmpMessage::Command(reply) = reply else {
            panic!("expected createStream result, got {reply:?}");
        };
        assert_eq!(reply.name, CMD_RESULT);
        assert_eq!(reply.transaction_id, 2.0);
        let stream_id = reply.arguments.first().and_then(|v| v.as_number()).unwrap() as u32;
        assert_eq!(stream_id, 1);

        publisher
            .send_command(
                Command::new(CMD_PUBLISH, 3.0, AmfValue::Null)
                    .with_arguments(vec![AmfValue::from("garden-cam"), AmfValue::from("live")])
                    .with_stream_id(stream_id),
            )
            .await;
        assert_eq!(
            publisher.read_message().await,
            RtmpMessage::UserControl(UserControlEvent::StreamBegin(stream_id))
        );
        let RtmpMessage::Command(status) = publisher.read_message().await else {
            panic!("expected onStatus");
        };
        assert_eq!(status.name, CMD_ON_STATUS);
        assert_eq!(status.code(), Some(NS_PUBLISH_START));
        assert_eq!(handler.publishes.lock().unwrap().as_slice(), ["garden-cam"]);

        // Metadata, then AAC and AVC configuration and frames.
        publisher
            .send(
                RtmpMessage::Data(DataMessage::new(
                    CMD_SET_DATA_FRAME,
                    vec![
                        AmfValue::from(CMD_ON_METADATA),
                        AmfValue::object([
                            ("width", AmfValue::from(1280.0)),
                            ("height", AmfValue::from(720.0)),
                        ]),
                    ],
                    stream_id,
                )),
                CSID_DATA,
                0,
                stream_id,
            )
            .await;

        for (timestamp, data) in [
            (0u32, Bytes::from_static(AAC_CONFIG)),
            (0, aac_frame(32)),
            (20, aac_frame(32)),
        ] {
            publisher
                .send(
                    RtmpMessage::Audio {
                        timestamp,
                        data: data.clone(),
                    },
                    4,
                    timestamp,
                    stream_id,
                )
                .await;
        }
        for (timestamp, data) in [(0u32, avc_config_tag()), (0, avc_keyframe_tag())] {
            publisher
                .send(
                    RtmpMessage::Video {
                        timestamp,
                        data: data.clone(),
                    },
                    6,
                    timestamp,
                    stream_id,
                )
                .await;
        }

        drop(publisher);
        let result = task.await.unwrap();
        assert!(result.is_ok(), "server task failed: {result:?}");

        let audio = handler.audio.lock().unwrap();
        assert_eq!(audio.len(), 2);
        assert_eq!(audio[0].presentation_time_stamp.seconds(), 0.0);
        assert!((audio[1].presentation_time_stamp.seconds() - 0.02).abs() < 1e-9);
        assert_eq!(audio[0].sample_sizes, vec![30]);

        let video = handler.video.lock().unwrap();
        assert_eq!(video.len(), 1);
        assert!(video[0].sync);
        assert_eq!(video[0].presentation_time_stamp.seconds(), 0.0);

        // Audio led by 20 ms when the video buffer arrived.
        let latencies = handler.latencies.lock().unwrap();
        assert!(!latencies.is_empty());
        assert!((latencies[0].0 - 2.02).abs() < 1e-9);
        assert!((latencies[0].1 - 2.0).abs() < 1e-9);

        let disconnects = handler.disconnects.lock().unwrap();
        assert_eq!(disconnects.len(), 1);
        assert_eq!(disconnects[0].0, "garden-cam");
    }

    #[tokio::test]
    async fn play_gets_error_status_and_connection_survives() {
        let handler = Arc::new(RecordingHandler::default());
        let (io, _task) = spawn_server(handler, ServerConfig::default());

        let mut publisher = TestPublisher::handshake(io).await;
        publisher.connect("live").await;

        publisher
            .send_command(
                Command::new(CMD_PLAY, 2.0, AmfValue::Null)
                    .with_arguments(vec![AmfValue::from("garden-cam")])
                    .with_stream_id(1),
            )
            .await;
        let RtmpMessage::Command(status) = publisher.read_message().await else {
            panic!("expected onStatus");
        };
        assert_eq!(status.name, CMD_ON_STATUS);
        assert_eq!(status.code(), Some(NS_PLAY_FAILED));

        // Still serving commands afterwards.
        publisher
            .send_command(Command::new(CMD_CREATE_STREAM, 3.0, AmfValue::Null))
            .await;
        let RtmpMessage::Command(reply) = publisher.read_message().await else {
            panic!("expected createStream result");
        };
        assert_eq!(reply.transaction_id, 3.0);
    }

    #[tokio::test]
    async fn acknowledgement_follows_window_size() {
        let handler = Arc::new(RecordingHandler::default());
        let mut config = ServerConfig::default();
        config.window_ack_size = 1000;
        let (io, _task) = spawn_server(handler, config);

        let mut publisher = TestPublisher::handshake(io).await;
        publisher
            .send(
                RtmpMessage::Audio {
                    timestamp: 0,
                    data: Bytes::from_static(AAC_CONFIG),
                },
                4,
                0,
                1,
            )
            .await;

        // Handshake counts toward the window: C0+C1+C2 plus one 16 byte chunk.
        let message = publisher.read_message().await;
        assert_eq!(
            message,
            RtmpMessage::Acknowledgement {
                sequence: (1 + 2 * HANDSHAKE_SIZE + 16) as u32
            }
        );
    }

    fn audio_wire_bytes() -> Vec<u8> {
        let mut wire = Vec::new();
        let mut c0c1 = vec![0u8; 1 + HANDSHAKE_SIZE];
        c0c1[0] = RTMP_VERSION;
        wire.extend_from_slice(&c0c1);
        wire.extend_from_slice(&[0u8; HANDSHAKE_SIZE]);

        let config = RtmpChunk::new(4, 0, MSG_AUDIO, 1, AAC_CONFIG);
        for piece in config.split(DEFAULT_CHUNK_SIZE as usize) {
            wire.extend_from_slice(&piece);
        }
        // 200 byte messages span two chunks at the default chunk size.
        let frame = aac_frame(200);
        for timestamp in [20u32, 40] {
            let chunk = RtmpChunk::new(4, timestamp, MSG_AUDIO, 1, &frame);
            for piece in chunk.split(DEFAULT_CHUNK_SIZE as usize) {
                wire.extend_from_slice(&piece);
            }
        }
        wire
    }

    async fn ingest_wire(one_byte_at_a_time: bool) -> Vec<AudioSampleBuffer> {
        let handler = Arc::new(RecordingHandler::default());
        let (mut io, task) = spawn_server(handler.clone(), ServerConfig::default());

        let wire = audio_wire_bytes();
        if one_byte_at_a_time {
            for &byte in &wire {
                io.write_all(&[byte]).await.unwrap();
                tokio::task::yield_now().await;
            }
        } else {
            io.write_all(&wire).await.unwrap();
        }
        io.shutdown().await.unwrap();

        let result = task.await.unwrap();
        assert!(result.is_ok(), "server task failed: {result:?}");
        drop(io);

        let audio = handler.audio.lock().unwrap();
        audio.clone()
    }

    #[tokio::test]
    async fn byte_by_byte_feed_matches_single_buffer() {
        let single = ingest_wire(false).await;
        let trickled = ingest_wire(true).await;

        assert_eq!(single.len(), 2);
        assert_eq!(single.len(), trickled.len());
        for (a, b) in single.iter().zip(&trickled) {
            assert_eq!(a.data, b.data);
            assert_eq!(a.sample_sizes, b.sample_sizes);
            assert_eq!(a.presentation_time_stamp, b.presentation_time_stamp);
            assert_eq!(a.duration, b.duration);
        }
        assert_eq!(single[0].presentation_time_stamp.seconds(), 0.0);
        assert!((single[1].presentation_time_stamp.seconds() - 0.02).abs() < 1e-9);
    }
}
