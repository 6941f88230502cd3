//! Publishing stream on top of a client connection.
//!
//! A stream wraps the message stream id handed out by createStream and
//! routes media and metadata messages onto it. Publish status arrives on
//! the connection's event receiver as onStatus commands.

use bytes::Bytes;

use crate::amf::AmfValue;
use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::{Command, DataMessage, RtmpMessage};

use super::connection::RtmpConnection;

pub struct RtmpStream {
    connection: RtmpConnection,
    id: u32,
    stream_key: Option<String>,
}

impl RtmpStream {
    /// Asks the server for a message stream and binds to it.
    pub async fn create(connection: &RtmpConnection) -> Result<Self> {
        let id = connection.create_stream().await?;
        tracing::debug!(stream_id = id, "stream created");
        Ok(RtmpStream {
            connection: connection.clone(),
            id,
            stream_key: None,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Starts publishing under `stream_key`.
    ///
    /// Sends the releaseStream and FCPublish shims media servers expect
    /// before the publish command itself. The NetStream.Publish.Start
    /// status is delivered through the event receiver rather than awaited
    /// here, so media can be queued immediately.
    pub async fn publish(&mut self, stream_key: &str) -> Result<()> {
        self.connection
            .notify(CMD_RELEASE_STREAM, vec![AmfValue::from(stream_key)])
            .await?;
        self.connection
            .notify(CMD_FC_PUBLISH, vec![AmfValue::from(stream_key)])
            .await?;
        let command = Command::new(CMD_PUBLISH, 0.0, AmfValue::Null)
            .with_arguments(vec![AmfValue::from(stream_key), AmfValue::from("live")])
            .with_stream_id(self.id);
        self.connection.send_command(command).await?;
        self.stream_key = Some(stream_key.to_string());
        tracing::info!(stream_key = stream_key, stream_id = self.id, "publishing");
        Ok(())
    }

    /// Starts playback of `stream_key`.
    ///
    /// Audio, video and status for the stream arrive through the
    /// connection's event receiver.
    pub async fn play(&self, stream_key: &str) -> Result<()> {
        let command = Command::new(CMD_PLAY, 0.0, AmfValue::Null)
            .with_arguments(vec![AmfValue::from(stream_key)])
            .with_stream_id(self.id);
        self.connection.send_command(command).await?;
        tracing::info!(stream_key = stream_key, stream_id = self.id, "playing");
        Ok(())
    }

    /// Sends one audio message. `data` is the FLV tag body including the
    /// codec header byte.
    pub async fn send_audio(&self, timestamp: u32, data: Bytes) -> Result<()> {
        self.connection
            .send_message(
                RtmpMessage::Audio { timestamp, data },
                CSID_DATA,
                timestamp,
                self.id,
            )
            .await
    }

    /// Sends one video message. `data` is the FLV tag body including the
    /// frame type and codec header bytes.
    pub async fn send_video(&self, timestamp: u32, data: Bytes) -> Result<()> {
        self.connection
            .send_message(
                RtmpMessage::Video { timestamp, data },
                CSID_DATA,
                timestamp,
                self.id,
            )
            .await
    }

    /// Publishes stream metadata as a @setDataFrame data message.
    pub async fn send_metadata(&self, metadata: AmfValue) -> Result<()> {
        let message = RtmpMessage::Data(DataMessage::new(
            CMD_SET_DATA_FRAME,
            vec![AmfValue::from(CMD_ON_METADATA), metadata],
            self.id,
        ));
        self.connection
            .send_message(message, CSID_DATA, 0, self.id)
            .await
    }

    /// Stops publishing and deletes the message stream.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(stream_key) = self.stream_key.take() {
            self.connection
                .notify(CMD_FC_UNPUBLISH, vec![AmfValue::from(stream_key.as_str())])
                .await?;
        }
        let command = Command::new(CMD_DELETE_STREAM, 0.0, AmfValue::Null)
            .with_arguments(vec![AmfValue::from(self.id)]);
        self.connection.send_command(command).await
    }
}
