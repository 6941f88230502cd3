//! Handler trait for server events.
//!
//! Implement [`RtmpServerHandler`] to receive decoded sample buffers and
//! lifecycle notifications from publishing clients. Every callback carries
//! the stream key the publisher used, so one handler can serve several
//! cameras at once. All methods have empty default implementations.

use async_trait::async_trait;

use crate::media::{AudioSampleBuffer, VideoSampleBuffer};

/// Receives media and lifecycle events from publishing clients.
///
/// Handlers are shared across connections behind an [`Arc`](std::sync::Arc)
/// and must be thread safe. Callbacks run on the connection task, so a slow
/// handler backpressures its own publisher and nobody else.
#[async_trait]
pub trait RtmpServerHandler: Send + Sync + 'static {
    /// A client started publishing under `stream_key`.
    async fn on_publish_start(&self, _stream_key: &str) {}

    /// A reassembled video sample buffer arrived from the publisher.
    async fn on_video_buffer(&self, _stream_key: &str, _sample_buffer: VideoSampleBuffer) {}

    /// A reassembled audio sample buffer arrived from the publisher.
    async fn on_audio_buffer(&self, _stream_key: &str, _sample_buffer: AudioSampleBuffer) {}

    /// The per-track playout latencies for this publisher changed.
    ///
    /// Latencies are in seconds. The leading track keeps the configured
    /// target latency and the other track gets the difference added.
    async fn set_target_latencies(
        &self,
        _stream_key: &str,
        _video_target_latency: f64,
        _audio_target_latency: f64,
    ) {
    }

    /// The client disconnected or was dropped.
    ///
    /// `stream_key` is empty when the client never published.
    async fn on_client_disconnected(&self, _stream_key: &str, _reason: &str) {}
}

/// A handler that logs every event and discards the media.
///
/// Useful as a starting point and for smoke testing a publisher setup.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl RtmpServerHandler for LoggingHandler {
    async fn on_publish_start(&self, stream_key: &str) {
        tracing::info!(stream_key = %stream_key, "Publish started");
    }

    async fn on_video_buffer(&self, stream_key: &str, sample_buffer: VideoSampleBuffer) {
        tracing::trace!(
            stream_key = %stream_key,
            bytes = sample_buffer.data.len(),
            pts = sample_buffer.presentation_time_stamp.seconds(),
            sync = sample_buffer.sync,
            "Video sample buffer"
        );
    }

    async fn on_audio_buffer(&self, stream_key: &str, sample_buffer: AudioSampleBuffer) {
        tracing::trace!(
            stream_key = %stream_key,
            bytes = sample_buffer.data.len(),
            pts = sample_buffer.presentation_time_stamp.seconds(),
            "Audio sample buffer"
        );
    }

    async fn set_target_latencies(
        &self,
        stream_key: &str,
        video_target_latency: f64,
        audio_target_latency: f64,
    ) {
        tracing::debug!(
            stream_key = %stream_key,
            video = video_target_latency,
            audio = audio_target_latency,
            "Target latencies updated"
        );
    }

    async fn on_client_disconnected(&self, stream_key: &str, reason: &str) {
        tracing::info!(stream_key = %stream_key, reason = %reason, "Client disconnected");
    }
}
