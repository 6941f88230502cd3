//! Connection and stream statistics.

use std::time::{Duration, Instant};

use crate::amf::AmfValue;

/// Byte and frame counters for a single connection.
///
/// The connection task feeds the counters as data moves and calls
/// [`sample`](ConnectionStats::sample) once a second to obtain windowed
/// rates alongside the lifetime totals.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    started_at: Instant,
    bytes_received: u64,
    bytes_sent: u64,
    video_frames: u64,
    audio_frames: u64,
    window_started_at: Instant,
    window_bytes_received: u64,
    window_bytes_sent: u64,
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStats {
    pub fn new() -> Self {
        let now = Instant::now();
        ConnectionStats {
            started_at: now,
            bytes_received: 0,
            bytes_sent: 0,
            video_frames: 0,
            audio_frames: 0,
            window_started_at: now,
            window_bytes_received: 0,
            window_bytes_sent: 0,
        }
    }

    pub fn add_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    pub fn add_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    pub fn add_video_frame(&mut self) {
        self.video_frames += 1;
    }

    pub fn add_audio_frame(&mut self) {
        self.audio_frames += 1;
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Closes the current sampling window and returns totals plus the rates
    /// observed since the previous call.
    pub fn sample(&mut self) -> StatsSample {
        let elapsed = self.window_started_at.elapsed().as_secs_f64();
        let received_delta = self.bytes_received - self.window_bytes_received;
        let sent_delta = self.bytes_sent - self.window_bytes_sent;
        let (receive_bitrate, send_bitrate) = if elapsed > 0.0 {
            (
                (received_delta as f64 * 8.0 / elapsed) as u64,
                (sent_delta as f64 * 8.0 / elapsed) as u64,
            )
        } else {
            (0, 0)
        };

        self.window_started_at = Instant::now();
        self.window_bytes_received = self.bytes_received;
        self.window_bytes_sent = self.bytes_sent;

        StatsSample {
            bytes_received: self.bytes_received,
            bytes_sent: self.bytes_sent,
            receive_bitrate,
            send_bitrate,
            video_frames: self.video_frames,
            audio_frames: self.audio_frames,
            uptime: self.started_at.elapsed(),
        }
    }
}

/// A point in time report produced by [`ConnectionStats::sample`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSample {
    /// Lifetime bytes received
    pub bytes_received: u64,
    /// Lifetime bytes sent
    pub bytes_sent: u64,
    /// Receive rate over the last window, bits per second
    pub receive_bitrate: u64,
    /// Send rate over the last window, bits per second
    pub send_bitrate: u64,
    /// Lifetime video frames
    pub video_frames: u64,
    /// Lifetime audio frames
    pub audio_frames: u64,
    /// Time since the connection was established
    pub uptime: Duration,
}

/// Counters and media properties for one published stream.
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Stream key the publisher used
    pub stream_key: String,
    started_at: Instant,
    /// Media bytes received for this stream
    pub bytes_received: u64,
    /// Video frames received
    pub video_frames: u64,
    /// Audio frames received
    pub audio_frames: u64,
    /// Keyframes received
    pub keyframes: u64,
    /// Timestamp of the last video frame, milliseconds
    pub last_video_timestamp: u32,
    /// Timestamp of the last audio frame, milliseconds
    pub last_audio_timestamp: u32,
    /// Video width from stream metadata
    pub width: Option<u32>,
    /// Video height from stream metadata
    pub height: Option<u32>,
    /// Frame rate from stream metadata
    pub framerate: Option<f64>,
    /// Audio sample rate from stream metadata
    pub audio_sample_rate: Option<u32>,
    /// Audio channel count from stream metadata
    pub audio_channels: Option<u8>,
}

impl StreamStats {
    pub fn new(stream_key: String) -> Self {
        StreamStats {
            stream_key,
            started_at: Instant::now(),
            bytes_received: 0,
            video_frames: 0,
            audio_frames: 0,
            keyframes: 0,
            last_video_timestamp: 0,
            last_audio_timestamp: 0,
            width: None,
            height: None,
            framerate: None,
            audio_sample_rate: None,
            audio_channels: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average receive rate over the stream lifetime, bits per second.
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            self.bytes_received * 8 / secs
        } else {
            0
        }
    }

    /// Fills the media properties from an onMetaData object.
    pub fn apply_metadata(&mut self, metadata: &AmfValue) {
        if let Some(width) = metadata.get_number("width") {
            self.width = Some(width as u32);
        }
        if let Some(height) = metadata.get_number("height") {
            self.height = Some(height as u32);
        }
        if let Some(framerate) = metadata.get_number("framerate") {
            self.framerate = Some(framerate);
        }
        if let Some(rate) = metadata.get_number("audiosamplerate") {
            self.audio_sample_rate = Some(rate as u32);
        }
        if let Some(channels) = metadata.get_number("audiochannels") {
            self.audio_channels = Some(channels as u8);
        } else if let Some(stereo) = metadata.get("stereo").and_then(|v| v.as_bool()) {
            self.audio_channels = Some(if stereo { 2 } else { 1 });
        }
    }
}

/// Server wide counters kept by the listener.
#[derive(Debug, Clone)]
pub struct ServerStats {
    started_at: Instant,
    /// Connections accepted since the server started
    pub total_connections: u64,
    /// Currently open connections
    pub active_connections: u64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    pub fn new() -> Self {
        ServerStats {
            started_at: Instant::now(),
            total_connections: 0,
            active_connections: 0,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_stats_counters() {
        let mut stats = ConnectionStats::new();
        stats.add_received(1000);
        stats.add_received(500);
        stats.add_sent(200);
        stats.add_video_frame();
        stats.add_audio_frame();
        stats.add_audio_frame();

        assert_eq!(stats.bytes_received(), 1500);
        assert_eq!(stats.bytes_sent(), 200);

        let sample = stats.sample();
        assert_eq!(sample.bytes_received, 1500);
        assert_eq!(sample.bytes_sent, 200);
        assert_eq!(sample.video_frames, 1);
        assert_eq!(sample.audio_frames, 2);
    }

    #[test]
    fn test_sample_window_resets() {
        let mut stats = ConnectionStats::new();
        stats.add_received(1000);
        let first = stats.sample();
        assert_eq!(first.bytes_received, 1000);

        // No traffic since the last sample, rates drop to zero while the
        // totals stay.
        let second = stats.sample();
        assert_eq!(second.bytes_received, 1000);
        assert_eq!(second.receive_bitrate, 0);
        assert_eq!(second.send_bitrate, 0);
    }

    #[test]
    fn test_stream_stats_bitrate() {
        let mut stats = StreamStats::new("key".to_string());
        stats.bytes_received = 1_000_000;
        // Not enough elapsed time for a whole second yet.
        assert_eq!(stats.bitrate(), 0);
    }

    #[test]
    fn test_stream_stats_metadata() {
        let mut stats = StreamStats::new("key".to_string());
        let metadata = AmfValue::object([
            ("width", AmfValue::from(1920.0)),
            ("height", AmfValue::from(1080.0)),
            ("framerate", AmfValue::from(30.0)),
            ("audiosamplerate", AmfValue::from(48000.0)),
            ("stereo", AmfValue::from(true)),
        ]);
        stats.apply_metadata(&metadata);
        assert_eq!(stats.width, Some(1920));
        assert_eq!(stats.height, Some(1080));
        assert_eq!(stats.framerate, Some(30.0));
        assert_eq!(stats.audio_sample_rate, Some(48000));
        assert_eq!(stats.audio_channels, Some(2));
    }

    #[test]
    fn test_server_stats_counts() {
        let mut stats = ServerStats::new();
        stats.total_connections += 1;
        stats.active_connections += 1;
        stats.total_connections += 1;
        stats.active_connections += 1;
        stats.active_connections -= 1;
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.active_connections, 1);
    }
}
