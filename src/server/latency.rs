//! Target latency synchronization for ingested audio and video.
//!
//! A publisher's audio and video arrive on independent chunk streams and
//! their presentation timestamps drift apart whenever one side buffers
//! more than the other. [`TargetLatenciesSynchronizer`] watches the latest
//! timestamp seen on each side and computes per-track playout latencies
//! that keep both tracks aligned at the configured overall latency. The
//! track that runs ahead gets extra latency equal to the lead.

/// Derives per-track target latencies from observed presentation timestamps.
///
/// Feed it the presentation timestamp of every delivered sample buffer,
/// then call [`update`](Self::update). It returns a new pair only when
/// both tracks have reported and the computed pair differs from the one
/// reported last, so callers can forward the result without deduplicating.
#[derive(Debug)]
pub struct TargetLatenciesSynchronizer {
    target_latency: f64,
    audio_timestamp: Option<f64>,
    video_timestamp: Option<f64>,
    latest_audio_target_latency: Option<f64>,
    latest_video_target_latency: Option<f64>,
}

impl TargetLatenciesSynchronizer {
    /// Creates a synchronizer aiming for `target_latency` seconds on both tracks.
    pub fn new(target_latency: f64) -> Self {
        TargetLatenciesSynchronizer {
            target_latency,
            audio_timestamp: None,
            video_timestamp: None,
            latest_audio_target_latency: None,
            latest_video_target_latency: None,
        }
    }

    /// Records the presentation timestamp of the latest audio sample, in seconds.
    pub fn set_latest_audio_presentation_time_stamp(&mut self, timestamp: f64) {
        self.audio_timestamp = Some(timestamp);
    }

    /// Records the presentation timestamp of the latest video sample, in seconds.
    pub fn set_latest_video_presentation_time_stamp(&mut self, timestamp: f64) {
        self.video_timestamp = Some(timestamp);
    }

    /// Returns `(audio_target_latency, video_target_latency)` in seconds when
    /// both tracks have reported and the pair changed since the last update.
    pub fn update(&mut self) -> Option<(f64, f64)> {
        let audio_timestamp = self.audio_timestamp?;
        let video_timestamp = self.video_timestamp?;

        let audio_video_diff = audio_timestamp - video_timestamp;
        let audio_target_latency = self.target_latency + (-audio_video_diff).max(0.0);
        let video_target_latency = self.target_latency + audio_video_diff.max(0.0);

        if self.latest_audio_target_latency == Some(audio_target_latency)
            && self.latest_video_target_latency == Some(video_target_latency)
        {
            return None;
        }

        self.latest_audio_target_latency = Some(audio_target_latency);
        self.latest_video_target_latency = Some(video_target_latency);
        Some((audio_target_latency, video_target_latency))
    }
}
