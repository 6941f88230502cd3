//! Timed sample buffers
//!
//! The reconstruction targets of the PES inverse path. Video buffers
//! carry one access unit as length-prefixed NAL records; audio buffers
//! carry one or more ADTS-framed AAC frames with per-frame sizes.

use bytes::Bytes;

use super::time::MediaTime;

/// One reconstructed video access unit
#[derive(Debug, Clone)]
pub struct VideoSampleBuffer {
    /// Length-prefixed NAL unit records
    pub data: Bytes,
    /// Total sample size in bytes
    pub sample_size: usize,
    pub presentation_time_stamp: MediaTime,
    pub decode_time_stamp: Option<MediaTime>,
    /// None until a previous sample exists
    pub duration: Option<MediaTime>,
    /// Safe decoder entry point (keyframe)
    pub sync: bool,
}

/// Reconstructed audio frames, still ADTS-framed
#[derive(Debug, Clone)]
pub struct AudioSampleBuffer {
    pub data: Bytes,
    /// Byte length of each AAC frame payload, ADTS headers excluded
    pub sample_sizes: Vec<usize>,
    pub presentation_time_stamp: MediaTime,
    pub duration: Option<MediaTime>,
}

/// Per-stream timestamp reconciliation state
///
/// The first received PTS anchors all later units; the previous
/// reconciled PTS supplies durations. One instance per elementary
/// stream, owned by whoever drives the inverse path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceivedTiming {
    pub first_received_pts: Option<MediaTime>,
    pub previous_pts: Option<MediaTime>,
}

impl ReceivedTiming {
    pub fn new() -> Self {
        ReceivedTiming::default()
    }

    /// Map a received PTS/DTS pair onto the caller's timeline.
    ///
    /// The first call anchors: output times collapse to `base` and the
    /// received PTS is remembered. Later calls shift received times by
    /// `base - first_received` and derive the duration from the
    /// previous output PTS.
    pub fn reconcile(
        &mut self,
        base: MediaTime,
        received_pts: MediaTime,
        received_dts: Option<MediaTime>,
    ) -> (MediaTime, Option<MediaTime>, Option<MediaTime>) {
        let (pts, dts, duration) = match self.first_received_pts {
            Some(first) => {
                let offset = base - first;
                let pts = offset + received_pts;
                let dts = received_dts.map(|d| offset + d);
                let duration = self.previous_pts.map(|prev| pts - prev);
                (pts, dts, duration)
            }
            None => {
                self.first_received_pts = Some(received_pts);
                (base, received_dts.map(|_| base), None)
            }
        };
        self.previous_pts = Some(pts);
        (pts, dts, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_unit_anchors() {
        let mut timing = ReceivedTiming::new();
        let base = MediaTime::from_millis(5000);
        let received = MediaTime::from_ticks_90khz(900_000);

        let (pts, dts, duration) = timing.reconcile(base, received, Some(received));
        assert_eq!(pts, base);
        assert_eq!(dts, Some(base));
        assert!(duration.is_none());
        assert_eq!(timing.first_received_pts, Some(received));
    }

    #[test]
    fn test_subsequent_units_shift_and_measure() {
        let mut timing = ReceivedTiming::new();
        let base = MediaTime::from_ticks_90khz(450_000);

        let first = MediaTime::from_ticks_90khz(900_000);
        timing.reconcile(base, first, None);

        // 1/30s later at 90 kHz
        let second = MediaTime::from_ticks_90khz(903_000);
        let (pts, _, duration) = timing.reconcile(base, second, None);
        assert_eq!(pts.value, 453_000);
        assert_eq!(duration.map(|d| d.value), Some(3000));

        let third = MediaTime::from_ticks_90khz(906_000);
        let (pts, _, duration) = timing.reconcile(base, third, None);
        assert_eq!(pts.value, 456_000);
        assert_eq!(duration.map(|d| d.value), Some(3000));
    }

    #[test]
    fn test_dts_presence_follows_input() {
        let mut timing = ReceivedTiming::new();
        let base = MediaTime::ZERO;
        timing.reconcile(base, MediaTime::from_ticks_90khz(100), None);
        let (_, dts, _) = timing.reconcile(base, MediaTime::from_ticks_90khz(200), None);
        assert!(dts.is_none());
    }
}
