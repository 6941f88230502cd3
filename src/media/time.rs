//! Rational media timestamps
//!
//! Sample buffers carry presentation/decode times as a value over a
//! timescale so that 90 kHz transport ticks and millisecond RTMP
//! timestamps convert without float drift. An absent time (unknown
//! duration, missing DTS) is `Option<MediaTime>::None`.

use std::ops::{Add, Sub};

use crate::mpegts::TsTimestamp;

/// A timestamp or duration as `value / timescale` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaTime {
    pub value: i64,
    pub timescale: u32,
}

impl MediaTime {
    pub const fn new(value: i64, timescale: u32) -> Self {
        MediaTime { value, timescale }
    }

    /// Zero at 90 kHz
    pub const ZERO: MediaTime = MediaTime::new(0, TsTimestamp::RESOLUTION);

    pub const fn from_ticks_90khz(ticks: i64) -> Self {
        MediaTime::new(ticks, TsTimestamp::RESOLUTION)
    }

    pub const fn from_millis(millis: i64) -> Self {
        MediaTime::new(millis, 1000)
    }

    pub fn seconds(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Rescale to another timescale, rounding toward zero
    pub fn rescaled(&self, timescale: u32) -> MediaTime {
        if self.timescale == timescale {
            return *self;
        }
        let value = self.value as i128 * timescale as i128 / self.timescale as i128;
        MediaTime::new(value as i64, timescale)
    }

    /// The value as 90 kHz transport ticks
    pub fn ticks_90khz(&self) -> i64 {
        self.rescaled(TsTimestamp::RESOLUTION).value
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        let rhs = rhs.rescaled(self.timescale);
        MediaTime::new(self.value + rhs.value, self.timescale)
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        let rhs = rhs.rescaled(self.timescale);
        MediaTime::new(self.value - rhs.value, self.timescale)
    }
}
