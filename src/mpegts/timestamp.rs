//! PES timestamp and program-clock-reference codecs
//!
//! PTS/DTS are 33-bit values at 90 kHz, wire-coded into 5 bytes as
//! `[4-bit prefix][3 bits][marker][15 bits][marker][15 bits][marker]`.
//! The PCR adds a 9-bit extension counting 27 MHz ticks.

/// 33-bit PES timestamp codec
pub struct TsTimestamp;

impl TsTimestamp {
    /// Timestamp resolution in Hz
    pub const RESOLUTION: u32 = 90_000;

    /// Prefix nibble for a lone PTS
    pub const PTS_ONLY: u8 = 0x20;
    /// Prefix nibble for the PTS of a PTS+DTS pair
    pub const PTS_OF_PAIR: u8 = 0x30;
    /// Prefix nibble for the DTS of a PTS+DTS pair
    pub const DTS: u8 = 0x10;

    const MASK: u64 = 0x1_FFFF_FFFF;

    /// Encode a 33-bit timestamp. `prefix` supplies the high nibble
    /// (`0x20`/`0x30`/`0x10`); values beyond 33 bits wrap.
    pub fn encode(value: u64, prefix: u8) -> [u8; 5] {
        let ts = value & Self::MASK;
        [
            prefix | (((ts >> 30) & 0x07) as u8) << 1 | 0x01,
            ((ts >> 22) & 0xFF) as u8,
            (((ts >> 15) & 0x7F) as u8) << 1 | 0x01,
            ((ts >> 7) & 0xFF) as u8,
            ((ts & 0x7F) as u8) << 1 | 0x01,
        ]
    }

    /// Decode the 33-bit value, ignoring prefix and marker bits
    pub fn decode(bytes: &[u8; 5]) -> u64 {
        (((bytes[0] >> 1) & 0x07) as u64) << 30
            | (bytes[1] as u64) << 22
            | (((bytes[2] >> 1) & 0x7F) as u64) << 15
            | (bytes[3] as u64) << 7
            | ((bytes[4] >> 1) & 0x7F) as u64
    }
}

/// 6-byte PCR field: 33-bit base at 90 kHz, 6 reserved bits, 9-bit
/// extension at 27 MHz
pub struct ProgramClockReference;

impl ProgramClockReference {
    pub fn encode(base: u64, extension: u16) -> [u8; 6] {
        let base = base & TsTimestamp::MASK;
        let ext = extension & 0x1FF;
        [
            (base >> 25) as u8,
            (base >> 17) as u8,
            (base >> 9) as u8,
            (base >> 1) as u8,
            ((base & 0x01) as u8) << 7 | 0x7E | (ext >> 8) as u8,
            (ext & 0xFF) as u8,
        ]
    }

    pub fn decode(bytes: &[u8; 6]) -> (u64, u16) {
        let base = (bytes[0] as u64) << 25
            | (bytes[1] as u64) << 17
            | (bytes[2] as u64) << 9
            | (bytes[3] as u64) << 1
            | (bytes[4] >> 7) as u64;
        let ext = ((bytes[4] & 0x01) as u16) << 8 | bytes[5] as u16;
        (base, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip() {
        for &ts in &[
            0u64,
            1,
            90_000,
            0x7FFF,
            0x8000,
            0x3FFF_FFFF,
            0x4000_0000,
            0x1_FFFF_FFFF,
        ] {
            let encoded = TsTimestamp::encode(ts, TsTimestamp::PTS_ONLY);
            assert_eq!(TsTimestamp::decode(&encoded), ts, "ts {:#x}", ts);
        }
    }

    #[test]
    fn test_timestamp_marker_bits() {
        let encoded = TsTimestamp::encode(0, TsTimestamp::PTS_OF_PAIR);
        assert_eq!(encoded[0] & 0xF0, 0x30);
        assert_eq!(encoded[0] & 0x01, 0x01);
        assert_eq!(encoded[2] & 0x01, 0x01);
        assert_eq!(encoded[4] & 0x01, 0x01);
    }

    #[test]
    fn test_timestamp_wraps_at_33_bits() {
        let encoded = TsTimestamp::encode(0x2_0000_0001, TsTimestamp::DTS);
        assert_eq!(TsTimestamp::decode(&encoded), 1);
    }

    #[test]
    fn test_pcr_roundtrip() {
        for &(base, ext) in &[(0u64, 0u16), (90_000, 0), (0x1_FFFF_FFFF, 299), (12345, 511)] {
            let encoded = ProgramClockReference::encode(base, ext);
            assert_eq!(ProgramClockReference::decode(&encoded), (base, ext));
        }
    }

    #[test]
    fn test_pcr_reserved_bits() {
        let encoded = ProgramClockReference::encode(0, 0);
        assert_eq!(encoded[4] & 0x7E, 0x7E);
    }
}
