//! CRC-32/MPEG-2
//!
//! Table-driven CRC used by the PAT/PMT section builders. Polynomial
//! 0x04C11DB7, initial value 0xFFFFFFFF, MSB-first, no final xor.

/// CRC-32 calculator over a fixed polynomial table
pub struct Crc32 {
    table: [u32; 256],
}

const MPEG2_POLY: u32 = 0x04C1_1DB7;

const fn build_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = (crc << 1) ^ (if crc & 0x8000_0000 != 0 { poly } else { 0 });
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

impl Crc32 {
    /// The MPEG-2 variant used by transport-stream program tables
    pub const MPEG2: Crc32 = Crc32 {
        table: build_table(MPEG2_POLY),
    };

    /// Compute the CRC over `bytes`
    pub fn calculate(&self, bytes: &[u8]) -> u32 {
        let mut crc: u32 = 0xFFFF_FFFF;
        for &b in bytes {
            crc = (crc << 8) ^ self.table[(((crc >> 24) ^ b as u32) & 0xFF) as usize];
        }
        crc
    }
}
