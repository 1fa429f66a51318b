//! CRC-64-ISO checksum utilities for persisted artifact footers.

use crc::{Crc, CRC_64_GO_ISO};

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Incremental CRC-64 digest, fed a chunk at a time as a file streams out.
pub struct Digest {
    digest: crc::Digest<'static, u64>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}
