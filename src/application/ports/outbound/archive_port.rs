//! Archive codec port - converts between bundle bytes and archive entries

use anyhow::Result;

use crate::domain::entities::BundleArchive;

/// Container format used to move a bundle as a single byte stream
pub trait ArchiveCodecPort: Send + Sync {
    /// Pack every entry into one byte stream
    fn encode(&self, archive: &BundleArchive) -> Result<Vec<u8>>;

    /// Unpack a byte stream, keeping entry order
    fn decode(&self, bytes: &[u8]) -> Result<BundleArchive>;
}
