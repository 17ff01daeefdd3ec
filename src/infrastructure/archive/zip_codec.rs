//! Zip container for adventure bundles

use std::io::{Cursor, Read, Write};

use anyhow::{anyhow, bail, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::application::ports::outbound::ArchiveCodecPort;
use crate::domain::entities::BundleArchive;

/// Unpacked size accepted when no limit is configured
const DEFAULT_MAX_UNPACKED_BYTES: u64 = 1024 * 1024 * 1024;

/// Deflate-compressed zip, entries written in archive order
#[derive(Debug, Clone, Copy)]
pub struct ZipArchiveCodec {
    /// Budget for the decompressed size of all entries of one archive
    max_unpacked_bytes: u64,
}

impl ZipArchiveCodec {
    pub fn new(max_unpacked_bytes: u64) -> Self {
        Self { max_unpacked_bytes }
    }
}

impl Default for ZipArchiveCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNPACKED_BYTES)
    }
}

impl ArchiveCodecPort for ZipArchiveCodec {
    fn encode(&self, archive: &BundleArchive) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

            for (path, bytes) in archive.iter() {
                writer
                    .start_file(path, options)
                    .map_err(|e| anyhow!("Failed to start archive entry {}: {}", path, e))?;
                writer
                    .write_all(bytes)
                    .map_err(|e| anyhow!("Failed to write {}: {}", path, e))?;
            }

            writer
                .finish()
                .map_err(|e| anyhow!("Failed to finalize archive: {}", e))?;
        }
        Ok(cursor.into_inner())
    }

    fn decode(&self, bytes: &[u8]) -> Result<BundleArchive> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| anyhow!("Failed to read archive: {}", e))?;
        let mut archive = BundleArchive::new();
        let mut remaining = self.max_unpacked_bytes;

        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| anyhow!("Failed to read archive entry: {}", e))?;
            if entry.is_dir() {
                continue;
            }
            let path = normalize_entry_name(entry.name())?;
            // Declared sizes are untrusted, the read itself is bounded
            let declared = entry.size().min(remaining).min(PREALLOCATE_CAP);
            let mut contents = Vec::with_capacity(declared as usize);
            (&mut entry)
                .take(remaining.saturating_add(1))
                .read_to_end(&mut contents)
                .map_err(|e| anyhow!("Failed to read {}: {}", path, e))?;
            let unpacked = contents.len() as u64;
            if unpacked > remaining {
                bail!(
                    "Archive unpacks past the {} byte limit at {}",
                    self.max_unpacked_bytes,
                    path
                );
            }
            remaining -= unpacked;
            archive.insert(path, contents);
        }
        Ok(archive)
    }
}

const PREALLOCATE_CAP: u64 = 16 * 1024 * 1024;

/// Forward slashes only, no absolute or parent-relative paths
fn normalize_entry_name(name: &str) -> Result<String> {
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') || normalized.split('/').any(|segment| segment == "..") {
        bail!("Archive entry escapes the bundle: {}", name);
    }
    Ok(normalized)
}
