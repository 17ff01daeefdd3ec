//! Archive adapters - bundle container formats

mod zip_codec;

pub use zip_codec::ZipArchiveCodec;
