//! Thin wrapper over the generic block codecs. The concrete algorithm is a
//! writer choice recorded in transform metadata, so archives stay
//! self-describing.

use sheaf_core::errors::{Error, Result};

pub const DEFAULT_LEVEL: i32 = 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None = 0,
    Zstd = 1,
    Lz4 = 2,
}

impl Compression {
    pub fn from_u8(v: u8) -> Result<Compression> {
        Ok(match v {
            0 => Compression::None,
            1 => Compression::Zstd,
            2 => Compression::Lz4,
            _ => {
                return Err(Error::Corrupt(format!(
                    "unknown block compression algorithm: {}",
                    v
                )))
            }
        })
    }
}

pub fn compress(data: &[u8], compression: Compression, level: i32) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zstd => Ok(zstd::stream::encode_all(data, level)?),
        Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
    }
}

pub fn decompress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zstd => Ok(zstd::stream::decode_all(data)?),
        Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::External(Box::new(e))),
    }
}

/// Decompress straight into a caller-provided buffer, skipping the
/// intermediate allocation. `dst` must be at least the decoded size.
pub fn decompress_into(data: &[u8], dst: &mut [u8], compression: Compression) -> Result<usize> {
    match compression {
        Compression::None => {
            if dst.len() < data.len() {
                return Err(Error::General(format!(
                    "destination too small: {} < {}",
                    dst.len(),
                    data.len()
                )));
            }
            dst[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
        Compression::Zstd => {
            let mut decompressor = zstd::bulk::Decompressor::new()?;
            Ok(decompressor.decompress_to_buffer(data, dst)?)
        }
        Compression::Lz4 => lz4_flex::decompress_into(
            data.get(4..).ok_or_else(|| Error::EOF("lz4 frame truncated".into()))?,
            dst,
        )
        .map_err(|e| Error::External(Box::new(e))),
    }
}
