use std::path::PathBuf;

use sheaf_encoding::block::Compression;

use crate::batch::DEFAULT_BATCH_SIZE;

pub const DEFAULT_COMPRESSION_LEVEL: i32 = 1;

/// Immutable writer configuration; build through [`WriterOptionsBuilder`].
#[derive(Clone)]
pub struct WriterOptions {
    /// Records per batch.
    batch_size: u32,
    /// Block algorithm used wherever the pipeline reaches for the generic
    /// codec (payloads, bitmaps, dictionaries).
    compression: Compression,
    compression_level: i32,
    /// When set, every field is written to its own archive under this
    /// directory; the main stream keeps the schema columns and the footer.
    multi_archive_dir: Option<PathBuf>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> WriterOptionsBuilder {
        WriterOptionsBuilder::with_defaults()
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    pub fn multi_archive_dir(&self) -> Option<&PathBuf> {
        self.multi_archive_dir.as_ref()
    }
}

pub struct WriterOptionsBuilder {
    batch_size: u32,
    compression: Compression,
    compression_level: i32,
    multi_archive_dir: Option<PathBuf>,
}

impl WriterOptionsBuilder {
    /// Returns default state of the builder.
    pub fn with_defaults() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            compression: Compression::Zstd,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            multi_archive_dir: None,
        }
    }

    /// Finalizes the configuration and returns the immutable options.
    pub fn build(self) -> WriterOptions {
        assert!(self.batch_size > 0, "batch size must be positive");
        WriterOptions {
            batch_size: self.batch_size,
            compression: self.compression,
            compression_level: self.compression_level,
            multi_archive_dir: self.multi_archive_dir,
        }
    }

    pub fn set_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn set_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn set_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn set_multi_archive_dir(mut self, dir: PathBuf) -> Self {
        self.multi_archive_dir = Some(dir);
        self
    }
}
