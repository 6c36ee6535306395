use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::Bytes;
use itertools::Itertools;
use sheaf_core::errors::{Error, Result};
use sheaf_format::ptype::{Primitive, PrimitiveType, StoreKind};
use sheaf_format::{meta::TransformMeta, MAGIC, POSTSCRIPT_SIZE};

use crate::column::dictionary::ColumnDictionary;
use crate::column::set::ColumnSet;
use crate::column::store::ColumnStore;
use crate::common::checksum::ChecksumType;
use crate::file::footer::FileMetaData;
use crate::transform::reverse;

/// Fixed-size trailer at the end of every archive.
#[derive(Debug, Clone)]
pub struct Postscript {
    pub footer_offset: u64,
    pub checksum_type: ChecksumType,
    pub data_checksum: u64,
    pub major_version: u16,
    pub minor_version: u16,
}

/// Synchronous decode path over a finalized archive: loads the footer, then
/// materializes column sets on demand, reversing and verifying their
/// recorded transform chains. Multiple readers may work on disjoint regions
/// without coordination since the archive is immutable after finalize.
pub struct TableReader<R: Read + Seek> {
    input: R,
    postscript: Postscript,
    meta: FileMetaData,
}

impl<R: Read + Seek> TableReader<R> {
    pub fn open(mut input: R) -> Result<Self> {
        let file_len = input.seek(SeekFrom::End(0))?;
        if (file_len as usize) < POSTSCRIPT_SIZE {
            return Err(Error::EOF(format!(
                "{} bytes is too small for an archive",
                file_len
            )));
        }
        input.seek(SeekFrom::End(-(POSTSCRIPT_SIZE as i64)))?;
        let mut trailer = [0u8; POSTSCRIPT_SIZE];
        input.read_exact(&mut trailer)?;

        let mut buf = Bytes::copy_from_slice(&trailer);
        let footer_offset = buf.split_to(8).as_ref().read_u64::<LittleEndian>()?;
        let checksum_type = ChecksumType::from(buf.split_to(1).as_ref().read_u8()?);
        let data_checksum = buf.split_to(8).as_ref().read_u64::<LittleEndian>()?;
        let major_version = buf.split_to(2).as_ref().read_u16::<LittleEndian>()?;
        let minor_version = buf.split_to(2).as_ref().read_u16::<LittleEndian>()?;
        if buf.as_ref() != MAGIC {
            return Err(Error::Corrupt("bad archive magic".into()));
        }
        if footer_offset >= file_len {
            return Err(Error::Corrupt(format!(
                "footer offset {} beyond file end {}",
                footer_offset, file_len
            )));
        }

        input.seek(SeekFrom::Start(footer_offset))?;
        let meta = FileMetaData::deserialize(&mut input)?;

        Ok(Self {
            input,
            postscript: Postscript {
                footer_offset,
                checksum_type,
                data_checksum,
                major_version,
                minor_version,
            },
            meta,
        })
    }

    pub fn metadata(&self) -> &FileMetaData {
        &self.meta
    }

    pub fn postscript(&self) -> &Postscript {
        &self.postscript
    }

    pub fn num_rows(&self) -> u64 {
        self.meta.n_rows
    }

    pub fn num_batches(&self) -> usize {
        self.meta.batches.len()
    }

    pub fn find_field(&self, name: &str) -> Option<u32> {
        self.meta.find_field(name)
    }

    /// The decoded per-row schema ids of one batch.
    pub fn read_schemas(&mut self, batch_id: u32) -> Result<Vec<u32>> {
        let descriptor = self
            .meta
            .batches
            .get(batch_id as usize)
            .ok_or(Error::IndexOutOfBound(batch_id as usize, self.meta.batches.len()))?;
        let column_meta = descriptor
            .schema_meta
            .column_meta_data
            .first()
            .ok_or_else(|| Error::Corrupt("batch without a schema column".into()))?;
        self.input.seek(SeekFrom::Start(column_meta.file_offset))?;
        let mut store = deserialize_store(&mut self.input, PrimitiveType::UInt32)?;
        reverse::untransform_store(&mut store)?;
        Ok(store.typed_data::<u32>().to_vec())
    }

    /// Materialize one field's column set for one batch, fully decoded.
    pub fn read_field(&mut self, field_id: u32, batch_id: u32) -> Result<ColumnSet> {
        let field_meta = self
            .meta
            .field_meta
            .get(field_id as usize)
            .ok_or(Error::IndexOutOfBound(field_id as usize, self.meta.field_meta.len()))?;
        let cset_meta = field_meta
            .cset_meta
            .iter()
            .find(|m| m.record_batch_id == batch_id)
            .ok_or_else(|| {
                Error::General(format!(
                    "field '{}' has no data in batch {}",
                    field_meta.name, batch_id
                ))
            })?;

        let mut cset = ColumnSet::new(field_meta.kind, field_meta.ptype);
        let mut field_file = if field_meta.file_name.is_empty() {
            None
        } else {
            Some(BufReader::new(File::open(&field_meta.file_name)?))
        };

        for (k, column_meta) in cset_meta.column_meta_data.iter().enumerate() {
            let ptype = match (field_meta.kind, k) {
                (StoreKind::Tensor, 0) => PrimitiveType::UInt32,
                _ => field_meta.ptype,
            };
            let column = match field_file.as_mut() {
                Some(file) => {
                    file.seek(SeekFrom::Start(column_meta.file_offset))?;
                    deserialize_store(file, ptype)?
                }
                None => {
                    self.input.seek(SeekFrom::Start(column_meta.file_offset))?;
                    deserialize_store(&mut self.input, ptype)?
                }
            };
            cset.columns.push(column);
        }

        reverse::untransform_set(&mut cset)?;

        if cset.kind == StoreKind::Tensor {
            let offsets = cset.columns[0].typed_data::<u32>();
            if !offsets.iter().tuple_windows().all(|(a, b)| a <= b) {
                return Err(Error::Corrupt(
                    "tensor offsets are not monotonically non-decreasing".into(),
                ));
            }
        }
        Ok(cset)
    }

    pub fn read_field_by_name(&mut self, name: &str, batch_id: u32) -> Result<ColumnSet> {
        let field_id = self
            .find_field(name)
            .ok_or_else(|| Error::General(format!("unknown field '{}'", name)))?;
        self.read_field(field_id, batch_id)
    }

    /// Segmental elimination: the batches whose recorded min/max for the
    /// field may intersect `[lo, hi]`. Batches without valid statistics
    /// are conservatively included; batches the field never appeared in
    /// are not listed at all.
    pub fn batches_overlapping<T: Primitive>(
        &self,
        field_id: u32,
        lo: T,
        hi: T,
    ) -> Result<Vec<u32>> {
        let field_meta = self
            .meta
            .field_meta
            .get(field_id as usize)
            .ok_or(Error::IndexOutOfBound(field_id as usize, self.meta.field_meta.len()))?;

        let mut batches = Vec::new();
        for cset_meta in &field_meta.cset_meta {
            // In a tensor set the data column (last) carries the field
            // values; fixed-width sets match when any slot overlaps.
            let overlaps = match field_meta.kind {
                StoreKind::Column => cset_meta
                    .column_meta_data
                    .iter()
                    .any(|c| c.overlap(lo, hi)),
                StoreKind::Tensor => cset_meta
                    .column_meta_data
                    .last()
                    .map(|c| c.overlap(lo, hi))
                    .unwrap_or(true),
            };
            if overlaps {
                batches.push(cset_meta.record_batch_id);
            }
        }
        Ok(batches)
    }
}

/// Parse one serialized column store. The element type comes from the field
/// metadata; the wire layout itself is type-blind.
pub(crate) fn deserialize_store<R: Read>(r: &mut R, ptype: PrimitiveType) -> Result<ColumnStore> {
    let has_dictionary = r.read_u8()? != 0;
    let n_records = r.read_u32::<LittleEndian>()?;
    let n_elements = r.read_u32::<LittleEndian>()?;
    let n_null = r.read_u32::<LittleEndian>()?;
    let uncompressed_size = r.read_u32::<LittleEndian>()?;
    let compressed_size = r.read_u32::<LittleEndian>()?;
    let nullity_u = r.read_u32::<LittleEndian>()?;
    let nullity_c = r.read_u32::<LittleEndian>()?;

    for size in [uncompressed_size, compressed_size, nullity_u, nullity_c] {
        if size > 1 << 30 {
            return Err(Error::Corrupt(format!("implausible section size: {}", size)));
        }
    }

    let mut store = ColumnStore::new(ptype);
    store.n_records = n_records;
    store.n_elements = n_elements;
    store.n_null = n_null;
    store.uncompressed_size = uncompressed_size;
    store.compressed_size = compressed_size;
    store.nullity_u = nullity_u;
    store.nullity_c = nullity_c;

    if nullity_c > 0 {
        let mut bitmap = vec![0u8; nullity_c as usize];
        r.read_exact(&mut bitmap)?;
        store.nullity = Some(sheaf_core::buffer::ResizableBuffer::from_slice(&bitmap)?);
    }

    let framing = r.read_u8()? != 0;
    if framing != has_dictionary {
        return Err(Error::Corrupt("dictionary flag framing mismatch".into()));
    }
    if has_dictionary {
        store.dictionary = Some(ColumnDictionary::deserialize(r)?);
    }

    let n_transforms = r.read_u32::<LittleEndian>()?;
    if n_transforms > 64 {
        return Err(Error::Corrupt(format!(
            "implausible transform count: {}",
            n_transforms
        )));
    }
    for _ in 0..n_transforms {
        store.transformation_args.push(TransformMeta::deserialize(r)?);
    }

    let mut md5 = [0u8; 16];
    r.read_exact(&mut md5)?;
    store.payload_md5 = md5;

    let payload_len = if n_transforms > 0 {
        compressed_size
    } else {
        uncompressed_size
    };
    let mut payload = vec![0u8; payload_len as usize];
    r.read_exact(&mut payload)?;
    store.buffer.assign(&payload)?;

    Ok(store)
}
