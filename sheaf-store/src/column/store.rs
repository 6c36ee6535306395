use std::io::Write;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use sheaf_core::buffer::ResizableBuffer;
use sheaf_core::errors::{Error, Result};
use sheaf_core::pool::{default_memory_pool, MemoryPool};
use sheaf_core::util::bit_util;
use sheaf_format::meta::TransformMeta;
use sheaf_format::ptype::{Primitive, PrimitiveType};

use crate::column::dictionary::ColumnDictionary;
use crate::common::checksum::md5_digest;

/// The nullity bitmap grows in fixed chunks of u32 words so appends never
/// reallocate per row.
const NULLITY_CHUNK_WORDS: usize = 16384;

/// One column within one record batch: a typed contiguous payload, a packed
/// validity bitmap, an optional dictionary, and the ordered transform
/// metadata describing how the payload was rewritten.
///
/// A ColumnStore is mutable and is only used while importing; retrieval after
/// a batch is closed goes through the reader.
pub struct ColumnStore {
    ptype: PrimitiveType,
    pub n_records: u32,
    pub n_elements: u32,
    pub n_null: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub(crate) nullity_u: u32,
    pub(crate) nullity_c: u32,
    pub(crate) buffer: ResizableBuffer,
    pub(crate) nullity: Option<ResizableBuffer>,
    /// Bitmap capacity in bits.
    m_nullity: u32,
    pub dictionary: Option<ColumnDictionary>,
    pub transformation_args: Vec<TransformMeta>,
    /// MD5 of the payload before any transform ran.
    pub(crate) payload_md5: [u8; 16],
    pool: Arc<MemoryPool>,
}

impl ColumnStore {
    pub fn new(ptype: PrimitiveType) -> Self {
        Self::with_pool(ptype, default_memory_pool())
    }

    pub fn with_pool(ptype: PrimitiveType, pool: Arc<MemoryPool>) -> Self {
        Self {
            ptype,
            n_records: 0,
            n_elements: 0,
            n_null: 0,
            uncompressed_size: 0,
            compressed_size: 0,
            nullity_u: 0,
            nullity_c: 0,
            buffer: ResizableBuffer::new(Arc::clone(&pool)),
            nullity: None,
            m_nullity: 0,
            dictionary: None,
            transformation_args: Vec::new(),
            payload_md5: [0u8; 16],
            pool,
        }
    }

    pub fn ptype(&self) -> PrimitiveType {
        self.ptype
    }

    pub fn size(&self) -> u32 {
        self.n_records
    }

    pub fn memory_usage(&self) -> u32 {
        let mut total = self.uncompressed_size + self.nullity_u;
        if let Some(dict) = &self.dictionary {
            total += dict.sz_u as u32;
        }
        total
    }

    fn check_type<T: Primitive>(&self) -> Result<()> {
        if T::PTYPE != self.ptype {
            return Err(Error::TypeMismatch(format!(
                "column holds {:?}, not {:?}",
                self.ptype,
                T::PTYPE
            )));
        }
        Ok(())
    }

    /// Append one value: one more logical row and one more element.
    pub fn append<T: Primitive>(&mut self, value: T) -> Result<()> {
        self.check_type::<T>()?;
        self.buffer.append(bytemuck::bytes_of(&value))?;
        self.n_records += 1;
        self.n_elements += 1;
        self.uncompressed_size += std::mem::size_of::<T>() as u32;
        Ok(())
    }

    /// Append one variable-length row: one logical row, many elements. Used
    /// by the data column of tensor sets.
    pub fn append_array<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        self.check_type::<T>()?;
        self.buffer.append(bytemuck::cast_slice(values))?;
        self.n_records += 1;
        self.n_elements += values.len() as u32;
        self.uncompressed_size += (values.len() * std::mem::size_of::<T>()) as u32;
        Ok(())
    }

    /// Record the validity of the row about to be appended. Must run before
    /// the matching data append so the bit lands on the right row; `adjust`
    /// shifts the position down for tensor offset columns, whose entry count
    /// runs one ahead of the row count.
    pub fn append_validity(&mut self, valid: bool, adjust: u32) -> Result<()> {
        if self.nullity.is_none() {
            let mut bitmap = ResizableBuffer::with_capacity(
                Arc::clone(&self.pool),
                NULLITY_CHUNK_WORDS * 4,
            )?;
            bitmap.resize(NULLITY_CHUNK_WORDS * 4)?;
            self.nullity = Some(bitmap);
            self.m_nullity = (NULLITY_CHUNK_WORDS * 32) as u32;
        }

        if self.n_records == self.m_nullity {
            let bitmap = self.nullity.as_mut().unwrap();
            let new_len = bitmap.len() + NULLITY_CHUNK_WORDS * 4;
            bitmap.resize(new_len)?;
            self.m_nullity += (NULLITY_CHUNK_WORDS * 32) as u32;
        }

        self.n_null += u32::from(!valid);
        if valid {
            let row = (self.n_records - adjust) as usize;
            let words = self.nullity.as_mut().unwrap().typed_mut::<u32>();
            words[row / 32] |= 1 << (row % 32);
        }
        Ok(())
    }

    /// Whether row `i` carries a real value. Columns without a bitmap (e.g.
    /// tensor data columns) report every row valid.
    pub fn is_valid(&self, i: u32) -> bool {
        match &self.nullity {
            Some(bitmap) => {
                let words = bitmap.typed::<u32>();
                words[i as usize / 32] & (1 << (i % 32)) != 0
            }
            None => true,
        }
    }

    pub fn has_nullity(&self) -> bool {
        self.nullity.is_some()
    }

    /// Read the scalar at row `i`.
    pub fn get<T: Primitive>(&self, i: u32) -> Result<T> {
        if i >= self.n_records {
            return Err(Error::IndexOutOfBound(i as usize, self.n_records as usize));
        }
        self.check_type::<T>()?;
        if self.uncompressed_size as usize != self.n_elements as usize * std::mem::size_of::<T>() {
            return Err(Error::TypeMismatch(format!(
                "element size {} inconsistent with payload of {} bytes",
                std::mem::size_of::<T>(),
                self.uncompressed_size
            )));
        }
        Ok(self.typed_data::<T>()[i as usize])
    }

    pub fn typed_data<T: Primitive>(&self) -> &[T] {
        self.buffer.typed()
    }

    pub fn typed_data_mut<T: Primitive>(&mut self) -> &mut [T] {
        self.buffer.typed_mut()
    }

    pub fn raw_data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Bitmap bytes covering exactly the rows written so far.
    pub(crate) fn nullity_bytes(&self) -> Option<&[u8]> {
        self.nullity.as_ref().map(|bitmap| {
            let n_bytes = bit_util::nullity_words(self.n_records) as usize * 4;
            &bitmap.as_slice()[..n_bytes.min(bitmap.len())]
        })
    }

    /// Sizes of the nullity section as it will appear on disk. Before any
    /// compression both sizes equal the raw bitmap size.
    fn nullity_disk_sizes(&self) -> (u32, u32) {
        match &self.nullity {
            Some(_) => {
                if self.nullity_c > 0 {
                    (self.nullity_u, self.nullity_c)
                } else {
                    let raw = bit_util::nullity_words(self.n_records) * 4;
                    (raw, raw)
                }
            }
            None => (0, 0),
        }
    }

    /// Payload bytes as they go to disk: the transformed payload when any
    /// transform ran, the raw payload otherwise.
    fn disk_payload(&self) -> &[u8] {
        let n = if self.transformation_args.is_empty() {
            self.uncompressed_size as usize
        } else {
            self.compressed_size as usize
        };
        &self.buffer.as_slice()[..n]
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        let has_dictionary = u8::from(self.dictionary.is_some());
        let (nullity_u, nullity_c) = self.nullity_disk_sizes();

        w.write_u8(has_dictionary)?;
        w.write_u32::<LittleEndian>(self.n_records)?;
        w.write_u32::<LittleEndian>(self.n_elements)?;
        w.write_u32::<LittleEndian>(self.n_null)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(nullity_u)?;
        w.write_u32::<LittleEndian>(nullity_c)?;

        if let Some(bitmap) = &self.nullity {
            w.write_all(&bitmap.as_slice()[..nullity_c as usize])?;
        }

        // The flag is repeated so a reader can re-frame after the variable
        // nullity section.
        w.write_u8(has_dictionary)?;
        if let Some(dict) = &self.dictionary {
            dict.serialize(w)?;
        }

        w.write_u32::<LittleEndian>(self.transformation_args.len() as u32)?;
        for meta in &self.transformation_args {
            meta.serialize(w)?;
        }

        if self.transformation_args.is_empty() {
            w.write_all(&md5_digest(self.disk_payload()))?;
        } else {
            w.write_all(&self.payload_md5)?;
        }
        w.write_all(self.disk_payload())?;
        Ok(())
    }
}

impl std::fmt::Debug for ColumnStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnStore")
            .field("ptype", &self.ptype)
            .field("n_records", &self.n_records)
            .field("n_elements", &self.n_elements)
            .field("n_null", &self.n_null)
            .field("uncompressed_size", &self.uncompressed_size)
            .field("compressed_size", &self.compressed_size)
            .field("transforms", &self.transformation_args.len())
            .finish()
    }
}
