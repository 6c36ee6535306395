use std::fs::File;
use std::io::{BufWriter, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sheaf_core::errors::{Error, Result};
use sheaf_format::dispatch_primitive;
use sheaf_format::ptype::{PrimitiveType, StoreKind};

use crate::column::set::ColumnSet;
use crate::dict::FieldDictionary;
use crate::stats::ColumnStoreMetaData;

/// Index entry for one serialized column set: which batch it belongs to and
/// the per-column descriptions (offsets, sizes, segment statistics).
#[derive(Debug, Default, Clone)]
pub struct ColumnSetMetaData {
    pub record_batch_id: u32,
    pub column_meta_data: Vec<ColumnStoreMetaData>,
}

impl ColumnSetMetaData {
    pub fn new(record_batch_id: u32) -> Self {
        Self {
            record_batch_id,
            column_meta_data: Vec::new(),
        }
    }

    /// Register every store of the set and compute its pre-transform
    /// segment statistics. In a tensor set the offsets column gets u32
    /// statistics of its own; only the data column carries field values.
    pub fn add_column_set(&mut self, cset: &ColumnSet) {
        for column in &cset.columns {
            let mut meta = ColumnStoreMetaData::default();
            meta.set(column);
            dispatch_primitive!(
                column.ptype(),
                |T| meta.compute_segment_stats::<T>(column),
                ()
            );
            self.column_meta_data.push(meta);
        }
    }

    /// Refresh sizes after the transform pipeline rewrote the payloads.
    pub fn update_column_set(&mut self, cset: &ColumnSet) {
        for (i, column) in cset.columns.iter().enumerate() {
            if i == self.column_meta_data.len() {
                self.column_meta_data.push(ColumnStoreMetaData::default());
            }
            self.column_meta_data[i].set(column);
        }
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.record_batch_id)?;
        w.write_u32::<LittleEndian>(self.column_meta_data.len() as u32)?;
        for meta in &self.column_meta_data {
            meta.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let record_batch_id = r.read_u32::<LittleEndian>()?;
        let n = r.read_u32::<LittleEndian>()?;
        let mut column_meta_data = Vec::with_capacity(n as usize);
        for _ in 0..n {
            column_meta_data.push(ColumnStoreMetaData::deserialize(r)?);
        }
        Ok(Self {
            record_batch_id,
            column_meta_data,
        })
    }
}

/// Per-field index: typing plus one [`ColumnSetMetaData`] for every batch
/// the field appears in. In multi-archive mode the field also owns its
/// output file.
pub struct FieldMetaData {
    pub name: String,
    pub ptype: PrimitiveType,
    pub kind: StoreKind,
    /// Path of the per-field archive; empty in single-archive mode.
    pub file_name: String,
    pub cset_meta: Vec<ColumnSetMetaData>,
    pub(crate) writer: Option<BufWriter<File>>,
}

impl FieldMetaData {
    pub fn new(name: String, ptype: PrimitiveType, kind: StoreKind) -> Self {
        Self {
            name,
            ptype,
            kind,
            file_name: String::new(),
            cset_meta: Vec::new(),
            writer: None,
        }
    }

    /// Reserve the index slot for the next batch, returning its offset.
    pub fn add_batch(&mut self, record_batch_id: u32) -> usize {
        self.cset_meta.push(ColumnSetMetaData::new(record_batch_id));
        self.cset_meta.len() - 1
    }

    pub fn total_count(&self) -> usize {
        self.cset_meta.len()
    }

    pub fn total_occurrences(&self) -> u64 {
        self.cset_meta
            .iter()
            .flat_map(|m| m.column_meta_data.iter())
            .map(|c| c.n_records as u64)
            .sum()
    }

    pub fn average_columns(&self) -> f64 {
        if self.cset_meta.is_empty() {
            return 0.0;
        }
        let total: usize = self.cset_meta.iter().map(|m| m.column_meta_data.len()).sum();
        total as f64 / self.cset_meta.len() as f64
    }

    pub fn total_uncompressed(&self) -> u64 {
        self.cset_meta
            .iter()
            .flat_map(|m| m.column_meta_data.iter())
            .map(|c| c.uncompressed_size as u64)
            .sum()
    }

    pub fn total_compressed(&self) -> u64 {
        self.cset_meta
            .iter()
            .flat_map(|m| m.column_meta_data.iter())
            .map(|c| c.compressed_size as u64)
            .sum()
    }

    pub fn average_compression_fold(&self) -> f64 {
        let compressed = self.total_compressed();
        if compressed == 0 {
            return 0.0;
        }
        self.total_uncompressed() as f64 / compressed as f64
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.name.len() as u32)?;
        w.write_all(self.name.as_bytes())?;
        w.write_u8(self.ptype as u8)?;
        w.write_u8(self.kind as u8)?;
        w.write_u32::<LittleEndian>(self.file_name.len() as u32)?;
        w.write_all(self.file_name.as_bytes())?;
        w.write_u32::<LittleEndian>(self.cset_meta.len() as u32)?;
        for meta in &self.cset_meta {
            meta.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let name = read_string(r)?;
        let ptype = PrimitiveType::from_u8(r.read_u8()?)?;
        let kind = StoreKind::from_u8(r.read_u8()?)?;
        let file_name = read_string(r)?;
        let n = r.read_u32::<LittleEndian>()?;
        let mut cset_meta = Vec::with_capacity(n as usize);
        for _ in 0..n {
            cset_meta.push(ColumnSetMetaData::deserialize(r)?);
        }
        Ok(Self {
            name,
            ptype,
            kind,
            file_name,
            cset_meta,
            writer: None,
        })
    }
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u32::<LittleEndian>()?;
    if len > 1 << 20 {
        return Err(Error::Corrupt(format!("implausible string length: {}", len)));
    }
    let mut bytes = vec![0u8; len as usize];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| Error::Corrupt(format!("invalid utf-8 string: {}", e)))
}

/// Footer-side description of one finished record batch: its row count, the
/// global ids of the fields it contains, and the index entry of its schema
/// column.
#[derive(Debug, Default, Clone)]
pub struct BatchDescriptor {
    pub n_rec: u32,
    pub local_dict: Vec<u32>,
    pub schema_meta: ColumnSetMetaData,
}

impl BatchDescriptor {
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.n_rec)?;
        w.write_u32::<LittleEndian>(self.local_dict.len() as u32)?;
        for id in &self.local_dict {
            w.write_u32::<LittleEndian>(*id)?;
        }
        self.schema_meta.serialize(w)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let n_rec = r.read_u32::<LittleEndian>()?;
        let n_dict = r.read_u32::<LittleEndian>()?;
        let mut local_dict = Vec::with_capacity(n_dict as usize);
        for _ in 0..n_dict {
            local_dict.push(r.read_u32::<LittleEndian>()?);
        }
        let schema_meta = ColumnSetMetaData::deserialize(r)?;
        Ok(Self {
            n_rec,
            local_dict,
            schema_meta,
        })
    }
}

/// The whole-archive index written as the footer: total rows, batch
/// descriptors, and per-field metadata.
#[derive(Default)]
pub struct FileMetaData {
    pub n_rows: u64,
    pub batches: Vec<BatchDescriptor>,
    pub field_meta: Vec<FieldMetaData>,
}

impl FileMetaData {
    pub fn add_row_counts(&mut self, count: u32) {
        self.n_rows += count as u64;
    }

    pub fn find_field(&self, name: &str) -> Option<u32> {
        self.field_meta
            .iter()
            .position(|f| f.name == name)
            .map(|i| i as u32)
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u64::<LittleEndian>(self.n_rows)?;
        w.write_u32::<LittleEndian>(self.batches.len() as u32)?;
        for batch in &self.batches {
            batch.serialize(w)?;
        }
        w.write_u32::<LittleEndian>(self.field_meta.len() as u32)?;
        for field in &self.field_meta {
            field.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let n_rows = r.read_u64::<LittleEndian>()?;
        let n_batches = r.read_u32::<LittleEndian>()?;
        let mut batches = Vec::with_capacity(n_batches as usize);
        for _ in 0..n_batches {
            batches.push(BatchDescriptor::deserialize(r)?);
        }
        let n_fields = r.read_u32::<LittleEndian>()?;
        let mut field_meta = Vec::with_capacity(n_fields as usize);
        for _ in 0..n_fields {
            field_meta.push(FieldMetaData::deserialize(r)?);
        }
        Ok(Self {
            n_rows,
            batches,
            field_meta,
        })
    }

    /// One-line-per-field summary through the log facade.
    pub fn describe(&self, field_dict: &FieldDictionary) {
        for (id, field) in self.field_meta.iter().enumerate() {
            let transforms = &field_dict.field(id as u32).transforms;
            let mode = if transforms.is_empty() {
                "auto".to_string()
            } else {
                transforms
                    .iter()
                    .map(|c| c.name())
                    .collect::<Vec<_>>()
                    .join(",")
            };
            log::info!(
                "field {}: {:?}/{:?} mode={} batches={} cols~{:.1} n={} U={} C={} ({:.2}-fold)",
                field.name,
                field.kind,
                field.ptype,
                mode,
                field.total_count(),
                field.average_columns(),
                field.total_occurrences(),
                field.total_uncompressed(),
                field.total_compressed(),
                field.average_compression_fold(),
            );
        }
    }
}
