use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, WriteBytesExt};
use sheaf_core::errors::{Error, Result};
use sheaf_format::codec::Codec;
use sheaf_format::dispatch_primitive;
use sheaf_format::{MAGIC, MAJOR_VERSION, MINOR_VERSION};

use crate::batch::RecordBatch;
use crate::column::set::ColumnSet;
use crate::common::checksum::{create_checksum, Checksum, ChecksumType};
use crate::dict::{FieldDictionary, SchemaDictionary, SchemaPattern};
use crate::file::footer::{BatchDescriptor, ColumnSetMetaData, FieldMetaData, FileMetaData};
use crate::options::WriterOptions;
use crate::record::{RecordBuilder, Slot};
use crate::stats::ColumnStoreMetaData;
use crate::transform::Transformer;

/// Single-writer, append-only ingestion front end. Records are shredded
/// into per-field column sets; full batches are transformed, serialized,
/// and released; `finalize` writes the footer and postscript.
///
/// Failures during a record are fatal to the archive: column sets may have
/// been partially advanced, so the caller is expected to discard the output.
pub struct TableWriter<W: Write + Seek> {
    options: WriterOptions,
    field_dict: FieldDictionary,
    schema_dict: SchemaDictionary,
    /// Transform chains declared before their field was first seen.
    pending_transforms: HashMap<String, Vec<Codec>>,
    /// Column sets of the open batch, indexed by local field id.
    build_csets: Vec<ColumnSet>,
    batch: RecordBatch,
    meta: FileMetaData,
    transformer: Transformer,
    out: BufWriter<W>,
    checksum_type: ChecksumType,
    data_checksum: Box<dyn Checksum>,
}

impl<W: Write + Seek> TableWriter<W> {
    pub fn try_new(writer: W, options: WriterOptions) -> Result<Self> {
        if let Some(dir) = options.multi_archive_dir() {
            std::fs::create_dir_all(dir)?;
        }
        let checksum_type = ChecksumType::XxHash;
        let transformer = Transformer::new(options.compression(), options.compression_level());
        Ok(Self {
            options,
            field_dict: FieldDictionary::default(),
            schema_dict: SchemaDictionary::default(),
            pending_transforms: HashMap::new(),
            build_csets: Vec::new(),
            batch: RecordBatch::new(),
            meta: FileMetaData::default(),
            transformer,
            out: BufWriter::new(writer),
            checksum_type,
            data_checksum: create_checksum(&checksum_type),
        })
    }

    /// Declare an explicit transform chain for a field; an empty chain
    /// selects auto mode. May run before or after the field's first record.
    pub fn set_field_transforms(&mut self, field_name: &str, transforms: Vec<Codec>) -> Result<()> {
        if !Transformer::valid_transformation_order(&transforms) {
            return Err(Error::InvalidChain(format!(
                "illegal transform chain for field '{}': {:?}",
                field_name, transforms
            )));
        }
        match self.field_dict.find(field_name) {
            Some(id) => self.field_dict.field_mut(id).transforms = transforms,
            None => {
                self.pending_transforms
                    .insert(field_name.to_string(), transforms);
            }
        }
        Ok(())
    }

    pub fn num_rows(&self) -> u64 {
        self.meta.n_rows + self.batch.n_rec as u64
    }

    pub fn field_dictionary(&self) -> &FieldDictionary {
        &self.field_dict
    }

    pub fn schema_dictionary(&self) -> &SchemaDictionary {
        &self.schema_dict
    }

    /// Shred one record into the open batch. All side effects of a
    /// successful call (schema id, column appends, null padding) land
    /// together; the batch is finalized first if it is full.
    pub fn append(&mut self, builder: &mut RecordBuilder) -> Result<()> {
        if self.batch.n_rec >= self.options.batch_size() {
            self.finalize_batch()?;
        }

        // 1: the record's ordered field-id vector, registering new names.
        let mut pattern = SchemaPattern::default();
        let mut present: HashSet<u32> = HashSet::with_capacity(builder.len());
        for slot in builder.slots() {
            if self.field_dict.find(slot.name()).is_none() {
                self.register_field(slot)?;
            }
            let id = self
                .field_dict
                .find_or_add(slot.name(), slot.ptype(), slot.kind())?;
            if !present.insert(id) {
                return Err(Error::General(format!(
                    "duplicate field '{}' in record",
                    slot.name()
                )));
            }
            pattern.ids.push(id);
        }

        // 2: schema identity.
        let schema_id = self.schema_dict.find_or_add(pattern.clone());

        // 3: route each slot into its column set, creating and back-padding
        // sets for first-seen fields.
        for (slot, &global_id) in builder.slots().iter().zip(&pattern.ids) {
            let local = match self.batch.find_local_field(global_id) {
                Some(local) => local,
                None => self.batch_add_column(global_id)?,
            };
            append_slot(&mut self.build_csets[local as usize], slot)?;
        }

        // 4: null-pad every batch field this record did not mention, keeping
        // the row/column matrix rectangular.
        for local in 0..self.batch.local_dict.len() {
            if !present.contains(&self.batch.local_dict[local]) {
                self.build_csets[local].pad_null()?;
            }
        }

        // 5: commit the row.
        self.batch.add_schema(schema_id)?;
        builder.n_added += 1;
        builder.reset();

        debug_assert!(self
            .build_csets
            .iter()
            .all(|cset| cset.logical_rows() == self.batch.n_rec));
        Ok(())
    }

    fn register_field(&mut self, slot: &Slot) -> Result<()> {
        let id = self
            .field_dict
            .find_or_add(slot.name(), slot.ptype(), slot.kind())?;
        if let Some(transforms) = self.pending_transforms.remove(slot.name()) {
            self.field_dict.field_mut(id).transforms = transforms;
        }
        self.meta.field_meta.push(FieldMetaData::new(
            slot.name().to_string(),
            slot.ptype(),
            slot.kind(),
        ));
        Ok(())
    }

    /// Create the batch-local column set for a field, null-padded up to the
    /// batch's current row count.
    fn batch_add_column(&mut self, global_id: u32) -> Result<u32> {
        let field = self.field_dict.field(global_id);
        let mut cset = ColumnSet::new(field.kind, field.ptype);
        for _ in 0..self.batch.n_rec {
            cset.pad_null()?;
        }
        let local = self.batch.add_global_field(global_id);
        self.build_csets.push(cset);
        Ok(local)
    }

    /// Close the open batch: serialize its schema column, then transform and
    /// serialize every column set, updating the index as we go.
    fn finalize_batch(&mut self) -> Result<()> {
        let batch_id = self.meta.batches.len() as u32;
        let batch = std::mem::take(&mut self.batch);
        let csets = std::mem::take(&mut self.build_csets);

        // The schema-id column always lands in the main stream.
        let mut schemas = batch.schemas;
        self.transformer.block_stage(&mut schemas)?;
        self.transformer.compress_nullity(&mut schemas, false)?;
        let mut schema_meta = ColumnSetMetaData::new(batch_id);
        {
            let mut column_meta = ColumnStoreMetaData::default();
            column_meta.set(&schemas);
            column_meta.file_offset = self.out.stream_position()?;
            column_meta.last_modified = unix_now();
            let mut sink = ChecksumWrite {
                inner: &mut self.out,
                checksum: self.data_checksum.as_mut(),
            };
            schemas.serialize(&mut sink)?;
            schema_meta.column_meta_data.push(column_meta);
        }

        let mut mem_in = 0u64;
        let mut mem_out = 0u64;
        for (local, mut cset) in csets.into_iter().enumerate() {
            let global_id = batch.local_dict[local];
            let field = self.field_dict.field(global_id).clone();

            let slot = {
                let field_meta = &mut self.meta.field_meta[global_id as usize];
                let slot = field_meta.add_batch(batch_id);
                field_meta.cset_meta[slot].add_column_set(&cset);
                slot
            };

            mem_in += cset.memory_usage() as u64;
            self.transformer.transform(&mut cset, &field)?;
            cset.update_checksum();

            let compressed: u64 = cset
                .columns
                .iter()
                .map(|c| c.compressed_size as u64)
                .sum();
            mem_out += compressed;
            log::debug!(
                "{}: compressed n={} cols={} {} -> {} bytes",
                field.name,
                cset.logical_rows(),
                cset.size(),
                cset.memory_usage(),
                compressed,
            );

            self.serialize_column_set(global_id, slot, &cset)?;
        }

        log::debug!(
            "batch {}: {} records, {} -> {} bytes",
            batch_id,
            batch.n_rec,
            mem_in,
            mem_out
        );

        self.meta.add_row_counts(batch.n_rec);
        self.meta.batches.push(BatchDescriptor {
            n_rec: batch.n_rec,
            local_dict: batch.local_dict,
            schema_meta,
        });
        Ok(())
    }

    /// Write a transformed column set to its stream, recording the offset
    /// and timestamp of each store.
    fn serialize_column_set(&mut self, global_id: u32, slot: usize, cset: &ColumnSet) -> Result<()> {
        let field_meta = &mut self.meta.field_meta[global_id as usize];
        field_meta.cset_meta[slot].update_column_set(cset);

        if let Some(dir) = self.options.multi_archive_dir().cloned() {
            open_field_stream(field_meta, &dir)?;
            for (k, column) in cset.columns.iter().enumerate() {
                let offset = field_meta.writer.as_mut().unwrap().stream_position()?;
                let entry = &mut field_meta.cset_meta[slot].column_meta_data[k];
                entry.file_offset = offset;
                entry.last_modified = unix_now();
                column.serialize(field_meta.writer.as_mut().unwrap())?;
            }
        } else {
            for (k, column) in cset.columns.iter().enumerate() {
                let offset = self.out.stream_position()?;
                let entry = &mut field_meta.cset_meta[slot].column_meta_data[k];
                entry.file_offset = offset;
                entry.last_modified = unix_now();
                let mut sink = ChecksumWrite {
                    inner: &mut self.out,
                    checksum: self.data_checksum.as_mut(),
                };
                column.serialize(&mut sink)?;
            }
        }
        Ok(())
    }

    /// Close the final batch, append the footer and postscript, and flush.
    /// Success means every column's transform chain round-trips and the
    /// index is intact.
    pub fn finalize(mut self) -> Result<FileMetaData> {
        if self.batch.n_rec > 0 || self.meta.batches.is_empty() {
            self.finalize_batch()?;
        }

        for field_meta in &mut self.meta.field_meta {
            if let Some(writer) = field_meta.writer.as_mut() {
                writer.flush()?;
            }
        }

        let footer_offset = self.out.stream_position()?;
        {
            let mut sink = ChecksumWrite {
                inner: &mut self.out,
                checksum: self.data_checksum.as_mut(),
            };
            self.meta.serialize(&mut sink)?;
        }

        self.out.write_u64::<LittleEndian>(footer_offset)?;
        self.out.write_u8(self.checksum_type as u8)?;
        self.out
            .write_u64::<LittleEndian>(self.data_checksum.finalize())?;
        self.out.write_u16::<LittleEndian>(MAJOR_VERSION)?;
        self.out.write_u16::<LittleEndian>(MINOR_VERSION)?;
        self.out.write_all(MAGIC)?;
        self.out.flush()?;

        self.meta.describe(&self.field_dict);
        Ok(self.meta)
    }
}

fn append_slot(cset: &mut ColumnSet, slot: &Slot) -> Result<()> {
    dispatch_primitive!(
        slot.ptype(),
        |T| cset.append::<T>(&slot.typed::<T>()),
        Err(Error::TypeMismatch(format!(
            "slot '{}' carries unsupported element type {:?}",
            slot.name(),
            slot.ptype()
        )))
    )
}

fn open_field_stream<'a>(
    field_meta: &'a mut FieldMetaData,
    dir: &Path,
) -> Result<&'a mut BufWriter<File>> {
    if field_meta.writer.is_none() {
        let safe: String = field_meta
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        let path = dir.join(format!("{}.sheaf", safe));
        field_meta.file_name = path.to_string_lossy().into_owned();
        field_meta.writer = Some(BufWriter::new(File::create(&path)?));
        log::debug!("opened field archive {}", field_meta.file_name);
    }
    Ok(field_meta.writer.as_mut().unwrap())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Forwards writes to the archive stream while folding every byte into the
/// file-level checksum.
struct ChecksumWrite<'a, W: Write> {
    inner: &'a mut W,
    checksum: &'a mut dyn Checksum,
}

impl<W: Write> Write for ChecksumWrite<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.checksum.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::WriterOptionsBuilder;
    use std::io::Cursor;

    fn writer() -> TableWriter<Cursor<Vec<u8>>> {
        TableWriter::try_new(Cursor::new(Vec::new()), WriterOptions::default()).unwrap()
    }

    #[test]
    fn test_single_value_shred() {
        let mut table = writer();
        assert_eq!(table.build_csets.len(), 0);

        let mut record = RecordBuilder::new();
        record.add("REF_ID", 7u32).unwrap();
        table.append(&mut record).unwrap();

        assert_eq!(table.build_csets.len(), 1);
        assert_eq!(table.build_csets[0].columns.len(), 1);
        assert_eq!(table.build_csets[0].columns[0].n_records, 1);
        assert!(table.build_csets[0].columns[0].is_valid(0));
        assert_eq!(table.schema_dict.len(), 1);
        assert_eq!(table.field_dict.field(0).name, "REF_ID");
        assert_eq!(table.batch.n_rec, 1);
        assert_eq!(table.batch.schemas.typed_data::<u32>(), &[0]);
    }

    #[test]
    fn test_unbalanced_growth_shred() {
        let mut table = writer();
        let mut record = RecordBuilder::new();
        record.add_values("COUNTS", &[5u32]).unwrap();
        table.append(&mut record).unwrap();
        record.add_values("COUNTS", &[5u32, 6]).unwrap();
        table.append(&mut record).unwrap();

        let cset = &table.build_csets[0];
        assert_eq!(cset.columns.len(), 2);
        assert_eq!(cset.columns[0].n_records, 2);
        assert_eq!(cset.columns[1].n_records, 2);
        assert!(cset.columns[0].is_valid(0) && cset.columns[0].is_valid(1));
        assert!(!cset.columns[1].is_valid(0));
        assert!(cset.columns[1].is_valid(1));
        // multiplicity does not change the schema
        assert_eq!(table.schema_dict.len(), 1);
    }

    #[test]
    fn test_unbalanced_decreasing_shred() {
        let mut table = writer();
        let mut record = RecordBuilder::new();
        record.add_values("COUNTS", &[5u32, 6]).unwrap();
        table.append(&mut record).unwrap();
        record.add_values("COUNTS", &[5u32]).unwrap();
        table.append(&mut record).unwrap();

        let cset = &table.build_csets[0];
        assert_eq!(cset.columns.len(), 2);
        assert!(cset.columns[1].is_valid(0));
        assert!(!cset.columns[1].is_valid(1));
        assert_eq!(cset.columns[1].n_null, 1);
    }

    #[test]
    fn test_tensor_unbalanced_shred() {
        let mut table = writer();
        let mut record = RecordBuilder::new();
        record.add_array("CIGAR", &[1u32]).unwrap();
        table.append(&mut record).unwrap();
        record.add_array("CIGAR", &[2u32, 3]).unwrap();
        table.append(&mut record).unwrap();

        let cset = &table.build_csets[0];
        assert_eq!(cset.columns.len(), 2);
        assert_eq!(cset.columns[0].typed_data::<u32>(), &[0, 1, 3]);
        assert_eq!(cset.columns[1].n_elements, 3);
        assert_eq!(cset.logical_rows(), 2);
    }

    #[test]
    fn test_mixed_schemas_partial_overlap_shred() {
        let mut table = writer();
        let mut record = RecordBuilder::new();
        record.add("A", 1u32).unwrap();
        record.add("B", 2u32).unwrap();
        table.append(&mut record).unwrap();
        record.add("A", 3u32).unwrap();
        record.add("C", 4u32).unwrap();
        table.append(&mut record).unwrap();

        assert_eq!(table.build_csets.len(), 3);
        assert_eq!(table.schema_dict.len(), 2);
        assert_eq!(table.batch.schemas.typed_data::<u32>(), &[0, 1]);

        let a = &table.build_csets[0];
        let b = &table.build_csets[1];
        let c = &table.build_csets[2];
        for cset in [a, b, c] {
            assert_eq!(cset.logical_rows(), 2);
        }
        assert!(a.columns[0].is_valid(0) && a.columns[0].is_valid(1));
        assert!(b.columns[0].is_valid(0) && !b.columns[0].is_valid(1));
        assert!(!c.columns[0].is_valid(0) && c.columns[0].is_valid(1));
        assert_eq!(c.columns[0].get::<u32>(1).unwrap(), 4);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut table = writer();
        let mut record = RecordBuilder::new();
        record.add("A", 1u32).unwrap();
        record.add("A", 2u32).unwrap();
        assert!(table.append(&mut record).is_err());
    }

    #[test]
    fn test_batch_rollover() {
        let options = WriterOptionsBuilder::with_defaults().set_batch_size(4).build();
        let mut table =
            TableWriter::try_new(Cursor::new(Vec::new()), options).unwrap();
        let mut record = RecordBuilder::new();
        for i in 0..10u32 {
            record.add("A", i).unwrap();
            table.append(&mut record).unwrap();
        }
        assert_eq!(table.meta.batches.len(), 2);
        assert_eq!(table.batch.n_rec, 2);
        assert_eq!(table.num_rows(), 10);
    }
}
