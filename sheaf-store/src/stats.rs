use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sheaf_core::errors::Result;
use sheaf_format::ptype::Primitive;

use crate::column::store::ColumnStore;

/// Index-side description of one serialized column store: where it lives,
/// its shape, and min/max segment statistics for predicate pushdown. The
/// min/max slots are bit-punned from the column's primitive type; readers
/// cast back through the declared type.
#[derive(Debug, Clone, Default)]
pub struct ColumnStoreMetaData {
    pub have_segmental_stats: bool,
    pub file_offset: u64,
    pub last_modified: u64,
    pub n_records: u32,
    pub n_elements: u32,
    pub n_null: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    stats_surrogate_min: u64,
    stats_surrogate_max: u64,
}

impl ColumnStoreMetaData {
    /// Copy shape and size information from a column store. Leaves the
    /// statistics slots untouched so sizes can be refreshed after
    /// transformation without losing pre-transform statistics.
    pub fn set(&mut self, cstore: &ColumnStore) {
        self.n_records = cstore.n_records;
        self.n_elements = cstore.n_elements;
        self.n_null = cstore.n_null;
        self.uncompressed_size = cstore.uncompressed_size;
        self.compressed_size = cstore.compressed_size;
    }

    /// Compute min/max over the valid rows. Must run before any transform
    /// rewrites the payload. Clears the flag when no valid value exists.
    pub fn compute_segment_stats<T: Primitive>(&mut self, cstore: &ColumnStore) {
        let values = cstore.typed_data::<T>();
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;

        if cstore.has_nullity() {
            for (i, &v) in values.iter().enumerate() {
                if !cstore.is_valid(i as u32) {
                    continue;
                }
                min = Some(match min {
                    Some(m) if m <= v => m,
                    _ => v,
                });
                max = Some(match max {
                    Some(m) if m >= v => m,
                    _ => v,
                });
            }
        } else {
            for &v in values {
                min = Some(match min {
                    Some(m) if m <= v => m,
                    _ => v,
                });
                max = Some(match max {
                    Some(m) if m >= v => m,
                    _ => v,
                });
            }
        }

        match (min, max) {
            (Some(lo), Some(hi)) => {
                self.have_segmental_stats = true;
                self.stats_surrogate_min = lo.to_bits64();
                self.stats_surrogate_max = hi.to_bits64();
            }
            _ => {
                self.have_segmental_stats = false;
                self.stats_surrogate_min = 0;
                self.stats_surrogate_max = 0;
            }
        }
    }

    pub fn segment_min<T: Primitive>(&self) -> T {
        T::from_bits64(self.stats_surrogate_min)
    }

    pub fn segment_max<T: Primitive>(&self) -> T {
        T::from_bits64(self.stats_surrogate_max)
    }

    /// Whether `[from, to]` intersects the stored `[min, max]`. Conservative:
    /// returns true when no statistics are available.
    pub fn overlap<T: Primitive>(&self, from: T, to: T) -> bool {
        if !self.have_segmental_stats {
            return true;
        }
        let (from, to) = if to < from { (to, from) } else { (from, to) };
        to >= self.segment_min::<T>() && self.segment_max::<T>() >= from
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(u8::from(self.have_segmental_stats))?;
        w.write_u64::<LittleEndian>(self.file_offset)?;
        w.write_u64::<LittleEndian>(self.last_modified)?;
        w.write_u32::<LittleEndian>(self.n_records)?;
        w.write_u32::<LittleEndian>(self.n_elements)?;
        w.write_u32::<LittleEndian>(self.n_null)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u64::<LittleEndian>(self.stats_surrogate_min)?;
        w.write_u64::<LittleEndian>(self.stats_surrogate_max)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            have_segmental_stats: r.read_u8()? != 0,
            file_offset: r.read_u64::<LittleEndian>()?,
            last_modified: r.read_u64::<LittleEndian>()?,
            n_records: r.read_u32::<LittleEndian>()?,
            n_elements: r.read_u32::<LittleEndian>()?,
            n_null: r.read_u32::<LittleEndian>()?,
            uncompressed_size: r.read_u32::<LittleEndian>()?,
            compressed_size: r.read_u32::<LittleEndian>()?,
            stats_surrogate_min: r.read_u64::<LittleEndian>()?,
            stats_surrogate_max: r.read_u64::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheaf_format::ptype::PrimitiveType;

    fn store_with(values: &[i8], validity: &[bool]) -> ColumnStore {
        let mut col = ColumnStore::new(PrimitiveType::Int8);
        for (&v, &valid) in values.iter().zip(validity) {
            col.append_validity(valid, 0).unwrap();
            col.append(v).unwrap();
        }
        col
    }

    #[test]
    fn test_min_max_over_valid_rows() {
        let col = store_with(&[-100, -50, 25, 1], &[true; 4]);
        let mut meta = ColumnStoreMetaData::default();
        meta.set(&col);
        meta.compute_segment_stats::<i8>(&col);

        assert!(meta.have_segmental_stats);
        assert_eq!(meta.segment_min::<i8>(), -100);
        assert_eq!(meta.segment_max::<i8>(), 25);
        assert!(meta.overlap(-25i8, 10));
        assert!(!meta.overlap(50i8, 100));
        assert!(!meta.overlap(-120i8, -110));
        // swapped bounds are normalized
        assert!(meta.overlap(10i8, -25));
    }

    #[test]
    fn test_null_rows_excluded() {
        let col = store_with(&[-100, -50, 25, 1], &[false, true, true, true]);
        let mut meta = ColumnStoreMetaData::default();
        meta.compute_segment_stats::<i8>(&col);
        assert_eq!(meta.segment_min::<i8>(), -50);
    }

    #[test]
    fn test_all_null_clears_flag_and_stays_conservative() {
        let col = store_with(&[1, 2], &[false, false]);
        let mut meta = ColumnStoreMetaData::default();
        meta.compute_segment_stats::<i8>(&col);
        assert!(!meta.have_segmental_stats);
        assert!(meta.overlap(100i8, 120));
    }

    #[test]
    fn test_match_range_u32() {
        let mut col = ColumnStore::new(PrimitiveType::UInt32);
        for v in [192u32, 102, 57, 9] {
            col.append_validity(true, 0).unwrap();
            col.append(v).unwrap();
        }
        let mut meta = ColumnStoreMetaData::default();
        meta.compute_segment_stats::<u32>(&col);
        assert_eq!(meta.segment_min::<u32>(), 9);
        assert_eq!(meta.segment_max::<u32>(), 192);
        assert!(meta.overlap(100u32, 150));
        assert!(meta.overlap(192u32, 500));
        assert!(!meta.overlap(193u32, 500));
        assert!(!meta.overlap(0u32, 8));
    }

    #[test]
    fn test_match_range_float() {
        let mut col = ColumnStore::new(PrimitiveType::Float);
        for v in [-21.5f32, 0.25, 119.0, 3.5] {
            col.append_validity(true, 0).unwrap();
            col.append(v).unwrap();
        }
        let mut meta = ColumnStoreMetaData::default();
        meta.compute_segment_stats::<f32>(&col);
        assert_eq!(meta.segment_min::<f32>(), -21.5);
        assert_eq!(meta.segment_max::<f32>(), 119.0);
        assert!(meta.overlap(-1.0f32, 1.0));
        assert!(!meta.overlap(120.0f32, 300.0));
    }

    #[test]
    fn test_match_range_double_survives_punning() {
        let mut col = ColumnStore::new(PrimitiveType::Double);
        for v in [-1e300f64, 2.5, 7e200] {
            col.append_validity(true, 0).unwrap();
            col.append(v).unwrap();
        }
        let mut meta = ColumnStoreMetaData::default();
        meta.compute_segment_stats::<f64>(&col);

        let mut bytes = Vec::new();
        meta.serialize(&mut bytes).unwrap();
        let back = ColumnStoreMetaData::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(back.segment_min::<f64>(), -1e300);
        assert_eq!(back.segment_max::<f64>(), 7e200);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let col = store_with(&[3, 9], &[true, true]);
        let mut meta = ColumnStoreMetaData::default();
        meta.set(&col);
        meta.compute_segment_stats::<i8>(&col);
        meta.file_offset = 77;
        meta.last_modified = 123456;

        let mut bytes = Vec::new();
        meta.serialize(&mut bytes).unwrap();
        let back = ColumnStoreMetaData::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(back.file_offset, 77);
        assert_eq!(back.segment_min::<i8>(), 3);
        assert_eq!(back.segment_max::<i8>(), 9);
        assert_eq!(back.n_records, 2);
    }
}
