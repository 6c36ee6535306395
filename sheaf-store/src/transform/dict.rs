use std::collections::HashMap;

use sheaf_core::errors::{Error, Result};
use sheaf_format::codec::Codec;
use sheaf_format::dispatch_primitive;
use sheaf_format::meta::TransformMeta;
use sheaf_format::ptype::Primitive;
use xxhash_rust::xxh64::xxh64;

use crate::column::dictionary::ColumnDictionary;
use crate::column::set::ColumnSet;
use crate::column::store::ColumnStore;
use crate::common::checksum::md5_digest;
use crate::transform::note_original;

/// Cardinality thresholds below which dictionary encoding pays off.
const FIXED_RATIO: f64 = 0.20;
const TENSOR_RATIO: f64 = 0.30;

/// Seed for hashing variable-length strides.
const STRIDE_HASH_SEED: u64 = 123718;

/// Dictionary-encode one fixed-width column. Returns false (leaving the
/// column untouched) when the column has no bitmap, no valid rows, or too
/// many distinct values.
pub(crate) fn dict_encode_store(column: &mut ColumnStore) -> Result<bool> {
    dispatch_primitive!(column.ptype(), |T| encode_fixed::<T>(column), Ok(false))
}

fn encode_fixed<T: Primitive>(column: &mut ColumnStore) -> Result<bool> {
    if !column.has_nullity() {
        return Ok(false);
    }
    if column.n_elements as usize * std::mem::size_of::<T>() != column.buffer.len() {
        return Err(Error::TypeMismatch(
            "dictionary encoding requires an untransformed payload".into(),
        ));
    }

    let n = column.n_records as usize;
    let mut map: HashMap<u64, u32> = HashMap::new();
    let mut list: Vec<T> = Vec::new();
    let mut n_valid = 0u64;
    {
        let values = column.typed_data::<T>();
        for (i, &v) in values.iter().enumerate().take(n) {
            if !column.is_valid(i as u32) {
                continue;
            }
            map.entry(v.to_bits64()).or_insert_with(|| {
                list.push(v);
                (list.len() - 1) as u32
            });
            n_valid += 1;
        }
    }

    if n_valid == 0 {
        return Ok(false);
    }
    let ratio = list.len() as f64 / n_valid as f64;
    if ratio >= FIXED_RATIO {
        log::debug!(
            "dictionary skipped: {} unique of {} valid ({:.3})",
            list.len(),
            n_valid,
            ratio
        );
        return Ok(false);
    }

    let indices: Vec<u32> = {
        let values = column.typed_data::<T>();
        (0..n)
            .map(|i| {
                if column.is_valid(i as u32) {
                    map[&values[i].to_bits64()]
                } else {
                    0
                }
            })
            .collect()
    };

    note_original(column);
    let n_in = column.buffer.len() as i64;
    column.dictionary = Some(ColumnDictionary::fixed(
        bytemuck::cast_slice(&list).to_vec(),
        list.len() as i64,
    ));
    column.buffer.assign(bytemuck::cast_slice(&indices))?;
    column.uncompressed_size = (n * 4) as u32;
    column.compressed_size = column.buffer.len() as u32;
    let mut meta = TransformMeta::new(Codec::Dict, n_in, column.buffer.len() as i64);
    meta.set_checksum(md5_digest(column.raw_data()));
    column.transformation_args.push(meta);

    log::debug!(
        "dictionary encoded: {} unique of {} valid ({:.3}), {} -> {} bytes",
        list.len(),
        n_valid,
        ratio,
        n_in,
        column.buffer.len()
    );
    Ok(true)
}

/// Dictionary-encode the data column of a tensor set over its strides.
/// Strides are deduplicated by their 64-bit hash alone; colliding strides
/// are treated as the same entry.
pub(crate) fn dict_encode_tensor(cset: &mut ColumnSet) -> Result<bool> {
    if cset.columns.len() != 2 {
        return Err(Error::Corrupt(format!(
            "tensor set with {} columns",
            cset.columns.len()
        )));
    }
    let ptype = cset.ptype;
    let (left, right) = cset.columns.split_at_mut(1);
    let offsets = &left[0];
    let data = &mut right[0];
    dispatch_primitive!(ptype, |T| encode_tensor::<T>(offsets, data), Ok(false))
}

fn encode_tensor<T: Primitive>(offsets: &ColumnStore, data: &mut ColumnStore) -> Result<bool> {
    if !offsets.has_nullity() {
        return Ok(false);
    }
    if offsets.n_records < 2 {
        return Ok(false);
    }
    let n_rows = offsets.n_records as usize - 1;
    let cum = offsets.typed_data::<u32>();

    let mut map: HashMap<u64, u32> = HashMap::new();
    let mut entry_data: Vec<u8> = Vec::new();
    let mut lengths: Vec<u32> = Vec::new();
    let mut n_elements = 0i64;
    let mut n_valid = 0u64;
    {
        let values = data.typed_data::<T>();
        for row in 0..n_rows {
            if !offsets.is_valid(row as u32) {
                continue;
            }
            let stride = &values[cum[row] as usize..cum[row + 1] as usize];
            let bytes: &[u8] = bytemuck::cast_slice(stride);
            map.entry(xxh64(bytes, STRIDE_HASH_SEED)).or_insert_with(|| {
                entry_data.extend_from_slice(bytes);
                lengths.push(stride.len() as u32);
                n_elements += stride.len() as i64;
                (lengths.len() - 1) as u32
            });
            n_valid += 1;
        }
    }

    if n_valid == 0 {
        return Ok(false);
    }
    let ratio = lengths.len() as f64 / n_valid as f64;
    if ratio >= TENSOR_RATIO {
        log::debug!(
            "tensor dictionary skipped: {} unique of {} valid ({:.3})",
            lengths.len(),
            n_valid,
            ratio
        );
        return Ok(false);
    }

    let indices: Vec<u32> = {
        let values = data.typed_data::<T>();
        (0..n_rows)
            .map(|row| {
                if offsets.is_valid(row as u32) {
                    let stride = &values[cum[row] as usize..cum[row + 1] as usize];
                    map[&xxh64(bytemuck::cast_slice(stride), STRIDE_HASH_SEED)]
                } else {
                    0
                }
            })
            .collect()
    };

    note_original(data);
    let n_in = data.buffer.len() as i64;
    data.dictionary = Some(ColumnDictionary::tensor(entry_data, lengths, n_elements));
    data.buffer.assign(bytemuck::cast_slice(&indices))?;
    data.uncompressed_size = (n_rows * 4) as u32;
    data.compressed_size = data.buffer.len() as u32;
    let mut meta = TransformMeta::new(Codec::Dict, n_in, data.buffer.len() as i64);
    meta.set_checksum(md5_digest(data.raw_data()));
    data.transformation_args.push(meta);

    log::debug!(
        "tensor dictionary encoded: {} unique of {} valid ({:.3}), {} -> {} bytes",
        map.len(),
        n_valid,
        ratio,
        n_in,
        data.buffer.len()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheaf_format::ptype::{PrimitiveType, StoreKind};

    fn fixed_column(values: &[u32]) -> ColumnStore {
        let mut column = ColumnStore::new(PrimitiveType::UInt32);
        for &v in values {
            column.append_validity(true, 0).unwrap();
            column.append(v).unwrap();
        }
        column
    }

    #[test]
    fn test_low_cardinality_encodes() {
        let values: Vec<u32> = (0..1000).map(|i| i % 10).collect();
        let mut column = fixed_column(&values);
        assert!(dict_encode_store(&mut column).unwrap());

        let dict = column.dictionary.as_ref().unwrap();
        assert_eq!(dict.n_records, 10);
        assert_eq!(column.uncompressed_size, 4000);
        assert_eq!(column.transformation_args[0].codec, Codec::Dict);

        // re-expanding the indices reproduces the original sequence
        let indices = column.typed_data::<u32>().to_vec();
        for (i, &idx) in indices.iter().enumerate() {
            assert_eq!(dict.get::<u32>(idx as i64).unwrap(), values[i]);
        }
    }

    #[test]
    fn test_high_cardinality_skipped() {
        let values: Vec<u32> = (0..1000).collect();
        let mut column = fixed_column(&values);
        assert!(!dict_encode_store(&mut column).unwrap());
        assert!(column.dictionary.is_none());
        assert!(column.transformation_args.is_empty());
    }

    #[test]
    fn test_null_rows_become_index_zero() {
        let mut column = ColumnStore::new(PrimitiveType::UInt32);
        for i in 0..100u32 {
            let valid = i % 4 != 3;
            column.append_validity(valid, 0).unwrap();
            column.append(if valid { i % 3 } else { 0 }).unwrap();
        }
        assert!(dict_encode_store(&mut column).unwrap());
        let indices = column.typed_data::<u32>();
        assert_eq!(indices[3], 0);
    }

    #[test]
    fn test_tensor_strides_encode() {
        let mut set = ColumnSet::new(StoreKind::Tensor, PrimitiveType::UInt8);
        for i in 0..300 {
            match i % 3 {
                0 => set.append(b"ACGT".as_slice()).unwrap(),
                1 => set.append(b"TT".as_slice()).unwrap(),
                _ => set.pad_null().unwrap(),
            }
        }
        assert!(dict_encode_tensor(&mut set).unwrap());
        let data = &set.columns[1];
        let dict = data.dictionary.as_ref().unwrap();
        assert!(dict.have_lengths);
        assert_eq!(dict.n_records, 2);
        assert_eq!(dict.entry(0, 1).unwrap(), b"ACGT");
        assert_eq!(dict.entry(1, 1).unwrap(), b"TT");
        assert_eq!(data.typed_data::<u32>().len(), 300);
    }

    #[test]
    fn test_tensor_high_cardinality_skipped() {
        let mut set = ColumnSet::new(StoreKind::Tensor, PrimitiveType::UInt8);
        for i in 0..100u32 {
            set.append(i.to_le_bytes().as_slice()).unwrap();
        }
        assert!(!dict_encode_tensor(&mut set).unwrap());
        assert!(set.columns[1].dictionary.is_none());
    }
}
