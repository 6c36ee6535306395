//! Decode path: walk a column's recorded transform chain backwards,
//! verifying each stage digest, until the original payload is restored.

use bytemuck::Zeroable;
use sheaf_core::errors::{Error, Result};
use sheaf_encoding::block::{self, Compression};
use sheaf_encoding::{delta, pack, qual, seq};
use sheaf_format::codec::Codec;
use sheaf_format::dispatch_primitive;
use sheaf_format::meta::TransformMeta;
use sheaf_format::ptype::StoreKind;

use crate::column::dictionary::ColumnDictionary;
use crate::column::set::ColumnSet;
use crate::column::store::ColumnStore;
use crate::common::checksum::md5_digest;

/// Reverse every transform recorded on the set, restoring raw payloads and
/// bitmaps. Verifies the per-stage digests and the original payload digest.
pub fn untransform_set(cset: &mut ColumnSet) -> Result<()> {
    match cset.kind {
        StoreKind::Column => {
            for column in &mut cset.columns {
                untransform_store(column)?;
            }
            Ok(())
        }
        StoreKind::Tensor => untransform_tensor(cset),
    }
}

/// The block algorithm a column's payload (and bitmap and dictionary) was
/// compressed with, recovered from its block stage tuple.
fn block_algo(column: &ColumnStore) -> Compression {
    column
        .transformation_args
        .iter()
        .rev()
        .find(|m| m.codec == Codec::Block)
        .and_then(|m| m.tuples.first())
        .and_then(|t| t.data.first())
        .and_then(|&b| Compression::from_u8(b).ok())
        .unwrap_or(Compression::Zstd)
}

/// The bitmap is compressed exactly when the column carries a compression
/// stage; otherwise it was serialized raw.
fn restore_nullity(column: &mut ColumnStore) -> Result<()> {
    if column.nullity.is_none() {
        return Ok(());
    }
    if !column
        .transformation_args
        .iter()
        .any(|m| m.codec.is_compression())
    {
        return Ok(());
    }
    let algo = block_algo(column);
    let compressed = column.nullity.as_ref().unwrap().as_slice()[..column.nullity_c as usize].to_vec();
    let raw = block::decompress(&compressed, algo)?;
    if raw.len() != column.nullity_u as usize {
        return Err(Error::Corrupt(format!(
            "nullity bitmap decompressed to {} bytes, expected {}",
            raw.len(),
            column.nullity_u
        )));
    }
    column.nullity.as_mut().unwrap().assign(&raw)?;
    column.nullity_c = column.nullity_u;
    Ok(())
}

fn verify_stage(payload: &[u8], meta: &TransformMeta) -> Result<()> {
    if payload.len() != meta.c_sz as usize {
        return Err(Error::Corrupt(format!(
            "stage '{}' holds {} bytes, metadata says {}",
            meta.codec,
            payload.len(),
            meta.c_sz
        )));
    }
    if md5_digest(payload) != meta.md5 {
        return Err(Error::Corrupt(format!(
            "stage '{}' digest mismatch",
            meta.codec
        )));
    }
    Ok(())
}

fn verify_original(column: &ColumnStore) -> Result<()> {
    if md5_digest(column.raw_data()) != column.payload_md5 {
        return Err(Error::Corrupt("payload digest mismatch after decode".into()));
    }
    Ok(())
}

/// Reverse a standalone (fixed-width) column store.
pub fn untransform_store(column: &mut ColumnStore) -> Result<()> {
    restore_nullity(column)?;
    let algo = block_algo(column);

    while let Some(meta) = column.transformation_args.pop() {
        let payload = column.raw_data().to_vec();
        verify_stage(&payload, &meta)?;
        match meta.codec {
            Codec::Block => {
                let tuple_algo = meta
                    .tuples
                    .first()
                    .and_then(|t| t.data.first())
                    .map(|&b| Compression::from_u8(b))
                    .transpose()?
                    .unwrap_or(algo);
                let raw = block::decompress(&payload, tuple_algo)?;
                check_output_size(raw.len(), &meta)?;
                column.buffer.assign(&raw)?;
            }
            Codec::Delta => {
                delta::prefix_sum_in_place(column.buffer.typed_mut::<u32>());
            }
            Codec::PrefixSum => {
                delta::encode_in_place(column.buffer.typed_mut::<u32>());
            }
            Codec::Dict => {
                expand_fixed_dict(column, &payload, algo)?;
                check_output_size(column.buffer.len(), &meta)?;
            }
            Codec::BasePack => {
                let raw = pack::unpack(&payload, meta.u_sz as usize);
                column.buffer.assign(&raw)?;
            }
            Codec::QualityRc | Codec::SequenceRc => {
                return Err(Error::Corrupt(format!(
                    "record codec '{}' on a scalar column",
                    meta.codec
                )));
            }
            Codec::None | Codec::Auto => {}
        }
    }

    verify_original(column)?;
    column.uncompressed_size = column.buffer.len() as u32;
    column.compressed_size = 0;
    Ok(())
}

fn check_output_size(actual: usize, meta: &TransformMeta) -> Result<()> {
    if actual != meta.u_sz as usize {
        return Err(Error::Corrupt(format!(
            "stage '{}' reversed to {} bytes, metadata says {}",
            meta.codec, actual, meta.u_sz
        )));
    }
    Ok(())
}

fn take_dictionary(column: &mut ColumnStore, algo: Compression) -> Result<ColumnDictionary> {
    let mut dict = column
        .dictionary
        .take()
        .ok_or_else(|| Error::Corrupt("dictionary-encoded column without dictionary".into()))?;
    if dict.sz_c > 0 {
        let data = block::decompress(&dict.data, algo)?;
        if data.len() != dict.sz_u as usize {
            return Err(Error::Corrupt("dictionary payload size mismatch".into()));
        }
        dict.data = data;
        dict.sz_c = 0;
    }
    if dict.have_lengths && dict.sz_lc > 0 {
        let lengths = block::decompress(&dict.lengths, algo)?;
        if lengths.len() != dict.sz_lu as usize {
            return Err(Error::Corrupt("dictionary length table size mismatch".into()));
        }
        dict.lengths = lengths;
        dict.sz_lc = 0;
    }
    Ok(dict)
}

fn expand_fixed_dict(
    column: &mut ColumnStore,
    indices_bytes: &[u8],
    algo: Compression,
) -> Result<()> {
    let dict = take_dictionary(column, algo)?;
    let indices: Vec<u32> = bytemuck::pod_collect_to_vec(indices_bytes);
    if indices.len() != column.n_records as usize {
        return Err(Error::Corrupt(format!(
            "dictionary indices cover {} rows, column has {}",
            indices.len(),
            column.n_records
        )));
    }
    dispatch_primitive!(
        column.ptype(),
        |T| {
            let mut values: Vec<T> = Vec::with_capacity(indices.len());
            for (row, &idx) in indices.iter().enumerate() {
                if column.is_valid(row as u32) {
                    values.push(dict.get::<T>(idx as i64)?);
                } else {
                    values.push(<T as Zeroable>::zeroed());
                }
            }
            column.buffer.assign(bytemuck::cast_slice(&values))
        },
        Err(Error::TypeMismatch(format!(
            "cannot expand dictionary for {:?}",
            column.ptype()
        )))
    )
}

fn untransform_tensor(cset: &mut ColumnSet) -> Result<()> {
    // Offsets first: the data codecs need the restored strides.
    untransform_store(&mut cset.columns[0])?;

    let lengths: Vec<u32> = {
        let cum = cset.columns[0].typed_data::<u32>();
        let mut lengths = Vec::with_capacity(cum.len().saturating_sub(1));
        for pair in cum.windows(2) {
            let stride = pair[1].checked_sub(pair[0]).ok_or_else(|| {
                Error::Corrupt("tensor offsets are not monotonically non-decreasing".into())
            })?;
            lengths.push(stride);
        }
        lengths
    };

    let elem_size = cset.ptype.size();
    let (left, right) = cset.columns.split_at_mut(1);
    let offsets = &left[0];
    let data = &mut right[0];
    let algo = block_algo(data);

    while let Some(meta) = data.transformation_args.pop() {
        let payload = data.raw_data().to_vec();
        verify_stage(&payload, &meta)?;
        match meta.codec {
            Codec::Block => {
                let raw = block::decompress(&payload, algo)?;
                check_output_size(raw.len(), &meta)?;
                data.buffer.assign(&raw)?;
            }
            Codec::QualityRc => {
                let raw = qual::decompress(&payload, meta.u_sz as usize)?;
                data.buffer.assign(&raw)?;
            }
            Codec::SequenceRc => {
                let raw = seq::decompress(&payload, meta.u_sz as usize)?;
                data.buffer.assign(&raw)?;
            }
            Codec::BasePack => {
                let raw = pack::unpack(&payload, meta.u_sz as usize);
                data.buffer.assign(&raw)?;
            }
            Codec::Dict => {
                expand_tensor_dict(offsets, data, &payload, elem_size, algo)?;
                check_output_size(data.buffer.len(), &meta)?;
            }
            Codec::Delta => {
                delta::prefix_sum_in_place(data.buffer.typed_mut::<u32>());
            }
            Codec::PrefixSum => {
                delta::encode_in_place(data.buffer.typed_mut::<u32>());
            }
            Codec::None | Codec::Auto => {}
        }
    }

    verify_original(data)?;
    data.uncompressed_size = data.buffer.len() as u32;
    data.compressed_size = 0;

    // The restored data column must line up with the offsets.
    let total: u64 = lengths.iter().map(|&l| l as u64).sum();
    if total * elem_size as u64 != data.buffer.len() as u64 {
        return Err(Error::Corrupt(format!(
            "tensor data holds {} bytes, offsets account for {}",
            data.buffer.len(),
            total * elem_size as u64
        )));
    }
    Ok(())
}

fn expand_tensor_dict(
    offsets: &ColumnStore,
    data: &mut ColumnStore,
    indices_bytes: &[u8],
    elem_size: usize,
    algo: Compression,
) -> Result<()> {
    let dict = take_dictionary(data, algo)?;
    let indices: Vec<u32> = bytemuck::pod_collect_to_vec(indices_bytes);
    let n_rows = offsets.n_records.saturating_sub(1) as usize;
    if indices.len() != n_rows {
        return Err(Error::Corrupt(format!(
            "dictionary indices cover {} rows, tensor has {}",
            indices.len(),
            n_rows
        )));
    }
    let mut out: Vec<u8> = Vec::new();
    for (row, &idx) in indices.iter().enumerate() {
        if offsets.is_valid(row as u32) {
            out.extend_from_slice(dict.entry(idx as i64, elem_size)?);
        }
    }
    data.buffer.assign(&out)?;
    Ok(())
}
