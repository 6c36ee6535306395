pub mod dict;
pub mod reverse;

use sheaf_core::errors::{Error, Result};
use sheaf_encoding::block::{self, Compression};
use sheaf_encoding::{delta, pack, qual, seq};
use sheaf_format::codec::Codec;
use sheaf_format::meta::{MetaTuple, TransformMeta};
use sheaf_format::ptype::{PrimitiveType, StoreKind};

use crate::column::set::ColumnSet;
use crate::column::store::ColumnStore;
use crate::common::checksum::md5_digest;
use crate::dict::FieldType;

/// Applies an ordered, validated transform chain to a column set, recording
/// one [`TransformMeta`] per stage. The scratch buffer holds each stage's
/// output before it replaces the column payload; callers must not retain
/// references into it across stages.
pub struct Transformer {
    compression: Compression,
    level: i32,
    scratch: Vec<u8>,
}

impl Transformer {
    pub fn new(compression: Compression, level: i32) -> Self {
        Self {
            compression,
            level,
            scratch: Vec::new(),
        }
    }

    /// Chain legality:
    /// - an empty chain selects auto mode;
    /// - auto may not be combined with any other token;
    /// - dictionary encoding at most once, after every other encoding and
    ///   before any compression;
    /// - every encoding must precede every compression.
    pub fn valid_transformation_order(transforms: &[Codec]) -> bool {
        if transforms.len() <= 1 {
            return true;
        }
        if transforms.iter().any(|&c| c == Codec::Auto) {
            return false;
        }
        let n_dict = transforms.iter().filter(|&&c| c == Codec::Dict).count();
        if n_dict > 1 {
            return false;
        }
        if let Some(pos) = transforms.iter().position(|&c| c == Codec::Dict) {
            if transforms[..pos].iter().any(|c| c.is_compression()) {
                return false;
            }
            if transforms[pos + 1..].iter().any(|c| c.is_encoding()) {
                return false;
            }
        }
        if let Some(first_comp) = transforms.iter().position(|c| c.is_compression()) {
            if transforms[first_comp + 1..].iter().any(|c| c.is_encoding()) {
                return false;
            }
        }
        true
    }

    /// Run the field's chain (or auto mode) over the set.
    pub fn transform(&mut self, cset: &mut ColumnSet, field: &FieldType) -> Result<()> {
        if !Self::valid_transformation_order(&field.transforms) {
            return Err(Error::InvalidChain(format!(
                "illegal transform chain for field '{}': {:?}",
                field.name, field.transforms
            )));
        }

        if field.transforms.is_empty() {
            return self.auto_transform(cset);
        }

        for &codec in &field.transforms {
            match codec {
                Codec::Auto => self.auto_transform(cset)?,
                Codec::None => {}
                Codec::Block => self.block_transform(cset)?,
                Codec::QualityRc => self.quality_transform(cset)?,
                Codec::SequenceRc => self.sequence_transform(cset)?,
                Codec::Dict => {
                    self.dictionary_encode(cset)?;
                }
                Codec::Delta => self.delta_transform(cset)?,
                Codec::BasePack => self.base_pack_transform(cset)?,
                Codec::PrefixSum => {
                    return Err(Error::InvalidChain(
                        "prefix-sum is a decode-side codec".into(),
                    ))
                }
            }
        }

        // An explicit chain may only have touched the data column; the
        // offsets column of a tensor set still has to reach disk encoded.
        if cset.kind == StoreKind::Tensor
            && !cset.columns.is_empty()
            && cset.columns[0].transformation_args.is_empty()
        {
            let offsets = &mut cset.columns[0];
            delta_stage(offsets)?;
            self.block_stage(offsets)?;
            self.compress_nullity(offsets, true)?;
        }
        Ok(())
    }

    /// Attempt dictionary encoding; a miss of the cardinality threshold is a
    /// no-op, not an error.
    pub fn dictionary_encode(&mut self, cset: &mut ColumnSet) -> Result<bool> {
        match cset.kind {
            StoreKind::Column => {
                let mut any = false;
                for column in &mut cset.columns {
                    any |= dict::dict_encode_store(column)?;
                }
                Ok(any)
            }
            StoreKind::Tensor => dict::dict_encode_tensor(cset),
        }
    }

    fn auto_transform(&mut self, cset: &mut ColumnSet) -> Result<()> {
        match cset.kind {
            StoreKind::Column => {
                for i in 0..cset.columns.len() {
                    let encoded = dict::dict_encode_store(&mut cset.columns[i])?;
                    let column = &mut cset.columns[i];
                    if encoded {
                        self.compress_dictionary(column)?;
                    }
                    self.compress_nullity(column, false)?;
                    self.block_stage(column)?;
                }
                Ok(())
            }
            StoreKind::Tensor => {
                if cset.columns.len() != 2 {
                    return Err(Error::Corrupt(format!(
                        "tensor set with {} columns",
                        cset.columns.len()
                    )));
                }
                let encoded = dict::dict_encode_tensor(cset)?;
                if encoded {
                    self.compress_dictionary(&mut cset.columns[1])?;
                }
                {
                    let offsets = &mut cset.columns[0];
                    delta_stage(offsets)?;
                    self.block_stage(offsets)?;
                    self.compress_nullity(offsets, true)?;
                }
                self.block_stage(&mut cset.columns[1])?;
                Ok(())
            }
        }
    }

    /// Compress every payload the set owns with the generic block codec.
    /// For tensor sets only the data column is touched here; the offsets
    /// column is handled by the residual pass.
    fn block_transform(&mut self, cset: &mut ColumnSet) -> Result<()> {
        match cset.kind {
            StoreKind::Column => {
                for column in &mut cset.columns {
                    self.compress_nullity(column, false)?;
                    self.block_stage(column)?;
                }
                Ok(())
            }
            StoreKind::Tensor => self.block_stage(&mut cset.columns[1]),
        }
    }

    fn quality_transform(&mut self, cset: &mut ColumnSet) -> Result<()> {
        let lengths = self.begin_tensor_codec(cset, Codec::QualityRc)?;
        let data = &mut cset.columns[1];
        note_original(data);
        let n_in = data.buffer.len() as i64;
        self.scratch = qual::compress(data.raw_data(), &lengths)?;
        finish_stage(data, Codec::QualityRc, n_in, &self.scratch)?;
        self.finish_tensor_codec(cset)
    }

    fn sequence_transform(&mut self, cset: &mut ColumnSet) -> Result<()> {
        let lengths = self.begin_tensor_codec(cset, Codec::SequenceRc)?;
        let data = &mut cset.columns[1];
        note_original(data);
        let n_in = data.buffer.len() as i64;
        self.scratch = seq::compress(data.raw_data(), &lengths)?;
        finish_stage(data, Codec::SequenceRc, n_in, &self.scratch)?;
        self.finish_tensor_codec(cset)
    }

    /// Shared preamble of the record-oriented codecs: delta the offsets so
    /// per-row strides are directly available.
    fn begin_tensor_codec(&mut self, cset: &mut ColumnSet, codec: Codec) -> Result<Vec<u32>> {
        if cset.kind != StoreKind::Tensor {
            return Err(Error::TypeMismatch(format!(
                "{} applies to tensor sets only",
                codec
            )));
        }
        if cset.columns.len() != 2 {
            return Err(Error::Corrupt(format!(
                "tensor set with {} columns",
                cset.columns.len()
            )));
        }
        let offsets = &mut cset.columns[0];
        delta_stage(offsets)?;
        // After delta the entries are [0, stride0, stride1, ...].
        Ok(offsets.typed_data::<u32>()[1..].to_vec())
    }

    fn finish_tensor_codec(&mut self, cset: &mut ColumnSet) -> Result<()> {
        let offsets = &mut cset.columns[0];
        self.block_stage(offsets)?;
        self.compress_nullity(offsets, true)
    }

    fn delta_transform(&mut self, cset: &mut ColumnSet) -> Result<()> {
        match cset.kind {
            StoreKind::Column => {
                for column in &mut cset.columns {
                    delta_stage(column)?;
                }
                Ok(())
            }
            StoreKind::Tensor => delta_stage(&mut cset.columns[0]),
        }
    }

    fn base_pack_transform(&mut self, cset: &mut ColumnSet) -> Result<()> {
        let target = match cset.kind {
            StoreKind::Column => {
                if cset.columns.len() != 1 {
                    return Err(Error::TypeMismatch(
                        "base packing applies to single-column sets".into(),
                    ));
                }
                &mut cset.columns[0]
            }
            StoreKind::Tensor => &mut cset.columns[1],
        };
        if target.ptype().size() != 1 {
            return Err(Error::TypeMismatch(format!(
                "base packing requires byte elements, got {:?}",
                target.ptype()
            )));
        }
        note_original(target);
        let n_in = target.buffer.len() as i64;
        self.scratch = pack::pack(target.raw_data());
        finish_stage(target, Codec::BasePack, n_in, &self.scratch)
    }

    /// Block-compress one column payload, appending a stage that records the
    /// concrete algorithm in a metadata tuple.
    pub(crate) fn block_stage(&mut self, column: &mut ColumnStore) -> Result<()> {
        note_original(column);
        let n_in = column.buffer.len() as i64;
        self.scratch = block::compress(column.raw_data(), self.compression, self.level)?;
        let n_out = self.scratch.len() as i64;
        column.buffer.assign(&self.scratch)?;
        column.compressed_size = n_out as u32;
        let mut meta = TransformMeta::new(Codec::Block, n_in, n_out).with_tuple(MetaTuple::new(
            PrimitiveType::UInt8,
            vec![self.compression as u8],
        ));
        meta.set_checksum(md5_digest(&self.scratch));
        column.transformation_args.push(meta);
        log::trace!("block stage: {} -> {} bytes", n_in, n_out);
        Ok(())
    }

    /// Compress the nullity bitmap in place. The bitmap is required for
    /// tensor offset columns; elsewhere its absence is tolerated.
    pub(crate) fn compress_nullity(&mut self, column: &mut ColumnStore, required: bool) -> Result<()> {
        let raw = match column.nullity_bytes() {
            Some(bytes) => bytes.to_vec(),
            None => {
                if required {
                    return Err(Error::Corrupt(
                        "nullity bitmap absent where required".into(),
                    ));
                }
                return Ok(());
            }
        };
        self.scratch = block::compress(&raw, self.compression, self.level)?;
        let bitmap = column.nullity.as_mut().unwrap();
        bitmap.assign(&self.scratch)?;
        column.nullity_u = raw.len() as u32;
        column.nullity_c = self.scratch.len() as u32;
        Ok(())
    }

    fn compress_dictionary(&mut self, column: &mut ColumnStore) -> Result<()> {
        let Some(dict) = column.dictionary.as_mut() else {
            return Ok(());
        };
        self.scratch = block::compress(&dict.data, self.compression, self.level)?;
        dict.sz_c = self.scratch.len() as i64;
        dict.data = std::mem::take(&mut self.scratch);
        if dict.have_lengths {
            self.scratch = block::compress(&dict.lengths, self.compression, self.level)?;
            dict.sz_lc = self.scratch.len() as i64;
            dict.lengths = std::mem::take(&mut self.scratch);
        }
        log::debug!(
            "dictionary compressed: {} -> {} bytes ({} entries)",
            dict.sz_u,
            dict.sz_c,
            dict.n_records
        );
        Ok(())
    }
}

/// Capture the pre-transform payload digest exactly once, before the first
/// stage rewrites the buffer.
pub(crate) fn note_original(column: &mut ColumnStore) {
    if column.transformation_args.is_empty() {
        column.payload_md5 = md5_digest(column.raw_data());
    }
}

/// Record one finished stage: replace the payload and append its metadata.
fn finish_stage(
    column: &mut ColumnStore,
    codec: Codec,
    n_in: i64,
    output: &[u8],
) -> Result<()> {
    column.buffer.assign(output)?;
    column.compressed_size = output.len() as u32;
    let mut meta = TransformMeta::new(codec, n_in, output.len() as i64);
    meta.set_checksum(md5_digest(output));
    column.transformation_args.push(meta);
    Ok(())
}

/// In-place forward differences over a u32 column, kept as its own stage so
/// the prefix-sum inverse can find it on decode.
fn delta_stage(column: &mut ColumnStore) -> Result<()> {
    if column.ptype() != PrimitiveType::UInt32 {
        return Err(Error::TypeMismatch(format!(
            "delta encoding requires u32 columns, got {:?}",
            column.ptype()
        )));
    }
    if column.buffer.len() != column.n_records as usize * 4 {
        return Err(Error::TypeMismatch(
            "delta encoding requires an untransformed scalar payload".into(),
        ));
    }
    note_original(column);
    delta::encode_in_place(column.buffer.typed_mut::<u32>());
    let len = column.buffer.len() as i64;
    column.compressed_size = len as u32;
    let mut meta = TransformMeta::new(Codec::Delta, len, len);
    meta.set_checksum(md5_digest(column.raw_data()));
    column.transformation_args.push(meta);
    Ok(())
}
