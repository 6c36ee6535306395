use bytemuck::Zeroable;
use sheaf_core::errors::{Error, Result};
use sheaf_format::dispatch_primitive;
use sheaf_format::ptype::{Primitive, PrimitiveType, StoreKind};

use crate::column::store::ColumnStore;
use crate::common::checksum::md5_digest;

/// All column stores backing one logical field within one batch.
///
/// Fixed-width fields hold one store per observed multiplicity slot; rows
/// narrower than the widest are null-padded in the trailing stores. Tensor
/// fields hold exactly two stores: u32 offsets and the element data.
pub struct ColumnSet {
    pub kind: StoreKind,
    pub ptype: PrimitiveType,
    pub columns: Vec<ColumnStore>,
    /// MD5 over the concatenated per-store payload digests; detects
    /// accidental reordering of the set.
    pub md5_checksum: [u8; 16],
}

impl ColumnSet {
    pub fn new(kind: StoreKind, ptype: PrimitiveType) -> Self {
        Self {
            kind,
            ptype,
            columns: Vec::new(),
            md5_checksum: [0u8; 16],
        }
    }

    pub fn size(&self) -> usize {
        self.columns.len()
    }

    /// Rows this set has accepted, counting null padding.
    pub fn logical_rows(&self) -> u32 {
        match self.kind {
            StoreKind::Column => self.columns.first().map(|c| c.n_records).unwrap_or(0),
            StoreKind::Tensor => self
                .columns
                .first()
                .map(|c| c.n_records.saturating_sub(1))
                .unwrap_or(0),
        }
    }

    pub fn memory_usage(&self) -> u32 {
        self.columns.iter().map(|c| c.memory_usage()).sum()
    }

    pub fn column_lengths(&self) -> Vec<i64> {
        self.columns.iter().map(|c| c.n_records as i64).collect()
    }

    fn check_type<T: Primitive>(&self) -> Result<()> {
        if T::PTYPE != self.ptype {
            return Err(Error::TypeMismatch(format!(
                "column set holds {:?}, not {:?}",
                self.ptype,
                T::PTYPE
            )));
        }
        Ok(())
    }

    /// Append one row. Scalars are one-element slices; wider slices grow the
    /// set (fixed-width) or advance the offsets column (tensor).
    pub fn append<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        match self.kind {
            StoreKind::Column => self.append_fixed(values),
            StoreKind::Tensor => self.append_tensor(values),
        }
    }

    fn append_fixed<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        self.check_type::<T>()?;
        if self.columns.is_empty() && values.is_empty() {
            self.columns.push(ColumnStore::new(self.ptype));
        }

        // Grow to the new multiplicity; every pre-existing row in a freshly
        // created trailing column is null.
        if values.len() > self.columns.len() {
            let start = self.columns.len();
            let padding_to = self.columns.first().map(|c| c.n_records).unwrap_or(0);
            for _ in start..values.len() {
                self.columns.push(ColumnStore::new(self.ptype));
            }
            for column in &mut self.columns[start..] {
                for _ in 0..padding_to {
                    column.append_validity(false, 0)?;
                    column.append(T::zeroed())?;
                }
            }
        }

        for (column, &value) in self.columns.iter_mut().zip(values.iter()) {
            column.append_validity(true, 0)?;
            column.append(value)?;
        }
        for column in &mut self.columns[values.len()..] {
            column.append_validity(false, 0)?;
            column.append(T::zeroed())?;
        }
        Ok(())
    }

    fn append_tensor<T: Primitive>(&mut self, values: &[T]) -> Result<()> {
        self.check_type::<T>()?;
        self.ensure_tensor_columns();
        let (offsets, data) = self.tensor_columns_mut();

        // The first row seeds the leading zero so strides resolve in
        // constant time; later rows append one cumulative entry.
        if offsets.n_records == 0 {
            offsets.append_validity(true, 0)?;
            offsets.append(0u32)?;
            offsets.append(values.len() as u32)?;
        } else {
            let cum = offsets.typed_data::<u32>()[offsets.n_records as usize - 1];
            offsets.append_validity(true, 1)?;
            offsets.append(cum + values.len() as u32)?;
        }

        if !values.is_empty() {
            data.append_array(values)?;
        }
        Ok(())
    }

    /// Append a null row in the shape-appropriate way: zero values in every
    /// fixed-width column, or a zero-length stride in the offsets column.
    pub fn pad_null(&mut self) -> Result<()> {
        match self.kind {
            StoreKind::Column => {
                if self.columns.is_empty() {
                    self.columns.push(ColumnStore::new(self.ptype));
                }
                for column in &mut self.columns {
                    column.append_validity(false, 0)?;
                    append_zero(column)?;
                }
                Ok(())
            }
            StoreKind::Tensor => {
                self.ensure_tensor_columns();
                let (offsets, _) = self.tensor_columns_mut();
                if offsets.n_records == 0 {
                    offsets.append_validity(false, 0)?;
                    offsets.append(0u32)?;
                    offsets.append(0u32)?;
                } else {
                    let cum = offsets.typed_data::<u32>()[offsets.n_records as usize - 1];
                    offsets.append_validity(false, 0)?;
                    offsets.append(cum)?;
                }
                Ok(())
            }
        }
    }

    fn ensure_tensor_columns(&mut self) {
        if self.columns.is_empty() {
            self.columns.push(ColumnStore::new(PrimitiveType::UInt32));
            self.columns.push(ColumnStore::new(self.ptype));
        }
    }

    pub(crate) fn tensor_columns_mut(&mut self) -> (&mut ColumnStore, &mut ColumnStore) {
        let (offsets, rest) = self.columns.split_at_mut(1);
        (&mut offsets[0], &mut rest[0])
    }

    pub fn is_valid(&self, row: u32) -> bool {
        self.columns.first().map(|c| c.is_valid(row)).unwrap_or(false)
    }

    /// Scalar accessor; only meaningful on fixed-width sets.
    pub fn get<T: Primitive>(&self, row: u32) -> Result<T> {
        if self.kind != StoreKind::Column {
            return Err(Error::TypeMismatch(
                "scalar access on a tensor set; use get_slice".into(),
            ));
        }
        self.columns
            .first()
            .ok_or(Error::IndexOutOfBound(row as usize, 0))?
            .get(row)
    }

    /// Stride accessor; only meaningful on tensor sets.
    pub fn get_slice<T: Primitive>(&self, row: u32) -> Result<&[T]> {
        if self.kind != StoreKind::Tensor {
            return Err(Error::TypeMismatch(
                "stride access on a fixed-width set; use get".into(),
            ));
        }
        self.check_type::<T>()?;
        if row >= self.logical_rows() {
            return Err(Error::IndexOutOfBound(
                row as usize,
                self.logical_rows() as usize,
            ));
        }
        let offsets = self.columns[0].typed_data::<u32>();
        let (start, end) = (offsets[row as usize], offsets[row as usize + 1]);
        Ok(&self.columns[1].typed_data::<T>()[start as usize..end as usize])
    }

    /// Refresh the set digest from the per-store payload digests.
    pub fn update_checksum(&mut self) {
        let mut concatenated = Vec::with_capacity(self.columns.len() * 16);
        for column in &self.columns {
            if column.transformation_args.is_empty() {
                concatenated.extend_from_slice(&md5_digest(column.raw_data()));
            } else {
                concatenated.extend_from_slice(&column.payload_md5);
            }
        }
        self.md5_checksum = md5_digest(&concatenated);
    }
}

fn append_zero(column: &mut ColumnStore) -> Result<()> {
    dispatch_primitive!(
        column.ptype(),
        |T| column.append(<T as Zeroable>::zeroed()),
        Err(Error::TypeMismatch(format!(
            "cannot null-pad a column of {:?}",
            column.ptype()
        )))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_set() {
        let mut set = ColumnSet::new(StoreKind::Column, PrimitiveType::Double);
        set.append(&[1.0f64]).unwrap();
        set.append(&[2.0f64]).unwrap();
        assert_eq!(set.size(), 1);
        assert_eq!(set.logical_rows(), 2);
        assert_eq!(set.get::<f64>(1).unwrap(), 2.0);
        assert!(set.get_slice::<f64>(0).is_err());
    }

    #[test]
    fn test_vector_growth_null_pads_earlier_rows() {
        let mut set = ColumnSet::new(StoreKind::Column, PrimitiveType::Int32);
        set.append(&[1i32]).unwrap();
        set.append(&[2i32, 3]).unwrap();
        set.append(&[4i32]).unwrap();

        assert_eq!(set.size(), 2);
        for column in &set.columns {
            assert_eq!(column.n_records, 3);
        }
        assert!(set.columns[0].is_valid(0));
        assert!(!set.columns[1].is_valid(0));
        assert!(set.columns[1].is_valid(1));
        assert!(!set.columns[1].is_valid(2));
        assert_eq!(set.columns[1].get::<i32>(1).unwrap(), 3);
    }

    #[test]
    fn test_tensor_offsets() {
        let mut set = ColumnSet::new(StoreKind::Tensor, PrimitiveType::UInt8);
        set.append(b"A".as_slice()).unwrap();
        set.append(b"BC".as_slice()).unwrap();
        set.append(b"DEF".as_slice()).unwrap();

        assert_eq!(set.size(), 2);
        assert_eq!(set.logical_rows(), 3);
        assert_eq!(set.columns[0].typed_data::<u32>(), &[0, 1, 3, 6]);
        assert_eq!(set.columns[1].n_elements, 6);
        assert_eq!(set.get_slice::<u8>(1).unwrap(), b"BC");
        assert!(set.get_slice::<u8>(3).is_err());
    }

    #[test]
    fn test_tensor_null_rows_have_zero_stride() {
        let mut set = ColumnSet::new(StoreKind::Tensor, PrimitiveType::UInt8);
        set.append(b"AB".as_slice()).unwrap();
        set.pad_null().unwrap();
        set.append(b"C".as_slice()).unwrap();

        assert_eq!(set.columns[0].typed_data::<u32>(), &[0, 2, 2, 3]);
        assert!(set.is_valid(0));
        assert!(!set.is_valid(1));
        assert!(set.is_valid(2));
        assert_eq!(set.get_slice::<u8>(1).unwrap(), b"");
    }

    #[test]
    fn test_pad_null_first() {
        let mut set = ColumnSet::new(StoreKind::Tensor, PrimitiveType::UInt8);
        set.pad_null().unwrap();
        set.append(b"XY".as_slice()).unwrap();
        assert_eq!(set.columns[0].typed_data::<u32>(), &[0, 0, 2]);
        assert_eq!(set.logical_rows(), 2);
        assert!(!set.is_valid(0));
        assert!(set.is_valid(1));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut set = ColumnSet::new(StoreKind::Column, PrimitiveType::Int32);
        assert!(set.append(&[1i64]).is_err());
    }
}
