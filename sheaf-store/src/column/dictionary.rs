use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sheaf_core::errors::{Error, Result};
use sheaf_format::ptype::Primitive;

/// Side table of distinct values attached to a dictionary-encoded column.
///
/// Fixed-width columns store the distinct values back to back. Tensor
/// columns additionally carry a u32 length table (`have_lengths`), with the
/// data section holding the concatenated entry bytes.
#[derive(Debug, Default)]
pub struct ColumnDictionary {
    pub have_lengths: bool,
    pub n_records: i64,
    pub n_elements: i64,
    pub sz_u: i64,
    pub sz_c: i64,
    pub sz_lu: i64,
    pub sz_lc: i64,
    pub(crate) data: Vec<u8>,
    pub(crate) lengths: Vec<u8>,
}

impl ColumnDictionary {
    pub(crate) fn fixed(data: Vec<u8>, n_records: i64) -> Self {
        Self {
            have_lengths: false,
            n_records,
            n_elements: n_records,
            sz_u: data.len() as i64,
            sz_c: 0,
            sz_lu: 0,
            sz_lc: 0,
            data,
            lengths: Vec::new(),
        }
    }

    pub(crate) fn tensor(data: Vec<u8>, lengths: Vec<u32>, n_elements: i64) -> Self {
        let n_records = lengths.len() as i64;
        let length_bytes: Vec<u8> = lengths.iter().flat_map(|l| l.to_le_bytes()).collect();
        Self {
            have_lengths: true,
            n_records,
            n_elements,
            sz_u: data.len() as i64,
            sz_c: 0,
            sz_lu: length_bytes.len() as i64,
            sz_lc: 0,
            data,
            lengths: length_bytes,
        }
    }

    pub fn is_tensor_based(&self) -> bool {
        self.have_lengths
    }

    pub fn is_compressed(&self) -> bool {
        self.sz_c > 0
    }

    /// Distinct value lookup for fixed-width dictionaries. The data section
    /// must be in its uncompressed form.
    pub fn get<T: Primitive>(&self, index: i64) -> Result<T> {
        if self.have_lengths {
            return Err(Error::TypeMismatch(
                "scalar lookup on a variable-length dictionary".into(),
            ));
        }
        if self.sz_u as usize % std::mem::size_of::<T>() != 0 {
            return Err(Error::TypeMismatch(format!(
                "dictionary of {} bytes does not hold {}-byte values",
                self.sz_u,
                std::mem::size_of::<T>()
            )));
        }
        if index < 0 || index >= self.n_records {
            return Err(Error::IndexOutOfBound(index as usize, self.n_records as usize));
        }
        let size = std::mem::size_of::<T>();
        let start = index as usize * size;
        Ok(bytemuck::pod_read_unaligned(&self.data[start..start + size]))
    }

    fn length_at(&self, index: usize) -> u32 {
        let bytes: [u8; 4] = self.lengths[index * 4..index * 4 + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    /// Length (in elements) of one tensor dictionary entry.
    pub fn entry_len(&self, index: i64) -> Result<u32> {
        if !self.have_lengths {
            return Err(Error::TypeMismatch(
                "entry lookup on a fixed-width dictionary".into(),
            ));
        }
        if index < 0 || index >= self.n_records {
            return Err(Error::IndexOutOfBound(index as usize, self.n_records as usize));
        }
        Ok(self.length_at(index as usize))
    }

    /// Bytes of one tensor dictionary entry, given the element size of the
    /// owning column.
    pub fn entry(&self, index: i64, elem_size: usize) -> Result<&[u8]> {
        self.entry_len(index)?;
        let start: usize = (0..index as usize)
            .map(|i| self.length_at(i) as usize * elem_size)
            .sum();
        let len = self.length_at(index as usize) as usize * elem_size;
        self.data
            .get(start..start + len)
            .ok_or_else(|| Error::Corrupt("dictionary entry exceeds data section".into()))
    }

    /// Count how many dictionary values equal `needle`. For tensor
    /// dictionaries every element of every entry participates, so this
    /// answers "could any stride contain this value". The data section must
    /// be in its uncompressed form.
    pub fn contains<T: Primitive>(&self, needle: T) -> Result<i64> {
        let size = std::mem::size_of::<T>();
        if self.sz_u as usize % size != 0 {
            return Err(Error::TypeMismatch(format!(
                "dictionary of {} bytes does not hold {}-byte values",
                self.sz_u, size
            )));
        }
        let count = if self.have_lengths {
            self.n_elements
        } else {
            self.n_records
        };
        if count as usize * size > self.data.len() {
            return Err(Error::TypeMismatch(format!(
                "{} values of {} bytes exceed the {}-byte data section",
                count,
                size,
                self.data.len()
            )));
        }
        let mut matches = 0i64;
        for i in 0..count as usize {
            let v: T = bytemuck::pod_read_unaligned(&self.data[i * size..(i + 1) * size]);
            matches += i64::from(v == needle);
        }
        Ok(matches)
    }

    /// Count tensor entries exactly equal to `needle`.
    pub fn contains_entry<T: Primitive>(&self, needle: &[T]) -> Result<i64> {
        if !self.have_lengths {
            return Err(Error::TypeMismatch(
                "entry match on a fixed-width dictionary".into(),
            ));
        }
        let needle_bytes: &[u8] = bytemuck::cast_slice(needle);
        let elem_size = std::mem::size_of::<T>();
        let mut matches = 0i64;
        let mut offset = 0usize;
        for i in 0..self.n_records as usize {
            let len = self.length_at(i) as usize * elem_size;
            let entry = self
                .data
                .get(offset..offset + len)
                .ok_or_else(|| Error::Corrupt("dictionary entry exceeds data section".into()))?;
            matches += i64::from(entry == needle_bytes);
            offset += len;
        }
        Ok(matches)
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(u8::from(self.have_lengths))?;
        w.write_i64::<LittleEndian>(self.n_records)?;
        w.write_i64::<LittleEndian>(self.n_elements)?;
        w.write_i64::<LittleEndian>(self.sz_u)?;
        w.write_i64::<LittleEndian>(self.sz_c)?;
        w.write_i64::<LittleEndian>(self.sz_lu)?;
        w.write_i64::<LittleEndian>(self.sz_lc)?;
        w.write_all(&self.data)?;
        if self.have_lengths {
            w.write_all(&self.lengths)?;
        }
        Ok(())
    }

    pub fn deserialize<R: std::io::Read>(r: &mut R) -> Result<Self> {
        let have_lengths = r.read_u8()? != 0;
        let n_records = r.read_i64::<LittleEndian>()?;
        let n_elements = r.read_i64::<LittleEndian>()?;
        let sz_u = r.read_i64::<LittleEndian>()?;
        let sz_c = r.read_i64::<LittleEndian>()?;
        let sz_lu = r.read_i64::<LittleEndian>()?;
        let sz_lc = r.read_i64::<LittleEndian>()?;
        for v in [n_records, n_elements, sz_u, sz_c, sz_lu, sz_lc] {
            if v < 0 {
                return Err(Error::Corrupt(format!("negative dictionary size: {}", v)));
            }
        }
        let data_len = if sz_c > 0 { sz_c } else { sz_u } as usize;
        let mut data = vec![0u8; data_len];
        r.read_exact(&mut data)?;
        let mut lengths = Vec::new();
        if have_lengths {
            let lengths_len = if sz_lc > 0 { sz_lc } else { sz_lu } as usize;
            lengths = vec![0u8; lengths_len];
            r.read_exact(&mut lengths)?;
        }
        Ok(Self {
            have_lengths,
            n_records,
            n_elements,
            sz_u,
            sz_c,
            sz_lu,
            sz_lc,
            data,
            lengths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_lookup() {
        let values = [10i32, -5, 42];
        let dict = ColumnDictionary::fixed(bytemuck::cast_slice(&values).to_vec(), 3);
        assert_eq!(dict.get::<i32>(0).unwrap(), 10);
        assert_eq!(dict.get::<i32>(2).unwrap(), 42);
        assert!(dict.get::<i32>(3).is_err());
        assert!(dict.get::<i64>(0).is_err());
        assert!(dict.entry(0, 4).is_err());
    }

    #[test]
    fn test_tensor_entries() {
        let data = b"ACGTTT".to_vec();
        let dict = ColumnDictionary::tensor(data, vec![4, 2], 6);
        assert_eq!(dict.entry(0, 1).unwrap(), b"ACGT");
        assert_eq!(dict.entry(1, 1).unwrap(), b"TT");
        assert!(dict.entry(2, 1).is_err());
        assert!(dict.get::<u8>(0).is_err());
    }

    #[test]
    fn test_contains_fixed() {
        let values = [4i32, 21, 9, 504];
        let dict = ColumnDictionary::fixed(bytemuck::cast_slice(&values).to_vec(), 4);
        assert_eq!(dict.contains(21i32).unwrap(), 1);
        assert_eq!(dict.contains(1i32).unwrap(), 0);
        assert!(dict.contains(21i64).is_err());
    }

    #[test]
    fn test_contains_tensor_elements_and_entries() {
        let dict = ColumnDictionary::tensor(b"ACGTTT".to_vec(), vec![4, 2], 6);
        // any-element match
        assert_eq!(dict.contains(b'T').unwrap(), 3);
        assert_eq!(dict.contains(b'X').unwrap(), 0);
        // exact-entry match
        assert_eq!(dict.contains_entry(b"ACGT").unwrap(), 1);
        assert_eq!(dict.contains_entry(b"TT").unwrap(), 1);
        assert_eq!(dict.contains_entry(b"ACG").unwrap(), 0);
        assert_eq!(dict.contains_entry(b"AC").unwrap(), 0);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let dict = ColumnDictionary::tensor(b"abcde".to_vec(), vec![2, 3], 5);
        let mut bytes = Vec::new();
        dict.serialize(&mut bytes).unwrap();
        let back = ColumnDictionary::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(back.have_lengths, true);
        assert_eq!(back.n_records, 2);
        assert_eq!(back.data, b"abcde");
        assert_eq!(back.entry(1, 1).unwrap(), b"cde");
    }
}
