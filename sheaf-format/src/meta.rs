use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sheaf_core::errors::{Error, Result};

use crate::codec::Codec;
use crate::ptype::PrimitiveType;

/// Side-band parameters a transform stage wants its decoder to see, e.g.
/// which block algorithm compressed the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaTuple {
    pub ptype: PrimitiveType,
    pub data: Vec<u8>,
}

impl MetaTuple {
    pub fn new(ptype: PrimitiveType, data: Vec<u8>) -> Self {
        Self { ptype, data }
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(self.ptype as u8)?;
        w.write_i32::<LittleEndian>(self.data.len() as i32)?;
        w.write_all(&self.data)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let ptype = PrimitiveType::from_u8(r.read_u8()?)?;
        let n_data = r.read_i32::<LittleEndian>()?;
        if n_data < 0 {
            return Err(Error::Corrupt(format!(
                "negative tuple length: {}",
                n_data
            )));
        }
        let mut data = vec![0u8; n_data as usize];
        r.read_exact(&mut data)?;
        Ok(Self { ptype, data })
    }
}

/// Per-stage record of one applied transform: codec identity, input and
/// output sizes, and the MD5 of the stage's output. Reversing a column's
/// chain walks these back-to-front, verifying each digest.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformMeta {
    pub codec: Codec,
    pub u_sz: i64,
    pub c_sz: i64,
    pub md5: [u8; 16],
    pub tuples: Vec<MetaTuple>,
}

impl TransformMeta {
    pub fn new(codec: Codec, u_sz: i64, c_sz: i64) -> Self {
        Self {
            codec,
            u_sz,
            c_sz,
            md5: [0u8; 16],
            tuples: Vec::new(),
        }
    }

    pub fn set_checksum(&mut self, md5: [u8; 16]) {
        self.md5 = md5;
    }

    pub fn with_tuple(mut self, tuple: MetaTuple) -> Self {
        self.tuples.push(tuple);
        self
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LittleEndian>(self.codec as u32)?;
        w.write_i64::<LittleEndian>(self.u_sz)?;
        w.write_i64::<LittleEndian>(self.c_sz)?;
        w.write_all(&self.md5)?;
        w.write_i64::<LittleEndian>(self.tuples.len() as i64)?;
        for tuple in &self.tuples {
            tuple.serialize(w)?;
        }
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self> {
        let codec = Codec::from_u32(r.read_u32::<LittleEndian>()?)?;
        let u_sz = r.read_i64::<LittleEndian>()?;
        let c_sz = r.read_i64::<LittleEndian>()?;
        let mut md5 = [0u8; 16];
        r.read_exact(&mut md5)?;
        let n_tuples = r.read_i64::<LittleEndian>()?;
        if !(0..=u16::MAX as i64).contains(&n_tuples) {
            return Err(Error::Corrupt(format!(
                "implausible tuple count: {}",
                n_tuples
            )));
        }
        let mut tuples = Vec::with_capacity(n_tuples as usize);
        for _ in 0..n_tuples {
            tuples.push(MetaTuple::deserialize(r)?);
        }
        Ok(Self {
            codec,
            u_sz,
            c_sz,
            md5,
            tuples,
        })
    }
}
