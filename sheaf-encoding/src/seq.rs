//! Context-adaptive compressor for DNA sequences. ACGT runs through a
//! [`BaseModel`] selected by a sliding window of the previous
//! [`CONTEXT_BASES`] bases (2 bits each); N is flagged by a separate binary
//! model so the base window only ever sees real bases. Any byte outside
//! ACGTN is treated as N.

use sheaf_core::errors::{Error, Result};

use crate::freq::FrequencyModel;
use crate::model::BaseModel;
use crate::rangecoder::{RangeDecoder, RangeEncoder};

/// Bases of preceding context; the context is 2*CONTEXT_BASES bits wide.
pub const CONTEXT_BASES: usize = 10;

const CTX_MASK: u32 = (1 << (2 * CONTEXT_BASES)) - 1;
/// Seed corresponding to a word unlikely to occur in natural sequence.
const CTX_SEED: u32 = 0x7616c7 & CTX_MASK;

const DECODE: &[u8; 5] = b"ACGTN";

fn code_table() -> [u8; 256] {
    let mut table = [4u8; 256];
    table[b'A' as usize] = 0;
    table[b'a' as usize] = 0;
    table[b'C' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'G' as usize] = 2;
    table[b'g' as usize] = 2;
    table[b'T' as usize] = 3;
    table[b't' as usize] = 3;
    table
}

/// Compress concatenated reads; `lengths` gives the per-read strides.
/// The context window deliberately carries across read boundaries.
pub fn compress(bases: &[u8], lengths: &[u32]) -> Result<Vec<u8>> {
    let total: u64 = lengths.iter().map(|&l| l as u64).sum();
    if total != bases.len() as u64 {
        return Err(Error::General(format!(
            "stride sum {} does not cover {} input bytes",
            total,
            bases.len()
        )));
    }

    let table = code_table();
    let mut models = vec![BaseModel::new(); 1 << (2 * CONTEXT_BASES)];
    let mut n_model = FrequencyModel::<2>::new();
    let mut rc = RangeEncoder::new();
    let mut last = CTX_SEED;

    let mut off = 0usize;
    for &len in lengths {
        for &base in &bases[off..off + len as usize] {
            let b = table[base as usize];
            if b == 4 {
                n_model.encode(&mut rc, 1);
            } else {
                n_model.encode(&mut rc, 0);
                models[last as usize].encode(&mut rc, b);
                last = (last * 4 + b as u32) & CTX_MASK;
            }
        }
        off += len as usize;
    }

    Ok(rc.finish())
}

pub fn decompress(input: &[u8], n_out: usize) -> Result<Vec<u8>> {
    let mut models = vec![BaseModel::new(); 1 << (2 * CONTEXT_BASES)];
    let mut n_model = FrequencyModel::<2>::new();
    let mut rc = RangeDecoder::new(input);
    let mut last = CTX_SEED;

    let mut out = Vec::with_capacity(n_out);
    for _ in 0..n_out {
        if n_model.decode(&mut rc) == 1 {
            out.push(b'N');
        } else {
            let b = models[last as usize].decode(&mut rc);
            out.push(DECODE[b as usize]);
            last = (last * 4 + b as u32) & CTX_MASK;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_reads(rng: &mut StdRng, n_reads: usize, len: usize) -> (Vec<u8>, Vec<u32>) {
        let mut bases = Vec::new();
        let mut lengths = Vec::new();
        for _ in 0..n_reads {
            for _ in 0..len {
                let b = match rng.gen_range(0..100) {
                    0..=23 => b'A',
                    24..=47 => b'C',
                    48..=71 => b'G',
                    72..=95 => b'T',
                    _ => b'N',
                };
                bases.push(b);
            }
            lengths.push(len as u32);
        }
        (bases, lengths)
    }

    #[test]
    fn test_roundtrip_random() {
        let mut rng = StdRng::seed_from_u64(1234);
        let (bases, lengths) = random_reads(&mut rng, 200, 150);
        let comp = compress(&bases, &lengths).unwrap();
        let back = decompress(&comp, bases.len()).unwrap();
        assert_eq!(back, bases);
    }

    #[test]
    fn test_repetitive_sequence_compresses() {
        let motif = b"ACGTACGGTTCA";
        let bases: Vec<u8> = motif.iter().cycle().take(60_000).copied().collect();
        let lengths = vec![100u32; 600];
        let comp = compress(&bases, &lengths).unwrap();
        assert!(comp.len() < bases.len() / 8);
        assert_eq!(decompress(&comp, bases.len()).unwrap(), bases);
    }

    #[test]
    fn test_non_acgtn_maps_to_n() {
        let bases = b"ACGTXRYacgt".to_vec();
        let lengths = vec![bases.len() as u32];
        let comp = compress(&bases, &lengths).unwrap();
        let back = decompress(&comp, bases.len()).unwrap();
        assert_eq!(back, b"ACGTNNNACGT");
    }

    #[test]
    fn test_zero_length_strides() {
        let bases = b"ACGT".to_vec();
        let lengths = vec![0, 2, 0, 2, 0];
        let comp = compress(&bases, &lengths).unwrap();
        assert_eq!(decompress(&comp, 4).unwrap(), bases);
    }

    #[test]
    fn test_stride_mismatch_rejected() {
        assert!(compress(b"ACGT", &[3]).is_err());
    }
}
