//! Context-adaptive compressor for quality strings (stream format 5).
//!
//! Each quality symbol is coded by a [`FrequencyModel`] chosen from a pool of
//! 65536 by a 16-bit context blending: the previous quality values (shifted
//! and masked), a positional bucket from a stored position table, an optional
//! strand bit, and a running symbol-change counter bounded at 255. Small
//! alphabets are remapped through a stored symbol map. Per-record lengths are
//! coded through four byte-wide models unless all records share one length,
//! and records identical to their predecessor can be coded as a single
//! duplicate bit.
//!
//! The header records every decision, so decoding is self-contained:
//! version, flags, max symbol, three packed nibble pairs, then the optional
//! symbol map and run-length coded context tables.

use sheaf_core::errors::{Error, Result};

use crate::freq::FrequencyModel;
use crate::rangecoder::{RangeDecoder, RangeEncoder};
use crate::rle::{read_array, store_array};

const STREAM_FORMAT: u8 = 5;

/// approx sqrt(delta), must be sequential
const DSQR: [u32; 64] = [
    0, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, //
    4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, 5, 5, 5, //
    5, 5, 5, 5, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, //
    6, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
];

/// Tuning rows: qctxbits, qctxshift, pctxbits, pctxshift, dctxbits,
/// dctxshift, qloc, sloc, ploc, dloc. Row 0 is the general-purpose default;
/// the others fit particular instrument profiles.
const STRAT_OPTS: [[i32; 10]; 5] = [
    [10, 5, 4, -1, 2, 1, 0, 9, 10, 14],
    [9, 5, 7, 0, 2, 0, 7, 15, 0, 14],
    [12, 6, 2, 0, 2, 3, 0, 9, 12, 14],
    [12, 6, 0, 0, 0, 0, 0, 12, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
];

pub fn compress(quals: &[u8], lengths: &[u32]) -> Result<Vec<u8>> {
    compress_with_strategy(quals, lengths, 0)
}

pub fn compress_with_strategy(
    quals: &[u8],
    lengths: &[u32],
    strategy: usize,
) -> Result<Vec<u8>> {
    let total: u64 = lengths.iter().map(|&l| l as u64).sum();
    if total != quals.len() as u64 {
        return Err(Error::General(format!(
            "stride sum {} does not cover {} input bytes",
            total,
            quals.len()
        )));
    }

    let strat = strategy.min(STRAT_OPTS.len() - 1);
    let in_size = quals.len();
    let n_records = lengths.len();

    let mut dsqr = DSQR;
    let mut qtab = [0u32; 256];
    let mut ptab = [0u32; 1024];
    let mut dtab = [0u32; 256];
    let mut stab = [0u32; 256];

    let mut qhist = [0u32; 256];
    for &q in quals {
        qhist[q as usize] += 1;
    }

    // Count records identical to their predecessor to decide whether the
    // duplicate bit pays for itself.
    let mut dups = 0usize;
    {
        let mut off = 0usize;
        let mut last_len = 0usize;
        for (rec, &l) in lengths.iter().enumerate() {
            let len = l as usize;
            if rec > 0 && len == last_len && quals[off - len..off] == quals[off..off + len] {
                dups += 1;
            }
            last_len = len;
            off += len;
        }
    }
    let do_dedup = (n_records + 1) / (dups + 1) < 500;

    // Read-pairing flags are not visible at this layer, so the strand
    // context stays disabled. The decoder still honors the flag.
    let do_strand = false;
    let do_rev = false;

    let (mut max_sym, mut nsym) = (0usize, 0usize);
    for (i, &count) in qhist.iter().enumerate() {
        if count > 0 {
            max_sym = i;
            nsym += 1;
        }
    }
    let store_qmap = nsym <= 8 && nsym * 2 < max_sym;

    let first_len = lengths.first().copied().unwrap_or(0) as usize;
    let fixed_len = n_records > 0 && lengths.iter().all(|&l| l as usize == first_len);

    let store_qtab = false;
    let mut qctxbits = STRAT_OPTS[strat][0];
    let mut qctxshift = STRAT_OPTS[strat][1];
    let mut pctxbits = STRAT_OPTS[strat][2];
    let mut pctxshift = STRAT_OPTS[strat][3];
    let mut dctxbits = STRAT_OPTS[strat][4];
    let dctxshift = STRAT_OPTS[strat][5];
    let qloc = STRAT_OPTS[strat][6];
    let sloc = STRAT_OPTS[strat][7];
    let ploc = STRAT_OPTS[strat][8];
    let dloc = STRAT_OPTS[strat][9];

    if pctxshift < 0 {
        pctxshift = if first_len > 0 {
            (((first_len as f64) / (1 << pctxbits) as f64).log2() + 0.5).max(0.0) as i32
        } else {
            0
        };
    }

    if nsym <= 4 {
        // binned (NovaSeq-style) data
        qctxshift = 2;
        if in_size < 5_000_000 {
            pctxbits = 2;
            pctxshift = 5;
        }
    } else if nsym <= 8 {
        qctxbits = qctxbits.min(9);
        qctxshift = 3;
        if in_size < 5_000_000 {
            qctxbits = 6;
        }
    }

    if in_size < 300_000 {
        qctxbits = qctxshift;
        dctxbits = 2;
    }

    for d in dsqr.iter_mut() {
        *d = (*d).min((1u32 << dctxbits) - 1);
    }

    log::debug!(
        "qual stream: n={} nsym={} max_sym={} qmap={} fixed_len={} dedup={} ctx=q{}/{} p{}/{} d{}/{}",
        in_size, nsym, max_sym, store_qmap, fixed_len, do_dedup,
        qctxbits, qctxshift, pctxbits, pctxshift, dctxbits, dctxshift
    );

    let mut comp: Vec<u8> = Vec::new();
    comp.push(STREAM_FORMAT);
    comp.push(
        (u8::from(store_qtab) << 7)
            | (u8::from(dctxbits > 0) << 6)
            | (u8::from(pctxbits > 0) << 5)
            | (u8::from(do_rev) << 4)
            | (u8::from(do_strand) << 3)
            | (u8::from(fixed_len) << 2)
            | (u8::from(do_dedup) << 1)
            | u8::from(store_qmap),
    );
    comp.push(max_sym as u8);
    comp.push(((qctxbits << 4) | qctxshift) as u8);
    comp.push(((qloc << 4) | sloc) as u8);
    comp.push(((ploc << 4) | dloc) as u8);

    // Symbol remap: e.g. 4- or 8-binned data spread over a wide range.
    let mut code_of = [0u32; 256];
    if store_qmap {
        comp.push(nsym as u8);
        let mut idx = 0u32;
        for (i, &count) in qhist.iter().enumerate() {
            if count > 0 {
                comp.push(i as u8);
                code_of[i] = idx;
                idx += 1;
            }
        }
        max_sym = nsym;
    } else {
        for (i, slot) in code_of.iter_mut().enumerate() {
            *slot = i as u32;
        }
    }

    if qctxbits > 0 {
        for (i, slot) in qtab.iter_mut().enumerate() {
            *slot = i as u32;
        }
        if store_qtab {
            store_array(&mut comp, &qtab);
        }
    }

    if pctxbits > 0 {
        for (i, slot) in ptab.iter_mut().enumerate() {
            *slot = ((1u32 << pctxbits) - 1).min((i >> pctxshift) as u32);
        }
        store_array(&mut comp, &ptab);
        for slot in ptab.iter_mut() {
            *slot <<= ploc;
        }
    }

    if dctxbits > 0 {
        for (i, slot) in dtab.iter_mut().enumerate() {
            *slot = dsqr[(i >> dctxshift).min(dsqr.len() - 1)];
        }
        store_array(&mut comp, &dtab);
        for slot in dtab.iter_mut() {
            *slot <<= dloc;
        }
    }

    if do_strand {
        stab[1] = 1u32 << sloc;
    }

    let mut model_qual: Vec<FrequencyModel<256>> = (0..65536)
        .map(|_| FrequencyModel::with_symbols(max_sym + 1))
        .collect();
    let mut model_len: [FrequencyModel<256>; 4] = std::array::from_fn(|_| FrequencyModel::new());
    let mut model_strand = FrequencyModel::<2>::new();
    let mut model_dup = FrequencyModel::<2>::new();

    let mut rc = RangeEncoder::new();
    let qctx_mask = (1u32 << qctxbits) - 1;
    let read2 = 0usize;

    let mut i = 0usize;
    let mut last_len = 0usize;
    for (rec, &l) in lengths.iter().enumerate() {
        let len = l as usize;

        if !fixed_len || rec == 0 {
            model_len[0].encode(&mut rc, (len & 0xff) as u16);
            model_len[1].encode(&mut rc, ((len >> 8) & 0xff) as u16);
            model_len[2].encode(&mut rc, ((len >> 16) & 0xff) as u16);
            model_len[3].encode(&mut rc, ((len >> 24) & 0xff) as u16);
        }

        if do_strand {
            model_strand.encode(&mut rc, read2 as u16);
        }

        let mut delta = 0u32;
        let mut last = 0u32;
        let mut qlast = 0u32;
        let mut q1 = 0u8;

        if do_dedup {
            if rec > 0 && len == last_len && quals[i - len..i] == quals[i..i + len] {
                model_dup.encode(&mut rc, 1);
                i += len;
                continue;
            }
            model_dup.encode(&mut rc, 0);
            last_len = len;
        }

        for j in (1..=len).rev() {
            let q = quals[i];
            model_qual[last as usize].encode(&mut rc, code_of[q as usize] as u16);

            qlast = (qlast << qctxshift) + qtab[code_of[q as usize] as usize];
            last = (qlast & qctx_mask) << qloc;
            last += ptab[j.min(1023)];
            last += stab[read2];
            last += dtab[delta as usize];
            last &= 0xffff;

            delta += u32::from(q1 != q) * u32::from(delta < 255);
            q1 = q;
            i += 1;
        }
    }

    comp.extend_from_slice(&rc.finish());
    Ok(comp)
}

pub fn decompress(comp: &[u8], n_out: usize) -> Result<Vec<u8>> {
    if comp.len() < 6 {
        return Err(Error::EOF("quality stream header truncated".into()));
    }

    let vers = comp[0];
    if vers != STREAM_FORMAT {
        return Err(Error::Corrupt(format!(
            "unsupported quality stream format: {}",
            vers
        )));
    }

    let flags = comp[1];
    let have_qtab = flags & 128 != 0;
    let have_dtab = flags & 64 != 0;
    let have_ptab = flags & 32 != 0;
    let do_rev = flags & 16 != 0;
    let do_strand = flags & 8 != 0;
    let fixed_len = flags & 4 != 0;
    let do_dedup = flags & 2 != 0;
    let store_qmap = flags & 1 != 0;
    if do_rev {
        return Err(Error::NYI("reversed quality streams".into()));
    }

    let mut max_sym = comp[2] as usize;
    let qctxbits = (comp[3] >> 4) as u32;
    let qctxshift = (comp[3] & 15) as u32;
    let qloc = (comp[4] >> 4) as u32;
    let sloc = (comp[4] & 15) as u32;
    let ploc = (comp[5] >> 4) as u32;
    let dloc = (comp[5] & 15) as u32;
    let mut idx = 6usize;

    let mut qmap = [0u8; 256];
    if store_qmap {
        let nsym = *comp
            .get(idx)
            .ok_or_else(|| Error::EOF("quality symbol map truncated".into()))?
            as usize;
        idx += 1;
        if comp.len() < idx + nsym {
            return Err(Error::EOF("quality symbol map truncated".into()));
        }
        for (i, slot) in qmap.iter_mut().take(nsym).enumerate() {
            *slot = comp[idx + i];
        }
        idx += nsym;
        max_sym = nsym;
    } else {
        for (i, slot) in qmap.iter_mut().enumerate() {
            *slot = i as u8;
        }
    }

    let mut qtab = [0u32; 256];
    if qctxbits > 0 {
        if have_qtab {
            idx += read_array(&comp[idx..], &mut qtab)?;
        } else {
            for (i, slot) in qtab.iter_mut().enumerate() {
                *slot = i as u32;
            }
        }
    }

    let mut ptab = [0u32; 1024];
    if have_ptab {
        idx += read_array(&comp[idx..], &mut ptab)?;
    }
    for slot in ptab.iter_mut() {
        *slot <<= ploc;
    }

    let mut dtab = [0u32; 256];
    if have_dtab {
        idx += read_array(&comp[idx..], &mut dtab)?;
    }
    for slot in dtab.iter_mut() {
        *slot <<= dloc;
    }

    let mut stab = [0u32; 256];
    if do_strand {
        stab[1] = 1u32 << sloc;
    }

    let mut model_qual: Vec<FrequencyModel<256>> = (0..65536)
        .map(|_| FrequencyModel::with_symbols(max_sym + 1))
        .collect();
    let mut model_len: [FrequencyModel<256>; 4] = std::array::from_fn(|_| FrequencyModel::new());
    let mut model_strand = FrequencyModel::<2>::new();
    let mut model_dup = FrequencyModel::<2>::new();

    let mut rc = RangeDecoder::new(&comp[idx..]);
    let qctx_mask = (1u32 << qctxbits) - 1;

    let mut out = vec![0u8; n_out];
    let mut i = 0usize;
    let mut rec = 0usize;
    let mut last_len = 0usize;
    while i < n_out {
        if rec > 2 * n_out + 1024 {
            return Err(Error::Corrupt("quality stream does not converge".into()));
        }
        let len = if !fixed_len || rec == 0 {
            let mut len = model_len[0].decode(&mut rc) as usize;
            len |= (model_len[1].decode(&mut rc) as usize) << 8;
            len |= (model_len[2].decode(&mut rc) as usize) << 16;
            len |= (model_len[3].decode(&mut rc) as usize) << 24;
            last_len = len;
            len
        } else {
            last_len
        };

        if i + len > n_out {
            return Err(Error::Corrupt("quality record overruns output".into()));
        }

        let read2 = if do_strand {
            model_strand.decode(&mut rc) as usize
        } else {
            0
        };

        if do_dedup && model_dup.decode(&mut rc) == 1 {
            if len > i {
                return Err(Error::Corrupt("duplicate refers before stream start".into()));
            }
            out.copy_within(i - len..i, i);
            i += len;
            rec += 1;
            continue;
        }

        let mut delta = 0u32;
        let mut last = 0u32;
        let mut qlast = 0u32;
        let mut q1 = 0u8;

        for j in (1..=len).rev() {
            let code = model_qual[last as usize].decode(&mut rc);
            let q = qmap[code as usize];
            out[i] = q;

            qlast = (qlast << qctxshift) + qtab[code as usize];
            last = (qlast & qctx_mask) << qloc;
            last += ptab[j.min(1023)];
            last += stab[read2];
            last += dtab[delta as usize];
            last &= 0xffff;

            delta += u32::from(q1 != q) * u32::from(delta < 255);
            q1 = q;
            i += 1;
        }
        rec += 1;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn roundtrip(quals: &[u8], lengths: &[u32]) -> usize {
        let comp = compress(quals, lengths).unwrap();
        let back = decompress(&comp, quals.len()).unwrap();
        assert_eq!(back, quals);
        comp.len()
    }

    fn random_quals(
        rng: &mut StdRng,
        n_reads: usize,
        len: usize,
        alphabet: &[u8],
    ) -> (Vec<u8>, Vec<u32>) {
        let mut quals = Vec::new();
        for _ in 0..n_reads * len {
            quals.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
        (quals, vec![len as u32; n_reads])
    }

    #[test]
    fn test_roundtrip_wide_alphabet() {
        let mut rng = StdRng::seed_from_u64(2024);
        let alphabet: Vec<u8> = (33..73).collect();
        let (quals, lengths) = random_quals(&mut rng, 300, 100, &alphabet);
        roundtrip(&quals, &lengths);
    }

    #[test]
    fn test_roundtrip_binned_alphabet_uses_qmap() {
        let mut rng = StdRng::seed_from_u64(55);
        // Four symbols spread over a wide range, NovaSeq-style binning.
        let (quals, lengths) = random_quals(&mut rng, 500, 150, &[2, 12, 23, 37]);
        let comp = compress(&quals, &lengths).unwrap();
        assert_eq!(comp[1] & 1, 1, "symbol map flag should be set");
        assert_eq!(decompress(&comp, quals.len()).unwrap(), quals);
    }

    #[test]
    fn test_roundtrip_variable_lengths() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut quals = Vec::new();
        let mut lengths = Vec::new();
        for _ in 0..400 {
            let len = rng.gen_range(20..200);
            for _ in 0..len {
                quals.push(rng.gen_range(33..53) as u8);
            }
            lengths.push(len as u32);
        }
        roundtrip(&quals, &lengths);
    }

    #[test]
    fn test_duplicate_reads_detected() {
        let read: Vec<u8> = (0..100).map(|i| 33 + (i % 7) as u8).collect();
        let mut quals = Vec::new();
        let mut lengths = Vec::new();
        for _ in 0..200 {
            quals.extend_from_slice(&read);
            lengths.push(read.len() as u32);
        }
        let comp = compress(&quals, &lengths).unwrap();
        assert_eq!(comp[1] & 2, 2, "dedup flag should be set");
        // 200 identical reads should come out near one read's cost.
        assert!(comp.len() < quals.len() / 20);
        assert_eq!(decompress(&comp, quals.len()).unwrap(), quals);
    }

    #[test]
    fn test_skewed_quals_compress_well() {
        let mut rng = StdRng::seed_from_u64(77);
        let mut quals = Vec::new();
        for _ in 0..60_000 {
            quals.push(if rng.gen_bool(0.9) { 40 } else { rng.gen_range(33..41) });
        }
        let lengths = vec![100u32; 600];
        let comp = compress(&quals, &lengths).unwrap();
        assert!(comp.len() < quals.len() / 3);
        assert_eq!(decompress(&comp, quals.len()).unwrap(), quals);
    }

    #[test]
    fn test_zero_length_records() {
        let quals = vec![35u8; 50];
        let lengths = vec![0, 25, 0, 25];
        roundtrip(&quals, &lengths);
    }

    #[test]
    fn test_bad_version_rejected() {
        let quals = vec![35u8; 10];
        let mut comp = compress(&quals, &[10]).unwrap();
        comp[0] = 4;
        assert!(decompress(&comp, 10).is_err());
    }
}
