//! Run-length storage for the small monotone context tables of the quality
//! compressor.
//!
//! An array of 0,0,0, 1,1,1,1, 3, 5,5 is turned into a run-length of
//! 3x0, 4x1, 0x2, 1x3, 0x4, 2x5, which becomes the byte stream 3 4 0 1 0 2.
//! Runs of 255 or more are emitted in 255-chunks. The byte stream is then
//! itself RLE'd: a byte equal to its predecessor is followed by a count of
//! further repeats.

use sheaf_core::errors::{Error, Result};

/// Append the encoded form of `array` to `out`, returning the number of
/// bytes written. Values must be non-decreasing bucket ids starting near 0.
pub fn store_array(out: &mut Vec<u8>, array: &[u32]) -> usize {
    // Pass 1: chunked run lengths per value.
    let mut chunks: Vec<u8> = Vec::new();
    let mut i = 0usize;
    let mut value = 0u32;
    while i < array.len() {
        let mut run_len = 0usize;
        while i < array.len() && array[i] == value {
            i += 1;
            run_len += 1;
        }
        loop {
            let r = run_len.min(255);
            chunks.push(r as u8);
            run_len -= r;
            if r != 255 {
                break;
            }
        }
        value += 1;
    }

    // Pass 2: RLE over the chunk bytes. Every byte equal to the previous
    // emitted byte is followed by a count of additional repeats.
    let start = out.len();
    let mut last: i32 = -1;
    let mut j = 0usize;
    while j < chunks.len() {
        let b = chunks[j];
        out.push(b);
        j += 1;
        if b as i32 == last {
            let mut extra = 0u8;
            while j < chunks.len() && chunks[j] == b && extra < u8::MAX {
                j += 1;
                extra += 1;
            }
            out.push(extra);
        } else {
            last = b as i32;
        }
    }
    out.len() - start
}

/// Inverse of [`store_array`]: fills `array` and returns the number of bytes
/// consumed from `input`.
pub fn read_array(input: &[u8], array: &mut [u32]) -> Result<usize> {
    let mut pos = 0usize;
    let mut pending: usize = 0; // repeats left from an RLE count
    let mut last: i32 = -1;

    let mut next_chunk_byte = |pos: &mut usize, pending: &mut usize, last: &mut i32| -> Result<u8> {
        if *pending > 0 {
            *pending -= 1;
            return Ok(*last as u8);
        }
        let b = *input
            .get(*pos)
            .ok_or_else(|| Error::EOF("truncated context table".into()))?;
        *pos += 1;
        if b as i32 == *last {
            let extra = *input
                .get(*pos)
                .ok_or_else(|| Error::EOF("truncated context table".into()))?;
            *pos += 1;
            *pending = extra as usize;
        } else {
            *last = b as i32;
        }
        Ok(b)
    };

    let mut filled = 0usize;
    let mut value = 0u32;
    while filled < array.len() {
        let mut run_len = 0usize;
        loop {
            let r = next_chunk_byte(&mut pos, &mut pending, &mut last)?;
            run_len += r as usize;
            if r != 255 {
                break;
            }
        }
        if filled + run_len > array.len() {
            return Err(Error::Corrupt("context table run overflows array".into()));
        }
        for slot in &mut array[filled..filled + run_len] {
            *slot = value;
        }
        filled += run_len;
        value += 1;
    }
    Ok(pos)
}
