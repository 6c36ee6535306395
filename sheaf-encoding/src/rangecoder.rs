//! Byte-oriented carry-less range coder: 64-bit low, 32-bit range, byte-at-a
//! time renormalization when the range falls below 2^24. The encoder flushes
//! eight bytes of `low` on finish and the decoder preloads eight bytes, so
//! streams shorter than eight bytes never occur.
//!
//! All entropy models in this crate share this single primitive.

pub struct RangeEncoder {
    low: u64,
    range: u32,
    out: Vec<u8>,
}

impl RangeEncoder {
    pub fn new() -> Self {
        Self {
            low: 0,
            range: u32::MAX,
            out: Vec::new(),
        }
    }

    /// Narrow the interval to `[cum_freq, cum_freq + freq)` out of
    /// `tot_freq`. Requires `cum_freq + freq <= tot_freq` and
    /// `tot_freq < 2^16`.
    pub fn encode(&mut self, cum_freq: u32, freq: u32, tot_freq: u32) {
        self.range /= tot_freq;
        self.low = self.low.wrapping_add(cum_freq.wrapping_mul(self.range) as u64);
        self.range = self.range.wrapping_mul(freq);

        if self.range < 0x0100_0000 {
            loop {
                self.out.push((self.low >> 56) as u8);
                if self.range < 0x0001_0000 {
                    self.out.push((self.low >> 48) as u8);
                    if self.range < 0x0000_0100 {
                        self.out.push((self.low >> 40) as u8);
                        self.range <<= 24;
                        self.low <<= 24;
                    } else {
                        self.range <<= 16;
                        self.low <<= 16;
                    }
                } else {
                    self.range <<= 8;
                    self.low <<= 8;
                }
                // A pending carry cannot be resolved yet; force more output.
                if (self.low >> 32) as u32 != u32::MAX {
                    break;
                }
                self.range = 0xFF;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..8 {
            self.out.push((self.low >> 56) as u8);
            self.low <<= 8;
        }
        self.out
    }
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RangeDecoder<'a> {
    input: &'a [u8],
    pos: usize,
    range: u32,
    code: u32,
    cl: u32,
}

impl<'a> RangeDecoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        let mut dec = Self {
            input,
            pos: 0,
            range: u32::MAX,
            code: 0,
            cl: 0,
        };
        for _ in 0..8 {
            dec.shift_in();
        }
        dec
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        let c = self.input.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        c
    }

    #[inline]
    fn shift_in(&mut self) {
        let c = self.next_byte();
        self.code = (self.code << 8) | c as u32;
        self.cl = (self.cl << 1).wrapping_add(((c as u32) + 1) >> 8);
    }

    /// Returns the scaled cumulative frequency of the next symbol. Must be
    /// followed by a matching [`RangeDecoder::decode`] call.
    pub fn get_freq(&mut self, tot_freq: u32) -> u32 {
        self.range /= tot_freq;
        self.code / self.range
    }

    pub fn decode(&mut self, cum_freq: u32, freq: u32, _tot_freq: u32) {
        self.code = self
            .code
            .wrapping_sub(cum_freq.wrapping_mul(self.range));
        self.range = self.range.wrapping_mul(freq);

        if self.range < 0x0100_0000 {
            loop {
                self.shift_in();
                if self.range < 0x0001_0000 {
                    self.shift_in();
                    if self.range < 0x0000_0100 {
                        self.shift_in();
                        self.range <<= 24;
                    } else {
                        self.range <<= 16;
                    }
                } else {
                    self.range <<= 8;
                }
                if (self.cl as u8) < 0xF0 {
                    break;
                }
                self.range = 0xFF;
            }
        }
    }
}
