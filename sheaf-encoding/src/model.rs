//! A fixed four-symbol adaptive model with no escape and no re-sorting; it
//! accumulates per-symbol counts and codes in proportion. Intended for DNA
//! bases, one model instance per context.

use crate::rangecoder::{RangeDecoder, RangeEncoder};

const STEP: u16 = 8;
const WSIZ: u32 = (1 << 16) - 2 * STEP as u32;

#[derive(Debug, Clone, Copy)]
pub struct BaseModel {
    stats: [u16; 4],
}

impl BaseModel {
    pub fn new() -> Self {
        Self {
            stats: [3 * STEP; 4],
        }
    }

    fn rescale(&mut self) {
        for s in self.stats.iter_mut() {
            *s -= *s >> 1;
        }
    }

    #[inline]
    fn sum(&self) -> u32 {
        (self.stats[0] as u32 + self.stats[1] as u32)
            + (self.stats[2] as u32 + self.stats[3] as u32)
    }

    pub fn encode(&mut self, rc: &mut RangeEncoder, sym: u8) {
        let mut total = self.sum();
        if total >= WSIZ {
            self.rescale();
            total = self.sum();
        }

        let mut cum = 0u32;
        for i in 0..sym as usize {
            cum += self.stats[i] as u32;
        }
        rc.encode(cum, self.stats[sym as usize] as u32, total);
        self.stats[sym as usize] += STEP;
    }

    pub fn decode(&mut self, rc: &mut RangeDecoder) -> u8 {
        let mut total = self.sum();
        if total >= WSIZ {
            self.rescale();
            total = self.sum();
        }

        let target = rc.get_freq(total);
        let mut hi = 0u32;
        for i in 0..4usize {
            hi += self.stats[i] as u32;
            if hi > target || i == 3 {
                rc.decode(hi - self.stats[i] as u32, self.stats[i] as u32, total);
                self.stats[i] += STEP;
                return i as u8;
            }
        }
        unreachable!()
    }
}

impl Default for BaseModel {
    fn default() -> Self {
        Self::new()
    }
}
