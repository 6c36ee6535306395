//! An adaptive frequency model over at most `NSYM` symbols, kept
//! approximately sorted by frequency: each update may bubble the touched
//! symbol one slot towards the front. There is no escape symbol, so the
//! model suits relatively stationary streams; the total is halved whenever
//! it approaches the 16-bit ceiling.

use crate::rangecoder::{RangeDecoder, RangeEncoder};

const MAX_FREQ: u32 = (1 << 16) - 16;
const STEP: u16 = 8;

#[derive(Debug, Clone, Copy)]
struct SymFreq {
    freq: u16,
    sym: u16,
}

#[derive(Clone)]
pub struct FrequencyModel<const NSYM: usize> {
    total: u32,
    f: [SymFreq; NSYM],
}

impl<const NSYM: usize> FrequencyModel<NSYM> {
    pub fn new() -> Self {
        Self::with_symbols(NSYM)
    }

    /// A model whose live alphabet is the first `max_sym` symbols; the
    /// remaining slots stay at frequency zero and are never emitted.
    pub fn with_symbols(max_sym: usize) -> Self {
        debug_assert!(max_sym >= 1 && max_sym <= NSYM);
        let mut f = [SymFreq { freq: 0, sym: 0 }; NSYM];
        for (i, slot) in f.iter_mut().enumerate() {
            slot.sym = i as u16;
            slot.freq = u16::from(i < max_sym);
        }
        Self {
            total: max_sym as u32,
            f,
        }
    }

    fn normalize(&mut self) {
        self.total = 0;
        for s in self.f.iter_mut() {
            if s.freq == 0 {
                break;
            }
            s.freq -= s.freq >> 1;
            self.total += s.freq as u32;
        }
    }

    pub fn encode(&mut self, rc: &mut RangeEncoder, sym: u16) {
        let mut acc = 0u32;
        let mut i = 0usize;
        while self.f[i].sym != sym {
            acc += self.f[i].freq as u32;
            i += 1;
        }

        rc.encode(acc, self.f[i].freq as u32, self.total);
        self.f[i].freq += STEP;
        self.total += STEP as u32;

        if self.total > MAX_FREQ {
            self.normalize();
        }

        if i > 0 && self.f[i].freq > self.f[i - 1].freq {
            self.f.swap(i, i - 1);
        }
    }

    pub fn decode(&mut self, rc: &mut RangeDecoder) -> u16 {
        let target = rc.get_freq(self.total);
        let mut acc = 0u32;
        let mut i = 0usize;
        loop {
            acc += self.f[i].freq as u32;
            if acc > target {
                break;
            }
            i += 1;
        }
        acc -= self.f[i].freq as u32;

        rc.decode(acc, self.f[i].freq as u32, self.total);
        self.f[i].freq += STEP;
        self.total += STEP as u32;

        if self.total > MAX_FREQ {
            self.normalize();
        }

        let sym = self.f[i].sym;
        if i > 0 && self.f[i].freq > self.f[i - 1].freq {
            self.f.swap(i, i - 1);
        }
        sym
    }
}

impl<const NSYM: usize> Default for FrequencyModel<NSYM> {
    fn default() -> Self {
        Self::new()
    }
}
