//! Block-split Bloom filter: values hash to a 32-byte block, and eight
//! salted probes set one bit in each of the block's eight words. Not wired
//! into the ingest path; its serialized bitset may accompany columns as an
//! auxiliary index.

use sheaf_core::buffer::ResizableBuffer;
use sheaf_core::errors::Result;
use sheaf_core::pool::default_memory_pool;
use sheaf_core::util::bit_util;
use sheaf_format::ptype::Primitive;
use xxhash_rust::xxh64::xxh64;

const BLOOM_HASH_SEED: u64 = 0;

/// 32 bytes per block to line up with 32-byte SIMD lanes.
const BYTES_PER_BLOCK: u32 = 32;
const BITS_SET_PER_BLOCK: usize = 8;

pub const MINIMUM_BLOOM_FILTER_BYTES: u32 = 32;
/// Caps the filter at 128 MiB.
pub const MAXIMUM_BLOOM_FILTER_BYTES: u32 = 128 * 1024 * 1024;

const SALT: [u32; BITS_SET_PER_BLOCK] = [
    0x47b6137b, 0x44974d91, 0x8824ad5b, 0xa2b7289d, 0x705495c7, 0x2df1424b, 0x9efc4947,
    0x5c6bfb31,
];

pub struct BlockSplitBloomFilter {
    data: ResizableBuffer,
    num_bytes: u32,
}

impl BlockSplitBloomFilter {
    /// Create a filter of `num_bytes`, clamped to the legal range and
    /// rounded up to a power of two. The bitset allocation is 32-byte
    /// aligned.
    pub fn new(num_bytes: u32) -> Result<Self> {
        let num_bytes = num_bytes
            .clamp(MINIMUM_BLOOM_FILTER_BYTES, MAXIMUM_BLOOM_FILTER_BYTES)
            .next_power_of_two();
        let mut data = ResizableBuffer::with_capacity(default_memory_pool(), num_bytes as usize)?;
        data.resize(num_bytes as usize)?;
        Ok(Self { data, num_bytes })
    }

    /// Rebuild a filter around an existing bitset (e.g. read back from an
    /// archive). The bytes are copied into an aligned allocation.
    pub fn from_bitset(bitset: &[u8]) -> Result<Self> {
        let mut filter = Self::new(bitset.len() as u32)?;
        filter.data.as_mut_slice()[..bitset.len()].copy_from_slice(bitset);
        Ok(filter)
    }

    /// Optimal bitset size for `ndv` distinct values at false-positive rate
    /// `fpp`, always a power of two within the legal range.
    pub fn optimal_num_of_bits(ndv: u32, fpp: f64) -> u32 {
        assert!(fpp > 0.0 && fpp < 1.0);
        let m = -8.0 * ndv as f64 / (1.0 - fpp.powf(1.0 / 8.0)).ln();
        let mut num_bits = if m.is_finite() && m > 0.0 {
            m as u64
        } else {
            (MAXIMUM_BLOOM_FILTER_BYTES as u64) << 3
        };
        num_bits = num_bits.clamp(
            (MINIMUM_BLOOM_FILTER_BYTES as u64) << 3,
            (MAXIMUM_BLOOM_FILTER_BYTES as u64) << 3,
        );
        bit_util::next_power_of_two(num_bits) as u32
    }

    pub fn bitset_size(&self) -> u32 {
        self.num_bytes
    }

    pub fn bitset(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn hash<T: Primitive>(&self, value: T) -> u64 {
        xxh64(bytemuck::bytes_of(&value), BLOOM_HASH_SEED)
    }

    pub fn hash_bytes(&self, value: &[u8]) -> u64 {
        xxh64(value, BLOOM_HASH_SEED)
    }

    /// The upper 32 hash bits select the block, the lower 32 drive the
    /// salted bit positions within it.
    fn block_index(&self, hash: u64) -> usize {
        let num_blocks = (self.num_bytes / BYTES_PER_BLOCK) as u64;
        (((hash >> 32) * num_blocks) >> 32) as usize
    }

    fn block_mask(key: u32) -> [u32; BITS_SET_PER_BLOCK] {
        let mut mask = [0u32; BITS_SET_PER_BLOCK];
        for (i, salt) in SALT.iter().enumerate() {
            mask[i] = 1 << (key.wrapping_mul(*salt) >> 27);
        }
        mask
    }

    pub fn insert_hash(&mut self, hash: u64) {
        let block = self.block_index(hash);
        let mask = Self::block_mask(hash as u32);
        let words = self.data.typed_mut::<u32>();
        for (i, m) in mask.iter().enumerate() {
            words[block * BITS_SET_PER_BLOCK + i] |= m;
        }
    }

    pub fn find_hash(&self, hash: u64) -> bool {
        let block = self.block_index(hash);
        let mask = Self::block_mask(hash as u32);
        let words = self.data.typed::<u32>();
        mask.iter()
            .enumerate()
            .all(|(i, m)| words[block * BITS_SET_PER_BLOCK + i] & m != 0)
    }
}
