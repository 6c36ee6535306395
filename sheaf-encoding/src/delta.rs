//! In-place forward differences and prefix sums over u32 stride arrays.
//! Tensor offset columns store cumulative sums; delta encoding rewrites them
//! to per-row strides (keeping the leading element), and the prefix sum is
//! the exact inverse.

/// Replace `[x0, x1, x2, ...]` with `[x0, x1-x0, x2-x1, ...]`.
pub fn encode_in_place(values: &mut [u32]) {
    for i in (1..values.len()).rev() {
        values[i] = values[i].wrapping_sub(values[i - 1]);
    }
}

/// Inverse of [`encode_in_place`].
pub fn prefix_sum_in_place(values: &mut [u32]) {
    for i in 1..values.len() {
        values[i] = values[i].wrapping_add(values[i - 1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_offsets_roundtrip() {
        let original = vec![0u32, 1, 3, 6, 6, 10];
        let mut values = original.clone();
        encode_in_place(&mut values);
        assert_eq!(values, vec![0, 1, 2, 3, 0, 4]);
        prefix_sum_in_place(&mut values);
        assert_eq!(values, original);
    }

    #[test]
    fn test_empty_and_single() {
        let mut empty: Vec<u32> = vec![];
        encode_in_place(&mut empty);
        prefix_sum_in_place(&mut empty);

        let mut one = vec![42u32];
        encode_in_place(&mut one);
        assert_eq!(one, vec![42]);
        prefix_sum_in_place(&mut one);
        assert_eq!(one, vec![42]);
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut values: Vec<u32> = vec![0];
        for _ in 0..10_000 {
            let prev = *values.last().unwrap();
            values.push(prev + rng.gen_range(0..500));
        }
        let original = values.clone();
        encode_in_place(&mut values);
        prefix_sum_in_place(&mut values);
        assert_eq!(values, original);
    }
}
