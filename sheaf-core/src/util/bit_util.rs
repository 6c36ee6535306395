/// Returns the ceil of value/divisor.
#[inline]
pub fn ceil<T: num::Integer>(value: T, divisor: T) -> T {
    num::Integer::div_ceil(&value, &divisor)
}

#[inline]
pub fn padding_size(size: usize, alignment: usize) -> usize {
    size.next_multiple_of(alignment) - size
}

#[inline]
pub fn round_up_to_multiple(size: usize, factor: usize) -> usize {
    size.next_multiple_of(factor)
}

/// Smallest power of two >= n. Returns 1 for n == 0.
#[inline]
pub fn next_power_of_two(n: u64) -> u64 {
    n.max(1).next_power_of_two()
}

/// Number of u32 words a nullity bitmap needs for `n` rows.
#[inline]
pub fn nullity_words(n: u32) -> u32 {
    ceil(n, 32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil() {
        assert_eq!(ceil(0, 32), 0);
        assert_eq!(ceil(1, 32), 1);
        assert_eq!(ceil(32, 32), 1);
        assert_eq!(ceil(33, 32), 2);
    }

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(4096), 4096);
        assert_eq!(next_power_of_two(4097), 8192);
    }

    #[test]
    fn test_padding_size() {
        assert_eq!(padding_size(0, 4), 0);
        assert_eq!(padding_size(5, 4), 3);
        assert_eq!(padding_size(64, 64), 0);
    }
}
