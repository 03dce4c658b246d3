//! Bucket selection
//!
//! Maps a requested element count to the smallest power-of-two size class
//! that can hold it. Bucket `i` holds objects of `2^i` elements, so the
//! selected index is `ceil(log2(count))`, with `count == 0` treated as a
//! request for the minimal unit.

/// Structural number of buckets a pool can hold (capacities 1..=128).
pub const MPOOL_MAX_BUCKETS: usize = 8;

/// Largest bucket index a pool can be configured with.
pub const MPOOL_MAX_BUCKET_INDEX: usize = MPOOL_MAX_BUCKETS - 1;

/// Returns the bucket index serving `count` elements, or `None` when the
/// request is beyond `max_bucket` (or beyond the structural limit).
///
/// ```
/// use nebula_mpool::bucket::select_bucket;
///
/// assert_eq!(select_bucket(0, 7), Some(0));
/// assert_eq!(select_bucket(3, 7), Some(2));
/// assert_eq!(select_bucket(4, 7), Some(2));
/// assert_eq!(select_bucket(5, 2), None);
/// ```
#[inline]
#[must_use]
pub const fn select_bucket(count: usize, max_bucket: usize) -> Option<usize> {
    if count == 0 {
        return Some(0);
    }

    // Most significant set bit, bumped when any lower bit is set.
    let mut index = count.ilog2() as usize;
    if !count.is_power_of_two() {
        index += 1;
    }

    if index > max_bucket || index >= MPOOL_MAX_BUCKETS {
        return None;
    }

    Some(index)
}

/// Number of elements an object of bucket `index` can hold.
#[inline]
#[must_use]
pub const fn bucket_capacity(index: usize) -> usize {
    1 << index
}

/// Byte size of one object in bucket `index`, or `None` on overflow.
#[inline]
#[must_use]
pub const fn bucket_object_size(header_size: usize, element_size: usize, index: usize) -> Option<usize> {
    object_size(header_size, element_size, bucket_capacity(index))
}

/// Byte size of a record with `count` elements, or `None` on overflow.
#[inline]
#[must_use]
pub const fn object_size(header_size: usize, element_size: usize, count: usize) -> Option<usize> {
    match element_size.checked_mul(count) {
        Some(elements) => header_size.checked_add(elements),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(3, 2)]
    #[case(4, 2)]
    #[case(5, 3)]
    #[case(8, 3)]
    #[case(9, 4)]
    #[case(64, 6)]
    #[case(65, 7)]
    #[case(128, 7)]
    fn test_select_bucket_rounds_up(#[case] count: usize, #[case] expected: usize) {
        assert_eq!(select_bucket(count, MPOOL_MAX_BUCKET_INDEX), Some(expected));
    }

    #[test]
    fn test_select_bucket_respects_max_bucket() {
        assert_eq!(select_bucket(4, 2), Some(2));
        assert_eq!(select_bucket(5, 2), None);
        assert_eq!(select_bucket(1, 0), Some(0));
        assert_eq!(select_bucket(2, 0), None);
    }

    #[test]
    fn test_select_bucket_structural_limit() {
        // Even a misconfigured max bucket cannot exceed the bucket array.
        assert_eq!(select_bucket(129, usize::MAX), None);
        assert_eq!(select_bucket(usize::MAX, usize::MAX), None);
        assert_eq!(select_bucket(128, usize::MAX), Some(7));
    }

    #[test]
    fn test_object_sizes() {
        assert_eq!(bucket_capacity(0), 1);
        assert_eq!(bucket_capacity(7), 128);
        assert_eq!(bucket_object_size(16, 8, 3), Some(16 + 64));
        assert_eq!(object_size(16, 8, 300), Some(16 + 2400));
        assert_eq!(object_size(16, usize::MAX, 2), None);
        assert_eq!(object_size(usize::MAX, 1, 1), None);
    }
}
