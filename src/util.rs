//! Small helpers shared by the codec internals.

#[inline(always)]
#[cold]
fn cold_path() {}

/// "Annotation" to hint that a branch of an if-statement is likely to occur.
#[inline(always)]
pub(crate) fn likely(b: bool) -> bool {
    if b {
        true
    } else {
        cold_path();
        false
    }
}

/// "Annotation" to hint that a branch of an if-statement is _not likely_ to occur.
#[inline(always)]
pub(crate) fn unlikely(b: bool) -> bool {
    if b {
        cold_path();
        true
    } else {
        false
    }
}

/// Lossless conversion between integer widths that `From` does not cover on
/// every platform, e.g. `u32 -> usize`.
///
/// We only support 32 and 64 bit targets so these casts never truncate.
pub(crate) trait CastFrom<T> {
    fn cast_from(from: T) -> Self;
}

#[allow(clippy::as_conversions)]
mod impls {
    use super::CastFrom;

    static_assertions::const_assert!(usize::BITS >= 32);
    static_assertions::const_assert!(usize::BITS <= 64);

    impl CastFrom<u32> for usize {
        #[inline(always)]
        fn cast_from(from: u32) -> usize {
            from as usize
        }
    }

    impl CastFrom<u8> for usize {
        #[inline(always)]
        fn cast_from(from: u8) -> usize {
            usize::from(from)
        }
    }

    impl CastFrom<usize> for u64 {
        #[inline(always)]
        fn cast_from(from: usize) -> u64 {
            from as u64
        }
    }
}
