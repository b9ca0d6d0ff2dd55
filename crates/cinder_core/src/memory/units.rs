//! Size unit helpers.
//!
//! Binary multiples, usable in `const` contexts:
//!
//! ```rust
//! use cinder_core::memory::units::{kilobytes, megabytes};
//!
//! const FRAME_BUDGET: usize = megabytes(2) + kilobytes(512);
//! assert_eq!(FRAME_BUDGET, 2_621_440);
//! ```

/// `n` kibibytes in bytes.
#[inline]
#[must_use]
pub const fn kilobytes(n: usize) -> usize {
    n * 1024
}

/// `n` mebibytes in bytes.
#[inline]
#[must_use]
pub const fn megabytes(n: usize) -> usize {
    kilobytes(n) * 1024
}

/// `n` gibibytes in bytes.
#[inline]
#[must_use]
pub const fn gigabytes(n: usize) -> usize {
    megabytes(n) * 1024
}

/// `n` tebibytes in bytes.
#[inline]
#[must_use]
pub const fn terabytes(n: usize) -> usize {
    gigabytes(n) * 1024
}
