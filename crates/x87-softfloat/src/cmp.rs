//! IEEE comparisons on `Fx80` values.
//!
//! All three predicates return `false` on unordered operands. `eq` raises
//! INVALID only for signaling NaNs; `lt` and `le` raise it for any NaN, per
//! the IEEE signaling-comparison rules.

use crate::{Flags, FpEnv, Fx80};

/// Magnitude order of two same-sign finite/infinite values; valid because
/// canonical encodings order lexicographically by (exponent, significand).
#[inline]
fn mag_lt(a: Fx80, b: Fx80) -> bool {
    (a.high & 0x7FFF, a.low) < (b.high & 0x7FFF, b.low)
}

pub fn eq(a: Fx80, b: Fx80, env: &mut FpEnv) -> bool {
    if a.is_nan() || b.is_nan() {
        if a.is_signaling_nan() || b.is_signaling_nan() {
            env.raise(Flags::INVALID);
        }
        return false;
    }
    if a.is_zero() && b.is_zero() {
        return true;
    }
    a.low == b.low && a.high == b.high
}

pub fn lt(a: Fx80, b: Fx80, env: &mut FpEnv) -> bool {
    if a.is_nan() || b.is_nan() {
        env.raise(Flags::INVALID);
        return false;
    }
    let (sa, sb) = (a.is_neg(), b.is_neg());
    if sa != sb {
        return sa && !(a.is_zero() && b.is_zero());
    }
    if sa {
        mag_lt(b, a)
    } else {
        mag_lt(a, b)
    }
}

pub fn le(a: Fx80, b: Fx80, env: &mut FpEnv) -> bool {
    if a.is_nan() || b.is_nan() {
        env.raise(Flags::INVALID);
        return false;
    }
    let (sa, sb) = (a.is_neg(), b.is_neg());
    if sa != sb {
        return sa || (a.is_zero() && b.is_zero());
    }
    if sa {
        !mag_lt(a, b)
    } else {
        !mag_lt(b, a)
    }
}
