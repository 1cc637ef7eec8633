//! Unpack / normalize / round-and-pack plumbing shared by the arithmetic
//! and conversion routines.
//!
//! Intermediate results are carried as a sign, an i32 exponent in the 80-bit
//! biased scale (free to wander outside the representable range), and a
//! 128-bit significand `hi:lo` whose most significant bit sits at bit 127
//! for a normalized value. Rounding happens exactly once, at the precision
//! of the destination format.

use crate::{Flags, FpEnv, Fx80, Precision, RoundingMode};

/// A decomposed finite value. `sig` has its integer bit at bit 63 unless the
/// value is zero.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Unpacked {
    pub sign: bool,
    pub exp: i32,
    pub sig: u64,
}

/// Split a finite `Fx80` into sign/exponent/significand, normalizing
/// denormal (and pseudo-denormal) encodings so `sig` always carries its top
/// bit. Zero comes back with `sig == 0`.
pub(crate) fn unpack(a: Fx80) -> Unpacked {
    let sign = a.is_neg();
    let exp_field = (a.high & 0x7FFF) as i32;
    if a.is_zero() {
        return Unpacked { sign, exp: 0, sig: 0 };
    }
    let mut exp = if exp_field == 0 { 1 } else { exp_field };
    let mut sig = a.low;
    let lead = sig.leading_zeros();
    if lead != 0 {
        sig <<= lead;
        exp -= lead as i32;
    }
    Unpacked { sign, exp, sig }
}

#[inline]
pub(crate) fn pack(sign: bool, exp: u16, sig: u64) -> Fx80 {
    Fx80 { high: exp | if sign { 0x8000 } else { 0 }, low: sig }
}

#[inline]
pub(crate) fn zero(sign: bool) -> Fx80 {
    if sign {
        Fx80::NEG_ZERO
    } else {
        Fx80::ZERO
    }
}

#[inline]
pub(crate) fn inf(sign: bool) -> Fx80 {
    if sign {
        Fx80::NEG_INF
    } else {
        Fx80::INFINITY
    }
}

/// Largest finite value of the given precision, widened to `Fx80`.
fn max_finite(sign: bool, prec: Precision) -> Fx80 {
    let keep = prec.sig_bits();
    let sig = (u64::MAX << (64 - keep)) | (1 << 63);
    pack(sign, prec.max_exp() as u16, sig)
}

/// Shift a 128-bit quantity right, folding shifted-out bits into the lowest
/// bit (sticky jam).
pub(crate) fn shr128_jam(hi: u64, lo: u64, n: u32) -> (u64, u64) {
    let q = ((hi as u128) << 64) | lo as u128;
    if n == 0 {
        (hi, lo)
    } else if n >= 128 {
        (0, (q != 0) as u64)
    } else {
        let out = q >> n;
        let jam = (q << (128 - n)) != 0;
        ((out >> 64) as u64, out as u64 | jam as u64)
    }
}

/// Propagate a NaN operand: any signaling NaN raises INVALID; the first NaN
/// operand is returned quieted.
pub(crate) fn propagate_nan(a: Fx80, b: Fx80, env: &mut FpEnv) -> Fx80 {
    if a.is_signaling_nan() || b.is_signaling_nan() {
        env.raise(Flags::INVALID);
    }
    let nan = if a.is_nan() { a } else { b };
    Fx80 { high: nan.high, low: nan.low | (1 << 62) }
}

pub(crate) fn invalid(env: &mut FpEnv) -> Fx80 {
    env.raise(Flags::INVALID);
    Fx80::INDEFINITE
}

/// Round the 128-bit significand `hi:lo` to `keep` bits.
///
/// Returns the rounded significand aligned to bit 63, a carry flag (the
/// significand overflowed to `10...0`, caller bumps the exponent), and
/// whether any precision was lost.
fn round_sig(hi: u64, lo: u64, keep: u32, mode: RoundingMode, sign: bool) -> (u64, bool, bool) {
    debug_assert!((1..=64).contains(&keep));
    let q = ((hi as u128) << 64) | lo as u128;
    let drop = 128 - keep;
    let kept = (q >> drop) as u64;
    let round_bit = (q >> (drop - 1)) & 1 != 0;
    let sticky = (q & ((1u128 << (drop - 1)) - 1)) != 0;
    let inexact = round_bit || sticky;
    let inc = match mode {
        RoundingMode::NearestEven => round_bit && (sticky || kept & 1 != 0),
        RoundingMode::Down => sign && inexact,
        RoundingMode::Up => !sign && inexact,
        RoundingMode::TowardZero => false,
    };
    let sum = kept as u128 + inc as u128;
    if sum >> keep != 0 {
        (1 << 63, true, inexact)
    } else {
        (((sum as u64) << (64 - keep)), false, inexact)
    }
}

/// Round and pack a normalized intermediate into an `Fx80` at the given
/// precision, handling gradual underflow and overflow with the IEEE default
/// responses and sticky flags.
///
/// `hi` must have bit 63 set unless the value is exactly zero.
pub(crate) fn round_pack(
    sign: bool,
    mut exp: i32,
    hi: u64,
    lo: u64,
    prec: Precision,
    env: &mut FpEnv,
) -> Fx80 {
    if hi == 0 && lo == 0 {
        return zero(sign);
    }

    let keep = prec.sig_bits();
    let min_exp = prec.min_exp();
    let tiny = exp < min_exp;

    let (mut hi, mut lo) = (hi, lo);
    if tiny {
        let shift = (min_exp - exp) as u32;
        (hi, lo) = shr128_jam(hi, lo, shift);
        exp = min_exp;
        if hi == 0 && lo <= 1 {
            // Everything shifted out: round the residue as pure sticky.
            env.raise(Flags::UNDERFLOW);
            if lo == 0 {
                return zero(sign);
            }
            env.raise(Flags::INEXACT);
            let up = match env.rounding {
                RoundingMode::Down => sign,
                RoundingMode::Up => !sign,
                _ => false,
            };
            return if up { smallest(sign, prec) } else { zero(sign) };
        }
    }

    let (mut sig, carry, inexact) = round_sig(hi, lo, keep, env.rounding, sign);
    if carry {
        exp += 1;
    }
    if inexact {
        env.raise(Flags::INEXACT);
        if tiny {
            env.raise(Flags::UNDERFLOW);
        }
    }

    if exp > prec.max_exp() {
        env.raise(Flags::OVERFLOW);
        env.raise(Flags::INEXACT);
        return match env.rounding {
            RoundingMode::NearestEven => inf(sign),
            RoundingMode::TowardZero => max_finite(sign, prec),
            RoundingMode::Down => {
                if sign {
                    inf(sign)
                } else {
                    max_finite(sign, prec)
                }
            }
            RoundingMode::Up => {
                if sign {
                    max_finite(sign, prec)
                } else {
                    inf(sign)
                }
            }
        };
    }

    if sig >> 63 == 0 {
        match prec {
            // Extended tiny results pack as true 80-bit denormals.
            Precision::Extended => {
                debug_assert_eq!(exp, 1);
                return pack(sign, 0, sig);
            }
            // Narrow-precision tiny results are subnormal in the narrow
            // format but normal in the 80-bit one: renormalize.
            _ => {
                if sig == 0 {
                    return zero(sign);
                }
                let lead = sig.leading_zeros();
                sig <<= lead;
                exp -= lead as i32;
            }
        }
    }

    pack(sign, exp as u16, sig)
}

/// Smallest positive (or negative) value of the precision, widened.
fn smallest(sign: bool, prec: Precision) -> Fx80 {
    match prec {
        Precision::Extended => pack(sign, 0, 1),
        _ => {
            // Smallest subnormal of the narrow format, renormalized.
            let exp = prec.min_exp() - (prec.sig_bits() as i32 - 1);
            pack(sign, exp as u16, 1 << 63)
        }
    }
}
