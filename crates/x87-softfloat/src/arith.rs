//! Addition, subtraction, multiplication, division, square root, IEEE
//! remainder, round-to-integer and exponent scaling.
//!
//! The four basic operations take a [`Precision`]: operands are quantized to
//! the narrow format first and the single rounding happens at that
//! precision, which reproduces the convert / operate-narrow / widen sequence
//! the precision-control field calls for.

use crate::round::{inf, invalid, pack, propagate_nan, round_pack, shr128_jam, unpack, zero};
use crate::{Flags, FpEnv, Fx80, Precision, RoundingMode, BIAS};

/// Quantize a finite value to the computation precision. Extended precision
/// is the identity; specials pass through untouched.
fn quantize(a: Fx80, prec: Precision, env: &mut FpEnv) -> Fx80 {
    if matches!(prec, Precision::Extended) || a.is_nan() || a.is_inf() || a.is_zero() {
        return a;
    }
    let u = unpack(a);
    round_pack(u.sign, u.exp, u.sig, 0, prec, env)
}

pub fn add(a: Fx80, b: Fx80, prec: Precision, env: &mut FpEnv) -> Fx80 {
    if a.is_nan() || b.is_nan() {
        return propagate_nan(a, b, env);
    }
    add_sub(quantize(a, prec, env), quantize(b, prec, env), false, prec, env)
}

pub fn sub(a: Fx80, b: Fx80, prec: Precision, env: &mut FpEnv) -> Fx80 {
    if a.is_nan() || b.is_nan() {
        return propagate_nan(a, b, env);
    }
    add_sub(quantize(a, prec, env), quantize(b, prec, env), true, prec, env)
}

fn add_sub(a: Fx80, b: Fx80, negate_b: bool, prec: Precision, env: &mut FpEnv) -> Fx80 {
    let b = if negate_b { b.neg() } else { b };

    if a.is_inf() || b.is_inf() {
        if a.is_inf() && b.is_inf() {
            if a.is_neg() != b.is_neg() {
                return invalid(env);
            }
            return a;
        }
        return if a.is_inf() { a } else { b };
    }
    if a.is_zero() && b.is_zero() {
        if a.is_neg() == b.is_neg() {
            return a;
        }
        return zero(matches!(env.rounding, RoundingMode::Down));
    }
    if a.is_zero() {
        return b;
    }
    if b.is_zero() {
        return a;
    }

    let ua = unpack(a);
    let ub = unpack(b);
    if ua.sign == ub.sign {
        mag_add(ua.sign, ua.exp, ua.sig, ub.exp, ub.sig, prec, env)
    } else {
        mag_sub(ua.sign, ua.exp, ua.sig, ub.exp, ub.sig, prec, env)
    }
}

fn mag_add(
    sign: bool,
    ea: i32,
    sa: u64,
    eb: i32,
    sb: u64,
    prec: Precision,
    env: &mut FpEnv,
) -> Fx80 {
    let (mut exp, big, small, d) = if (ea, sa) >= (eb, sb) {
        (ea, sa, sb, (ea - eb) as u32)
    } else {
        (eb, sb, sa, (eb - ea) as u32)
    };
    let (shi, slo) = shr128_jam(small, 0, d);
    let (mut hi, carry) = big.overflowing_add(shi);
    let mut lo = slo;
    if carry {
        let (nhi, nlo) = shr128_jam(hi, lo, 1);
        hi = nhi | (1 << 63);
        lo = nlo;
        exp += 1;
    }
    round_pack(sign, exp, hi, lo, prec, env)
}

fn mag_sub(
    sign_a: bool,
    ea: i32,
    sa: u64,
    eb: i32,
    sb: u64,
    prec: Precision,
    env: &mut FpEnv,
) -> Fx80 {
    if (ea, sa) == (eb, sb) {
        // Exact cancellation: +0, or -0 when rounding down.
        return zero(matches!(env.rounding, RoundingMode::Down));
    }
    let (sign, exp, big, se, small) = if (ea, sa) > (eb, sb) {
        (sign_a, ea, sa, eb, sb)
    } else {
        (!sign_a, eb, sb, ea, sa)
    };
    let d = (exp - se) as u32;
    let (shi, slo) = shr128_jam(small, 0, d);
    let big_q = (big as u128) << 64;
    let small_q = ((shi as u128) << 64) | slo as u128;
    let diff = big_q - small_q;
    let lead = diff.leading_zeros();
    let norm = diff << lead;
    round_pack(
        sign,
        exp - lead as i32,
        (norm >> 64) as u64,
        norm as u64,
        prec,
        env,
    )
}

pub fn mul(a: Fx80, b: Fx80, prec: Precision, env: &mut FpEnv) -> Fx80 {
    if a.is_nan() || b.is_nan() {
        return propagate_nan(a, b, env);
    }
    let a = quantize(a, prec, env);
    let b = quantize(b, prec, env);
    let sign = a.is_neg() != b.is_neg();

    if a.is_inf() || b.is_inf() {
        if a.is_zero() || b.is_zero() {
            return invalid(env);
        }
        return inf(sign);
    }
    if a.is_zero() || b.is_zero() {
        return zero(sign);
    }

    let ua = unpack(a);
    let ub = unpack(b);
    let mut exp = ua.exp + ub.exp - BIAS;
    let mut p = (ua.sig as u128) * (ub.sig as u128);
    if p >> 127 != 0 {
        exp += 1;
    } else {
        p <<= 1;
    }
    round_pack(sign, exp, (p >> 64) as u64, p as u64, prec, env)
}

pub fn div(a: Fx80, b: Fx80, prec: Precision, env: &mut FpEnv) -> Fx80 {
    if a.is_nan() || b.is_nan() {
        return propagate_nan(a, b, env);
    }
    let a = quantize(a, prec, env);
    let b = quantize(b, prec, env);
    let sign = a.is_neg() != b.is_neg();

    if a.is_inf() {
        if b.is_inf() {
            return invalid(env);
        }
        return inf(sign);
    }
    if b.is_inf() {
        return zero(sign);
    }
    if b.is_zero() {
        if a.is_zero() {
            return invalid(env);
        }
        env.raise(Flags::DIV_BY_ZERO);
        return inf(sign);
    }
    if a.is_zero() {
        return zero(sign);
    }

    let ua = unpack(a);
    let ub = unpack(b);
    let mut exp = ua.exp - ub.exp + BIAS;
    let num = if ua.sig >= ub.sig {
        (ua.sig as u128) << 63
    } else {
        exp -= 1;
        (ua.sig as u128) << 64
    };
    let den = ub.sig as u128;
    let q = (num / den) as u64;
    let r = num % den;
    let extra = rem_to_extra(r, den);
    round_pack(sign, exp, q, extra, prec, env)
}

/// Encode a division remainder as round/sticky bits below the quotient.
fn rem_to_extra(r: u128, den: u128) -> u64 {
    if r == 0 {
        return 0;
    }
    match (r << 1).cmp(&den) {
        core::cmp::Ordering::Greater => (1 << 63) | 1,
        core::cmp::Ordering::Equal => 1 << 63,
        core::cmp::Ordering::Less => 1,
    }
}

pub fn sqrt(a: Fx80, env: &mut FpEnv) -> Fx80 {
    if a.is_nan() {
        return propagate_nan(a, a, env);
    }
    if a.is_zero() {
        return a;
    }
    if a.is_neg() {
        return invalid(env);
    }
    if a.is_inf() {
        return a;
    }

    let ua = unpack(a);
    let e = ua.exp - BIAS;
    let rad: u128 = if e & 1 == 0 {
        (ua.sig as u128) << 63
    } else {
        (ua.sig as u128) << 64
    };

    // Restoring square root: 64 result bits from the 128-bit radicand.
    let mut rad = rad;
    let mut rem: u128 = 0;
    let mut root: u128 = 0;
    for _ in 0..64 {
        rem = (rem << 2) | (rad >> 126);
        rad <<= 2;
        root <<= 1;
        let trial = (root << 1) | 1;
        if rem >= trial {
            rem -= trial;
            root |= 1;
        }
    }

    let extra = if rem == 0 {
        0
    } else if rem > root {
        (1 << 63) | 1
    } else {
        1
    };
    round_pack(false, (e >> 1) + BIAS, root as u64, extra, Precision::Extended, env)
}

/// IEEE round-to-nearest-even remainder: `a - n*b` with `n` the integer
/// nearest `a/b`. The result is exact; only the invalid cases raise flags.
pub fn rem(a: Fx80, b: Fx80, env: &mut FpEnv) -> Fx80 {
    if a.is_nan() || b.is_nan() {
        return propagate_nan(a, b, env);
    }
    if a.is_inf() || b.is_zero() {
        return invalid(env);
    }
    if b.is_inf() || a.is_zero() {
        return a;
    }

    let ua = unpack(a);
    let ub = unpack(b);

    if ua.exp < ub.exp - 1 {
        // |a| < |b|/2: nearest multiple is zero.
        return a;
    }

    if ua.exp == ub.exp - 1 {
        // 2|a| and |b| share an exponent; n is 0 or 1.
        if ua.sig > ub.sig {
            // |a| > |b|/2: r = |a| - |b|, sign flipped.
            let mag = ((ub.sig as u128) << 1) - ua.sig as u128;
            return pack_exact(!ua.sign, ub.exp - 1, mag, env);
        }
        // |a| <= |b|/2 (ties pick the even n = 0).
        return a;
    }

    // Chunked long division keeping only the remainder and quotient parity.
    let mb = ub.sig as u128;
    let mut r: u128 = ua.sig as u128;
    let mut e = ua.exp;
    let mut q_low: u64 = 0;
    while e > ub.exp {
        let k = (e - ub.exp).min(63) as u32;
        r <<= k;
        q_low = (q_low << k).wrapping_add((r / mb) as u64);
        r %= mb;
        e -= k as i32;
    }
    if e == ub.exp && r >= mb {
        r -= mb;
        q_low = q_low.wrapping_add(1);
    }

    // Nearest adjustment (ties to even quotient).
    let twice = r << 1;
    if twice > mb || (twice == mb && q_low & 1 != 0) {
        return pack_exact(!ua.sign, ub.exp, mb - r, env);
    }
    if r == 0 {
        return zero(ua.sign);
    }
    pack_exact(ua.sign, ub.exp, r, env)
}

/// Pack an exact magnitude `m * 2^(exp - BIAS - 63)`; `m < 2^65`.
fn pack_exact(sign: bool, exp: i32, m: u128, env: &mut FpEnv) -> Fx80 {
    if m == 0 {
        return zero(sign);
    }
    let lead = m.leading_zeros();
    let norm = m << lead;
    round_pack(
        sign,
        exp + (127 - lead as i32) - 63,
        (norm >> 64) as u64,
        norm as u64,
        Precision::Extended,
        env,
    )
}

/// Round to an integer in the current rounding mode, keeping the 80-bit
/// format.
pub fn round_to_int(a: Fx80, env: &mut FpEnv) -> Fx80 {
    let exp = (a.high & 0x7FFF) as i32;
    if exp == 0x7FFF {
        if a.is_nan() {
            return propagate_nan(a, a, env);
        }
        return a;
    }
    if exp >= 0x403E {
        // Already integral (2^63 and beyond has no fraction bits).
        return a;
    }
    if exp < BIAS {
        // |a| < 1.
        if a.is_zero() {
            return a;
        }
        env.raise(Flags::INEXACT);
        let sign = a.is_neg();
        let one = pack(sign, BIAS as u16, 1 << 63);
        return match env.rounding {
            RoundingMode::NearestEven => {
                if exp == BIAS - 1 && (a.low << 1) != 0 {
                    one
                } else {
                    zero(sign)
                }
            }
            RoundingMode::Down => {
                if sign {
                    one
                } else {
                    zero(sign)
                }
            }
            RoundingMode::Up => {
                if sign {
                    zero(sign)
                } else {
                    one
                }
            }
            RoundingMode::TowardZero => zero(sign),
        };
    }

    let last_bit = 1u64 << (0x403E - exp);
    let round_mask = last_bit - 1;
    let sign = a.is_neg();
    let mut low = a.low;
    match env.rounding {
        RoundingMode::NearestEven => {
            low = low.wrapping_add(last_bit >> 1);
            if low & round_mask == 0 {
                low &= !last_bit;
            }
        }
        RoundingMode::Down => {
            if sign {
                low = low.wrapping_add(round_mask);
            }
        }
        RoundingMode::Up => {
            if !sign {
                low = low.wrapping_add(round_mask);
            }
        }
        RoundingMode::TowardZero => {}
    }
    low &= !round_mask;

    let mut exp = exp;
    if low == 0 {
        // Carried out of the significand.
        exp += 1;
        low = 1 << 63;
    }
    if low != a.low {
        env.raise(Flags::INEXACT);
    }
    pack(sign, exp as u16, low)
}

/// `a * 2^trunc(b)`, the FSCALE primitive.
pub fn scale(a: Fx80, b: Fx80, env: &mut FpEnv) -> Fx80 {
    if a.is_nan() || b.is_nan() {
        return propagate_nan(a, b, env);
    }
    if b.is_inf() {
        if (a.is_zero() && !b.is_neg()) || (a.is_inf() && b.is_neg()) {
            return invalid(env);
        }
        return if b.is_neg() { zero(a.is_neg()) } else { inf(a.is_neg()) };
    }
    if a.is_inf() || a.is_zero() || b.is_zero() {
        return a;
    }

    let ub = unpack(b);
    let e = ub.exp - BIAS;
    let n: i32 = if e < 0 {
        0
    } else if e > 30 {
        if ub.sign {
            -(1 << 30)
        } else {
            1 << 30
        }
    } else {
        let mag = (ub.sig >> (63 - e)) as i32;
        if ub.sign {
            -mag
        } else {
            mag
        }
    };

    let ua = unpack(a);
    round_pack(ua.sign, ua.exp + n, ua.sig, 0, Precision::Extended, env)
}
