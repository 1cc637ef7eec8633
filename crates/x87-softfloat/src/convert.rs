//! Conversions between the 80-bit format and the 32/64-bit binary formats
//! and the signed integer widths.
//!
//! Widening conversions are exact (and therefore flag-free): subnormal
//! sources normalize into the 80-bit format's larger exponent range, and NaN
//! payloads keep their signaling/quiet encoding. Narrowing conversions round
//! through the current environment and raise the usual sticky flags.

use crate::round::{pack, shr128_jam, unpack, zero};
use crate::{Flags, FpEnv, Fx80, RoundingMode, BIAS};

struct NarrowFormat {
    /// Significand bits, hidden bit included.
    sig_bits: u32,
    frac_bits: u32,
    exp_bias: i32,
    exp_max: i32,
    exp_field_max: u64,
}

const F32: NarrowFormat = NarrowFormat {
    sig_bits: 24,
    frac_bits: 23,
    exp_bias: 127,
    exp_max: 127,
    exp_field_max: 0xFF,
};

const F64: NarrowFormat = NarrowFormat {
    sig_bits: 53,
    frac_bits: 52,
    exp_bias: 1023,
    exp_max: 1023,
    exp_field_max: 0x7FF,
};

pub fn from_f32_bits(bits: u32) -> Fx80 {
    widen(bits as u64, &F32)
}

pub fn from_f64_bits(bits: u64) -> Fx80 {
    widen(bits, &F64)
}

fn widen(bits: u64, fmt: &NarrowFormat) -> Fx80 {
    let sign = bits >> (fmt.frac_bits + fmt.exp_bits()) & 1 != 0;
    let exp = (bits >> fmt.frac_bits) & fmt.exp_field_max;
    let frac = bits & ((1 << fmt.frac_bits) - 1);
    let top_shift = 63 - fmt.frac_bits;

    if exp == fmt.exp_field_max {
        if frac == 0 {
            return if sign { Fx80::NEG_INF } else { Fx80::INFINITY };
        }
        // NaN: fraction moves to the top of the 80-bit significand, keeping
        // the quiet bit in place.
        return pack(sign, 0x7FFF, (1 << 63) | (frac << top_shift));
    }
    if exp == 0 {
        if frac == 0 {
            return zero(sign);
        }
        // Subnormal: normalize into the wider exponent range.
        let lead = frac.leading_zeros();
        let sig = frac << lead;
        let e = (63 - lead as i32) - fmt.frac_bits as i32 + 1 - fmt.exp_bias;
        return pack(sign, (e + BIAS) as u16, sig);
    }

    let sig = (1 << 63) | (frac << top_shift);
    let e = exp as i32 - fmt.exp_bias;
    pack(sign, (e + BIAS) as u16, sig)
}

pub fn to_f32_bits(a: Fx80, env: &mut FpEnv) -> u32 {
    narrow(a, &F32, env) as u32
}

pub fn to_f64_bits(a: Fx80, env: &mut FpEnv) -> u64 {
    narrow(a, &F64, env)
}

fn narrow(a: Fx80, fmt: &NarrowFormat, env: &mut FpEnv) -> u64 {
    let sign_bit = (a.is_neg() as u64) << (fmt.frac_bits + fmt.exp_bits());
    let exp_all = fmt.exp_field_max << fmt.frac_bits;
    let top_shift = 63 - fmt.frac_bits;

    if a.is_nan() {
        if a.is_signaling_nan() {
            env.raise(Flags::INVALID);
        }
        let frac = (a.low >> top_shift) & ((1 << fmt.frac_bits) - 1);
        let quiet = 1 << (fmt.frac_bits - 1);
        return sign_bit | exp_all | quiet | frac;
    }
    if a.is_inf() {
        return sign_bit | exp_all;
    }
    if a.is_zero() {
        return sign_bit;
    }

    let u = unpack(a);
    let mut e = u.exp - BIAS;
    let min_exp = 1 - fmt.exp_bias;
    let tiny = e < min_exp;

    let (mut hi, mut lo) = (u.sig, 0u64);
    if tiny {
        (hi, lo) = shr128_jam(hi, lo, (min_exp - e) as u32);
        e = min_exp;
    }

    let q = ((hi as u128) << 64) | lo as u128;
    let drop = 128 - fmt.sig_bits;
    let kept = (q >> drop) as u64;
    let round_bit = (q >> (drop - 1)) & 1 != 0;
    let sticky = (q & ((1u128 << (drop - 1)) - 1)) != 0;
    let inexact = round_bit || sticky;
    let inc = match env.rounding {
        RoundingMode::NearestEven => round_bit && (sticky || kept & 1 != 0),
        RoundingMode::Down => u.sign && inexact,
        RoundingMode::Up => !u.sign && inexact,
        RoundingMode::TowardZero => false,
    };
    let mut sig = kept + inc as u64;
    if sig >> fmt.sig_bits != 0 {
        sig >>= 1;
        e += 1;
    }
    if inexact {
        env.raise(Flags::INEXACT);
        if tiny {
            env.raise(Flags::UNDERFLOW);
        }
    }

    if e > fmt.exp_max {
        env.raise(Flags::OVERFLOW);
        env.raise(Flags::INEXACT);
        let max_finite = sign_bit | (exp_all - (1 << fmt.frac_bits)) | ((1 << fmt.frac_bits) - 1);
        return match env.rounding {
            RoundingMode::NearestEven => sign_bit | exp_all,
            RoundingMode::TowardZero => max_finite,
            RoundingMode::Down => {
                if u.sign {
                    sign_bit | exp_all
                } else {
                    max_finite
                }
            }
            RoundingMode::Up => {
                if u.sign {
                    max_finite
                } else {
                    sign_bit | exp_all
                }
            }
        };
    }

    if sig >> (fmt.sig_bits - 1) == 0 {
        // Subnormal in the narrow format: exponent field zero.
        return sign_bit | sig;
    }
    let biased = (e + fmt.exp_bias) as u64;
    sign_bit | (biased << fmt.frac_bits) | (sig & ((1 << fmt.frac_bits) - 1))
}

impl NarrowFormat {
    fn exp_bits(&self) -> u32 {
        self.exp_field_max.trailing_ones()
    }
}

pub fn from_i32(v: i32) -> Fx80 {
    from_i64(v as i64)
}

pub fn from_i64(v: i64) -> Fx80 {
    if v == 0 {
        return Fx80::ZERO;
    }
    let sign = v < 0;
    let mag = v.unsigned_abs();
    let lead = mag.leading_zeros();
    pack(sign, (BIAS + 63 - lead as i32) as u16, mag << lead)
}

/// Convert to i64 in the environment's rounding mode. Out-of-range values
/// (NaN included) raise INVALID and saturate to the sign-matching limit.
pub fn to_i64(a: Fx80, env: &mut FpEnv) -> i64 {
    convert_to_i64(a, env.rounding, env)
}

/// Convert to i64 truncating toward zero regardless of the rounding mode.
pub fn to_i64_round_to_zero(a: Fx80, env: &mut FpEnv) -> i64 {
    convert_to_i64(a, RoundingMode::TowardZero, env)
}

fn convert_to_i64(a: Fx80, mode: RoundingMode, env: &mut FpEnv) -> i64 {
    if a.is_nan() {
        env.raise(Flags::INVALID);
        return i64::MIN;
    }
    if a.is_zero() {
        return 0;
    }
    let u = unpack(a);
    let e = u.exp - BIAS;
    if e > 63 || (e == 63 && !(u.sign && u.sig == 1 << 63)) {
        env.raise(Flags::INVALID);
        return if u.sign { i64::MIN } else { i64::MAX };
    }
    if e == 63 {
        return i64::MIN; // exactly -2^63
    }

    let shift = 63 - e;
    let (kept, round_bit, sticky) = if shift >= 65 {
        (0u64, false, true)
    } else if shift == 64 {
        (0u64, u.sig >> 63 != 0, u.sig << 1 != 0)
    } else {
        let kept = u.sig >> shift;
        let round_bit = (u.sig >> (shift - 1)) & 1 != 0;
        let sticky = shift > 1 && (u.sig << (65 - shift)) != 0;
        (kept, round_bit, sticky)
    };
    let inexact = round_bit || sticky;
    let inc = match mode {
        RoundingMode::NearestEven => round_bit && (sticky || kept & 1 != 0),
        RoundingMode::Down => u.sign && inexact,
        RoundingMode::Up => !u.sign && inexact,
        RoundingMode::TowardZero => false,
    };
    let mag = kept as u128 + inc as u128;
    if inexact {
        env.raise(Flags::INEXACT);
    }

    let limit: u128 = if u.sign { 1 << 63 } else { (1 << 63) - 1 };
    if mag > limit {
        env.raise(Flags::INVALID);
        return if u.sign { i64::MIN } else { i64::MAX };
    }
    if u.sign {
        (mag as u64).wrapping_neg() as i64
    } else {
        mag as i64
    }
}

/// Convert to i32 in the environment's rounding mode, saturating with
/// INVALID out of range.
pub fn to_i32(a: Fx80, env: &mut FpEnv) -> i32 {
    let v = convert_to_i64(a, env.rounding, env);
    if v > i32::MAX as i64 {
        env.raise(Flags::INVALID);
        i32::MAX
    } else if v < i32::MIN as i64 {
        env.raise(Flags::INVALID);
        i32::MIN
    } else {
        v as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_widen_is_exact() {
        assert_eq!(from_f64_bits(1.0f64.to_bits()), Fx80::ONE);
        assert_eq!(
            from_f64_bits((-2.5f64).to_bits()),
            Fx80::new(0xC000, 0xA000_0000_0000_0000)
        );
        assert_eq!(from_f64_bits(f64::INFINITY.to_bits()), Fx80::INFINITY);
        assert_eq!(from_f64_bits((-0.0f64).to_bits()), Fx80::NEG_ZERO);
    }

    #[test]
    fn f32_subnormals_normalize() {
        // Smallest positive f32 subnormal: 2^-149.
        let v = from_f32_bits(1);
        assert!(!v.is_denormal());
        let mut env = FpEnv::new();
        assert_eq!(to_f32_bits(v, &mut env), 1);
        assert!(env.flags.is_empty());
    }

    #[test]
    fn signaling_nan_payload_survives_widening() {
        // f32 sNaN: quiet bit clear, payload 1.
        let snan = 0x7F80_0001u32;
        let v = from_f32_bits(snan);
        assert!(v.is_signaling_nan());

        let mut env = FpEnv::new();
        let back = to_f32_bits(v, &mut env);
        assert!(env.flags.contains(Flags::INVALID));
        // Narrowing quiets.
        assert_eq!(back, 0x7FC0_0001);
    }

    #[test]
    fn f64_roundtrip_of_sample_values() {
        let mut env = FpEnv::new();
        for v in [0.1f64, 1.5, -3.25, 1e300, 5e-324, f64::MIN_POSITIVE] {
            let bits = v.to_bits();
            assert_eq!(to_f64_bits(from_f64_bits(bits), &mut env), bits, "{v}");
        }
        assert!(env.flags.is_empty());
    }

    #[test]
    fn narrowing_rounds_and_flags() {
        let mut env = FpEnv::new();
        // 1 + 2^-60 does not fit in a double.
        let v = crate::add(
            Fx80::ONE,
            Fx80::two_pow(-60),
            crate::Precision::Extended,
            &mut env,
        );
        assert!(env.flags.is_empty());
        let bits = to_f64_bits(v, &mut env);
        assert_eq!(bits, 1.0f64.to_bits());
        assert!(env.flags.contains(Flags::INEXACT));

        let mut env = FpEnv::new();
        let big = Fx80::new(0x4400, 1 << 63); // 2^1025
        assert_eq!(to_f64_bits(big, &mut env), f64::INFINITY.to_bits());
        assert!(env.flags.contains(Flags::OVERFLOW));

        let mut env = FpEnv { rounding: RoundingMode::TowardZero, flags: Flags::empty() };
        assert_eq!(to_f64_bits(big, &mut env), f64::MAX.to_bits());
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(from_i32(0), Fx80::ZERO);
        assert_eq!(from_i32(1), Fx80::ONE);
        assert_eq!(from_i32(-32768), Fx80::new(0xC00E, 0x8000_0000_0000_0000));
        assert_eq!(from_i64(i64::MIN), Fx80::new(0xC03E, 0x8000_0000_0000_0000));

        let mut env = FpEnv::new();
        assert_eq!(to_i64(from_i64(123_456_789), &mut env), 123_456_789);
        assert_eq!(to_i32(from_i32(-7), &mut env), -7);
        assert!(env.flags.is_empty());

        assert_eq!(to_i64_round_to_zero(from_f64_bits(2.9f64.to_bits()), &mut env), 2);
        assert_eq!(
            to_i64_round_to_zero(from_f64_bits((-2.9f64).to_bits()), &mut env),
            -2
        );
        assert!(env.flags.contains(Flags::INEXACT));

        let mut env = FpEnv::new();
        assert_eq!(to_i64(from_f64_bits(2.5f64.to_bits()), &mut env), 2);
        assert_eq!(to_i64(from_f64_bits(3.5f64.to_bits()), &mut env), 4);

        let mut env = FpEnv::new();
        assert_eq!(to_i64(Fx80::INFINITY, &mut env), i64::MAX);
        assert!(env.flags.contains(Flags::INVALID));
    }
}
