//! Sign manipulation, square root, scaling, rounding and the partial
//! remainders.

use x87_softfloat::{
    div, eq, from_i32, from_i64, mul, rem, round_to_int, scale, sqrt, sub, to_i64_round_to_zero,
    Fx80, Precision,
};

use crate::host::HostState;
use crate::state::{Fpu, SW_C0, SW_C1, SW_C2, SW_C3, SW_IE, SW_ZE};
use crate::Fault;

impl Fpu {
    /// FCHS / FABS: raw sign-bit edits, no reclassification.
    pub(crate) fn fchs(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let value = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            self.sw &= !SW_C1;
            self.st(0).neg()
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, false);
        }
        Ok(())
    }

    pub(crate) fn fabs(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let value = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            self.sw &= !SW_C1;
            self.st(0).abs()
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, false);
        }
        Ok(())
    }

    /// FSQRT: negative non-zero and denormal operands are invalid.
    pub(crate) fn fsqrt(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let value = self.st(0);
            if (!value.is_zero() && value.is_neg()) || value.is_denormal() {
                self.sw |= SW_IE;
                Fx80::INDEFINITE
            } else {
                sqrt(value, &mut self.env)
            }
        };

        if self.check_exceptions(host) {
            self.write_stack(0, result, true);
        }
        Ok(())
    }

    /// FSCALE: ST(0) * 2^trunc(ST(1)).
    pub(crate) fn fscale(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let value = if self.is_st_empty(0) || self.is_st_empty(1) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            self.sw &= !SW_C1;
            let (a, b) = (self.st(0), self.st(1));
            scale(a, b, &mut self.env)
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, false);
        }
        Ok(())
    }

    pub(crate) fn frndint(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let value = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            self.sw &= !SW_C1;
            round_to_int(self.st(0), &mut self.env)
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, true);
        }
        Ok(())
    }

    /// FXTRACT: exponent (as a float) into the lower slot, significand with
    /// a zeroed exponent on top.
    pub(crate) fn fxtract(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let (exp80, sig80);
        if self.is_st_empty(0) {
            self.set_stack_underflow();
            exp80 = Fx80::INDEFINITE;
            sig80 = Fx80::INDEFINITE;
        } else if !self.is_st_empty(7) {
            self.set_stack_overflow();
            exp80 = Fx80::INDEFINITE;
            sig80 = Fx80::INDEFINITE;
        } else {
            let value = self.st(0);
            if eq(value, Fx80::ZERO, &mut self.env) {
                self.sw |= SW_ZE;
                exp80 = Fx80::NEG_INF;
                sig80 = Fx80::ZERO;
            } else {
                exp80 = from_i32(i32::from(value.high & 0x7FFF) - 0x3FFF);
                sig80 = Fx80 { high: (value.high & 0x8000) | 0x3FFF, low: value.low };
            }
        }

        if self.check_exceptions(host) {
            self.write_stack(0, exp80, true);
            self.push();
            self.write_stack(0, sig80, true);
        }
        Ok(())
    }

    /// FPREM: the 8087 truncating remainder. Exponent gaps of 64 or more
    /// take a partial-reduction step (63 bits at a time) and report C2.
    pub(crate) fn fprem(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) || self.is_st_empty(1) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let a0 = self.st(0);
            let b1 = self.st(1);

            self.sw &= !SW_C2;

            let d = i32::from(a0.high & 0x7FFF) - i32::from(b1.high & 0x7FFF);
            if d < 64 {
                let t = div(a0, b1, Precision::Extended, &mut self.env);
                let q = to_i64_round_to_zero(t, &mut self.env);
                let qf = from_i64(q);
                let tt = mul(b1, qf, Precision::Extended, &mut self.env);
                let result = sub(a0, tt, Precision::Extended, &mut self.env);
                self.sw &= !(SW_C0 | SW_C3 | SW_C1);
                if q & 1 != 0 {
                    self.sw |= SW_C1;
                }
                if q & 2 != 0 {
                    self.sw |= SW_C3;
                }
                if q & 4 != 0 {
                    self.sw |= SW_C0;
                }
                result
            } else {
                self.sw |= SW_C2;
                let n = 63;
                let ef = Fx80::two_pow(d - n);
                let t = div(a0, b1, Precision::Extended, &mut self.env);
                let td = div(t, ef, Precision::Extended, &mut self.env);
                let qq = to_i64_round_to_zero(td, &mut self.env);
                let qqf = from_i64(qq);
                let tt = mul(b1, qqf, Precision::Extended, &mut self.env);
                let ttt = mul(tt, ef, Precision::Extended, &mut self.env);
                sub(a0, ttt, Precision::Extended, &mut self.env)
            }
        };

        if self.check_exceptions(host) {
            self.write_stack(0, result, true);
        }
        Ok(())
    }

    /// FPREM1: the IEEE remainder. Condition codes are not derived.
    pub(crate) fn fprem1(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) || self.is_st_empty(1) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let a = self.st(0);
            let b = self.st(1);
            self.sw &= !SW_C2;
            rem(a, b, &mut self.env)
        };

        if self.check_exceptions(host) {
            self.write_stack(0, result, true);
        }
        Ok(())
    }
}
