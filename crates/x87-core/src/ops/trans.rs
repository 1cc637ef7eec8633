//! Transcendentals, computed through host double precision.
//!
//! This is an explicit accuracy gate: the operand drops to an f64 on the way
//! into the backend and widens back afterwards, so results carry double
//! rather than extended precision. C2 is always cleared after argument
//! reduction (true hardware sets it and skips the operation for operands at
//! or beyond 2^63 in magnitude).

use x87_softfloat::{from_f64_bits, mul, to_f64_bits, Fx80, Precision};

use crate::host::HostState;
use crate::state::{Fpu, SW_C2, SW_IE};
use crate::Fault;

/// The host math functions the transcendental handlers lean on. Replaceable
/// so a soft-float transcendental implementation can slot in later.
pub trait TranscendentalBackend {
    fn sin(&self, x: f64) -> f64;
    fn cos(&self, x: f64) -> f64;
    fn tan(&self, x: f64) -> f64;
    fn atan2(&self, y: f64, x: f64) -> f64;
    fn pow(&self, base: f64, exp: f64) -> f64;
    fn ln(&self, x: f64) -> f64;
}

/// Default backend: the host math library.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostMath;

impl TranscendentalBackend for HostMath {
    fn sin(&self, x: f64) -> f64 {
        x.sin()
    }

    fn cos(&self, x: f64) -> f64 {
        x.cos()
    }

    fn tan(&self, x: f64) -> f64 {
        x.tan()
    }

    fn atan2(&self, y: f64, x: f64) -> f64 {
        y.atan2(x)
    }

    fn pow(&self, base: f64, exp: f64) -> f64 {
        base.powf(exp)
    }

    fn ln(&self, x: f64) -> f64 {
        x.ln()
    }
}

impl Fpu {
    fn to_host(&mut self, v: Fx80) -> f64 {
        f64::from_bits(to_f64_bits(v, &mut self.env))
    }

    /// F2XM1: 2^x - 1.
    pub(crate) fn f2xm1(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let x = self.to_host(self.st(0));
            let r = self.trans.pow(2.0, x) - 1.0;
            from_f64_bits(r.to_bits())
        };

        if self.check_exceptions(host) {
            self.write_stack(0, result, true);
        }
        Ok(())
    }

    /// FYL2X: ST(1) * log2(ST(0)), popping once. Negative ST(0) is invalid.
    pub(crate) fn fyl2x(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) || self.is_st_empty(1) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let x = self.st(0);
            let y = self.st(1);
            if x.high & 0x8000 != 0 {
                self.sw |= SW_IE;
                Fx80::INDEFINITE
            } else {
                let d = self.to_host(x);
                let l2x = self.trans.ln(d) / core::f64::consts::LN_2;
                mul(from_f64_bits(l2x.to_bits()), y, Precision::Extended, &mut self.env)
            }
        };

        if self.check_exceptions(host) {
            self.write_stack(1, result, true);
            self.pop();
        }
        Ok(())
    }

    /// FYL2XP1: ST(1) * log2(ST(0) + 1), popping once.
    pub(crate) fn fyl2xp1(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) || self.is_st_empty(1) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let d = self.to_host(self.st(0));
            let y = self.st(1);
            let l2xp1 = self.trans.ln(d + 1.0) / core::f64::consts::LN_2;
            mul(from_f64_bits(l2xp1.to_bits()), y, Precision::Extended, &mut self.env)
        };

        if self.check_exceptions(host) {
            self.write_stack(1, result, true);
            self.pop();
        }
        Ok(())
    }

    /// FPTAN: replaces ST(0) with tan(ST(0)) and pushes 1.0.
    pub(crate) fn fptan(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let (r1, r2);
        if self.is_st_empty(0) {
            self.set_stack_underflow();
            r1 = Fx80::INDEFINITE;
            r2 = Fx80::INDEFINITE;
        } else if !self.is_st_empty(7) {
            self.set_stack_overflow();
            r1 = Fx80::INDEFINITE;
            r2 = Fx80::INDEFINITE;
        } else {
            let x = self.to_host(self.st(0));
            r1 = from_f64_bits(self.trans.tan(x).to_bits());
            r2 = Fx80::ONE;
            self.sw &= !SW_C2;
        }

        if self.check_exceptions(host) {
            self.write_stack(0, r1, true);
            self.push();
            self.write_stack(0, r2, true);
        }
        Ok(())
    }

    /// FPATAN: atan2(ST(1), ST(0)) into ST(1), popping once.
    pub(crate) fn fpatan(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let y = self.to_host(self.st(1));
            let x = self.to_host(self.st(0));
            from_f64_bits(self.trans.atan2(y, x).to_bits())
        };

        if self.check_exceptions(host) {
            self.write_stack(1, result, true);
            self.pop();
        }
        Ok(())
    }

    pub(crate) fn fsin(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let x = self.to_host(self.st(0));
            self.sw &= !SW_C2;
            from_f64_bits(self.trans.sin(x).to_bits())
        };

        if self.check_exceptions(host) {
            self.write_stack(0, result, true);
        }
        Ok(())
    }

    pub(crate) fn fcos(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let x = self.to_host(self.st(0));
            self.sw &= !SW_C2;
            from_f64_bits(self.trans.cos(x).to_bits())
        };

        if self.check_exceptions(host) {
            self.write_stack(0, result, true);
        }
        Ok(())
    }

    /// FSINCOS: sin into ST(0), cos pushed on top.
    pub(crate) fn fsincos(&mut self, host: &mut HostState) -> Result<(), Fault> {
        let (s, c);
        if self.is_st_empty(0) {
            self.set_stack_underflow();
            s = Fx80::INDEFINITE;
            c = Fx80::INDEFINITE;
        } else if !self.is_st_empty(7) {
            self.set_stack_overflow();
            s = Fx80::INDEFINITE;
            c = Fx80::INDEFINITE;
        } else {
            let x = self.to_host(self.st(0));
            s = from_f64_bits(self.trans.sin(x).to_bits());
            c = from_f64_bits(self.trans.cos(x).to_bits());
            self.sw &= !SW_C2;
        }

        if self.check_exceptions(host) {
            self.write_stack(0, s, true);
            self.push();
            self.write_stack(0, c, true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SW_C1;

    fn fx(v: f64) -> Fx80 {
        from_f64_bits(v.to_bits())
    }

    fn back(v: Fx80) -> f64 {
        let mut env = x87_softfloat::FpEnv::new();
        f64::from_bits(to_f64_bits(v, &mut env))
    }

    fn loaded(values: &[f64]) -> Fpu {
        let mut fpu = Fpu::default();
        for &v in values {
            assert!(fpu.push());
            fpu.write_stack(0, fx(v), true);
        }
        fpu
    }

    #[test]
    fn f2xm1_of_one_is_one() {
        let mut fpu = loaded(&[1.0]);
        let mut host = HostState::default();
        fpu.f2xm1(&mut host).unwrap();
        assert_eq!(back(fpu.st(0)), 1.0);
    }

    #[test]
    fn fyl2x_computes_y_log2_x() {
        let mut fpu = loaded(&[3.0, 8.0]); // ST0=8.0, ST1=3.0
        let mut host = HostState::default();
        fpu.fyl2x(&mut host).unwrap();
        assert_eq!(back(fpu.st(0)), 9.0);
        assert!(fpu.is_st_empty(1));
    }

    #[test]
    fn fyl2x_of_negative_is_invalid() {
        let mut fpu = loaded(&[1.0, -2.0]);
        let mut host = HostState::default();
        fpu.fyl2x(&mut host).unwrap();
        assert_eq!(fpu.st(0), Fx80::INDEFINITE);
        assert_eq!(fpu.status_word() & SW_IE, SW_IE);
    }

    #[test]
    fn fptan_pushes_one() {
        let mut fpu = loaded(&[0.0]);
        let mut host = HostState::default();
        fpu.fptan(&mut host).unwrap();
        assert_eq!(back(fpu.st(0)), 1.0);
        assert_eq!(back(fpu.st(1)), 0.0);
        assert_eq!(fpu.status_word() & SW_C2, 0);
    }

    #[test]
    fn fpatan_pops_into_quotient_angle() {
        let mut fpu = loaded(&[1.0, 1.0]);
        let mut host = HostState::default();
        fpu.fpatan(&mut host).unwrap();
        assert_eq!(back(fpu.st(0)), core::f64::consts::FRAC_PI_4);
        assert!(fpu.is_st_empty(1));
    }

    #[test]
    fn fsincos_pushes_cos_over_sin() {
        let mut fpu = loaded(&[0.0]);
        let mut host = HostState::default();
        fpu.fsincos(&mut host).unwrap();
        assert_eq!(back(fpu.st(0)), 1.0); // cos
        assert_eq!(back(fpu.st(1)), 0.0); // sin
    }

    #[test]
    fn fsincos_with_full_stack_overflows() {
        let mut fpu = loaded(&[0.0; 8]);
        let mut host = HostState::default();
        fpu.fsincos(&mut host).unwrap();
        assert_eq!(fpu.status_word() & SW_C1, SW_C1);
    }
}
