//! The add/sub/mul/div families: memory and register forms, reverse and
//! integer variants, and the popping forms.

use x87_softfloat::{from_f32_bits, from_f64_bits, from_i32, Fx80};

use crate::host::HostState;
use crate::mem::Bus;
use crate::state::{Fpu, SW_IE};
use crate::Fault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArithKind {
    Add,
    Sub,
    Mul,
    Div,
}

/// Memory operand encodings of the D8/DA/DC/DE groups. `I16Via32` is the
/// 16-bit integer divide form, which performs a 32-bit read and truncates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MemSrc {
    F32,
    F64,
    I16,
    I32,
    I16Via32,
}

impl Fpu {
    /// Input screening and precision-gated compute shared by the whole
    /// family. The add and sub forms treat opposite-signed infinities as
    /// invalid; every form treats a signaling NaN as invalid.
    fn arith_compute(&mut self, kind: ArithKind, a: Fx80, b: Fx80) -> Fx80 {
        let snan = a.is_signaling_nan() || b.is_signaling_nan();
        let bad = match kind {
            ArithKind::Add | ArithKind::Sub => {
                snan || (a.is_inf() && b.is_inf() && ((a.high ^ b.high) & 0x8000) != 0)
            }
            ArithKind::Mul | ArithKind::Div => snan,
        };
        if bad {
            self.sw |= SW_IE;
            return Fx80::INDEFINITE;
        }
        match kind {
            ArithKind::Add => self.fp_add(a, b),
            ArithKind::Sub => self.fp_sub(a, b),
            ArithKind::Mul => self.fp_mul(a, b),
            ArithKind::Div => self.fp_div(a, b),
        }
    }

    fn read_operand(&mut self, bus: &mut impl Bus, ea: u32, src: MemSrc) -> Result<Fx80, Fault> {
        Ok(match src {
            MemSrc::F32 => from_f32_bits(bus.read_u32(ea)?),
            MemSrc::F64 => from_f64_bits(bus.read_u64(ea)?),
            MemSrc::I16 => from_i32(i32::from(bus.read_u16(ea)? as i16)),
            MemSrc::I32 => from_i32(bus.read_u32(ea)? as i32),
            MemSrc::I16Via32 => from_i32(i32::from(bus.read_u32(ea)? as i16)),
        })
    }

    /// Memory-operand forms; `reverse` swaps the operand order (the `R`
    /// mnemonics). The destination is always ST(0).
    pub(crate) fn arith_mem(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
        kind: ArithKind,
        src: MemSrc,
        reverse: bool,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        let result = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let m = self.read_operand(bus, ea, src)?;
            let st0 = self.st(0);
            let (a, b) = if reverse { (m, st0) } else { (st0, m) };
            self.arith_compute(kind, a, b)
        };

        if self.check_exceptions(host) {
            self.write_stack(0, result, true);
        }
        Ok(())
    }

    /// Register forms. `flip` selects the (ST(i), ST(0)) operand order,
    /// `dest_sti` stores into ST(i) instead of ST(0), and `pop` releases
    /// ST(0) afterwards.
    pub(crate) fn arith_st(
        &mut self,
        host: &mut HostState,
        modrm: u8,
        kind: ArithKind,
        flip: bool,
        dest_sti: bool,
        pop: bool,
    ) -> Result<(), Fault> {
        let i = u16::from(modrm & 7);
        let result = if self.is_st_empty(0) || self.is_st_empty(i) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let (a, b) = if flip {
                (self.st(i), self.st(0))
            } else {
                (self.st(0), self.st(i))
            };
            self.arith_compute(kind, a, b)
        };

        if self.check_exceptions(host) {
            self.write_stack(if dest_sti { i } else { 0 }, result, true);
            if pop {
                self.pop();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CW_ZM, SW_C1, SW_SF, SW_ZE};

    fn fx(v: f64) -> Fx80 {
        from_f64_bits(v.to_bits())
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
    fn fadd_st_sti_updates_st0() {
        let mut fpu = loaded(&[1.5, 2.0]); // ST0=2.0, ST1=1.5
        let mut host = HostState::default();
        fpu.arith_st(&mut host, 0xC1, ArithKind::Add, false, false, false)
            .unwrap();
        assert_eq!(fpu.st(0), fx(3.5));
        assert_eq!(fpu.st(1), fx(1.5));
    }

    #[test]
    fn fsubp_reverse_order_and_pop() {
        let mut fpu = loaded(&[10.0, 4.0]); // ST0=4.0, ST1=10.0
        let mut host = HostState::default();
        // FSUBP ST(1), ST: ST(1) = ST(1) - ST(0), then pop.
        fpu.arith_st(&mut host, 0xE9, ArithKind::Sub, true, true, true)
            .unwrap();
        assert_eq!(fpu.st(0), fx(6.0));
        assert!(fpu.is_st_empty(1));
    }

    #[test]
    fn empty_operand_yields_indefinite() {
        let mut fpu = Fpu::default();
        let mut host = HostState::default();
        fpu.arith_st(&mut host, 0xC1, ArithKind::Add, false, false, false)
            .unwrap();
        assert_eq!(fpu.st(0), Fx80::INDEFINITE);
        assert_eq!(fpu.status_word() & (SW_IE | SW_SF), SW_IE | SW_SF);
        assert_eq!(fpu.status_word() & SW_C1, 0);
    }

    #[test]
    fn divide_by_zero_sets_ze() {
        let mut fpu = loaded(&[0.0, 1.0]); // ST0=1.0, ST1=0.0
        let mut host = HostState::default();
        // FDIV ST, ST(1)
        fpu.arith_st(&mut host, 0xC1, ArithKind::Div, false, false, false)
            .unwrap();
        assert_eq!(fpu.st(0), Fx80::INFINITY);
        assert_eq!(fpu.status_word() & SW_ZE, SW_ZE);
    }

    #[test]
    fn unmasked_divide_by_zero_withholds_the_commit() {
        let mut fpu = loaded(&[0.0, 1.0]);
        fpu.write_cw(fpu.control_word() & !CW_ZM);
        let mut host = HostState { cr0: HostState::CR0_NE, ..HostState::default() };
        fpu.arith_st(&mut host, 0xC1, ArithKind::Div, false, false, false)
            .unwrap();

        assert_eq!(fpu.status_word() & SW_ZE, SW_ZE);
        assert!(fpu.fault_armed);
        assert!(fpu.error_pending());
        // The quotient was not written back.
        assert_eq!(fpu.st(0), fx(1.0));
    }

    #[test]
    fn opposite_infinities_set_ie() {
        let mut fpu = Fpu::default();
        assert!(fpu.push());
        fpu.write_stack(0, Fx80::INFINITY, true);
        assert!(fpu.push());
        fpu.write_stack(0, Fx80::NEG_INF, true);

        let mut host = HostState::default();
        fpu.arith_st(&mut host, 0xC1, ArithKind::Add, false, true, false)
            .unwrap();
        assert_eq!(fpu.st(1), Fx80::INDEFINITE);
        assert_eq!(fpu.status_word() & SW_IE, SW_IE);
    }
}
