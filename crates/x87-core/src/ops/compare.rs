//! Comparisons: the condition-code forms (FCOM/FICOM/FUCOM/FTST), the
//! host-flag forms (FCOMI/FUCOMI), and FXAM classification.

use x87_softfloat::{eq, from_f32_bits, from_f64_bits, from_i32, lt, Fx80};

use crate::host::HostState;
use crate::mem::Bus;
use crate::state::{Fpu, SW_C0, SW_C1, SW_C2, SW_C3, SW_IE};
use crate::Fault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CmpSrc {
    F32,
    F64,
    I16,
    I32,
}

impl Fpu {
    /// Condition-code compare core. `ordered` raises IE for any NaN; the
    /// unordered variants raise it only for signaling NaNs.
    fn compare_cc(&mut self, a: Fx80, b: Fx80, ordered: bool) {
        self.sw &= !(SW_C3 | SW_C2 | SW_C1 | SW_C0);

        if a.is_nan() || b.is_nan() {
            self.sw |= SW_C0 | SW_C2 | SW_C3;
            if ordered || a.is_signaling_nan() || b.is_signaling_nan() {
                self.sw |= SW_IE;
            }
            return;
        }

        if eq(a, b, &mut self.env) {
            self.sw |= SW_C3;
        }
        if lt(a, b, &mut self.env) {
            self.sw |= SW_C0;
        }
    }

    /// FCOM/FCOMP m32/m64 and FICOM/FICOMP m16/m32.
    pub(crate) fn fcom_mem(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
        src: CmpSrc,
        pop: bool,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        if self.is_st_empty(0) {
            self.set_stack_underflow();
            self.sw |= SW_C3 | SW_C2 | SW_C0;
        } else {
            let b = match src {
                CmpSrc::F32 => from_f32_bits(bus.read_u32(ea)?),
                CmpSrc::F64 => from_f64_bits(bus.read_u64(ea)?),
                CmpSrc::I16 => from_i32(i32::from(bus.read_u16(ea)? as i16)),
                CmpSrc::I32 => from_i32(bus.read_u32(ea)? as i32),
            };
            let a = self.st(0);
            // The memory forms only examine ST(0) for NaN when the operand
            // is an integer (an integer can't be one).
            let nan_src = match src {
                CmpSrc::F32 | CmpSrc::F64 => a.is_nan() || b.is_nan(),
                CmpSrc::I16 | CmpSrc::I32 => a.is_nan(),
            };
            self.sw &= !(SW_C3 | SW_C2 | SW_C1 | SW_C0);
            if nan_src {
                self.sw |= SW_C0 | SW_C2 | SW_C3 | SW_IE;
            } else {
                if eq(a, b, &mut self.env) {
                    self.sw |= SW_C3;
                }
                if lt(a, b, &mut self.env) {
                    self.sw |= SW_C0;
                }
            }
        }

        if self.check_exceptions(host) && pop {
            self.pop();
        }
        Ok(())
    }

    /// FCOM/FCOMP/FUCOM/FUCOMP against ST(i), and the double-popping
    /// FCOMPP/FUCOMPP (which compare ST(0) with ST(1)).
    pub(crate) fn fcom_st(
        &mut self,
        host: &mut HostState,
        i: u16,
        ordered: bool,
        pops: u8,
    ) -> Result<(), Fault> {
        if self.is_st_empty(0) || self.is_st_empty(i) {
            self.set_stack_underflow();
            self.sw |= SW_C3 | SW_C2 | SW_C0;
        } else {
            let (a, b) = (self.st(0), self.st(i));
            self.compare_cc(a, b, ordered);
        }

        if self.check_exceptions(host) {
            for _ in 0..pops {
                self.pop();
            }
        }
        Ok(())
    }

    /// The flag-setting forms: ZF/PF/CF in the host mirror C3/C2/C0.
    /// `unordered` additionally suppresses IE for quiet NaNs.
    pub(crate) fn fcomi_st(
        &mut self,
        host: &mut HostState,
        modrm: u8,
        unordered: bool,
        pop: bool,
    ) -> Result<(), Fault> {
        let i = u16::from(modrm & 7);
        if self.is_st_empty(0) || self.is_st_empty(i) {
            self.set_stack_underflow();
            host.zf = true;
            host.pf = true;
            host.cf = true;
        } else {
            self.sw &= !SW_C1;
            let (a, b) = (self.st(0), self.st(i));

            if unordered && (a.is_quiet_nan() || b.is_quiet_nan()) {
                host.zf = true;
                host.pf = true;
                host.cf = true;
            } else if a.is_nan() || b.is_nan() {
                host.zf = true;
                host.pf = true;
                host.cf = true;
                self.sw |= SW_IE;
            } else {
                host.zf = eq(a, b, &mut self.env);
                host.pf = false;
                host.cf = lt(a, b, &mut self.env);
            }
        }

        if self.check_exceptions(host) && pop {
            self.pop();
        }
        Ok(())
    }

    /// FTST: ST(0) against +0.
    pub(crate) fn ftst(&mut self, host: &mut HostState) -> Result<(), Fault> {
        if self.is_st_empty(0) {
            self.set_stack_underflow();
            self.sw |= SW_C3 | SW_C2 | SW_C0;
        } else {
            self.sw &= !(SW_C3 | SW_C2 | SW_C1 | SW_C0);
            let a = self.st(0);
            if a.is_nan() {
                self.sw |= SW_C0 | SW_C2 | SW_C3 | SW_IE;
            } else {
                if eq(a, Fx80::ZERO, &mut self.env) {
                    self.sw |= SW_C3;
                }
                if lt(a, Fx80::ZERO, &mut self.env) {
                    self.sw |= SW_C0;
                }
            }
        }

        self.check_exceptions(host);
        Ok(())
    }

    /// FXAM: classify ST(0) into C3/C2/C0 with the sign in C1. The zero and
    /// NaN chains are not mutually exclusive; an empty slot with stale
    /// finite bits reports C2 on top of the empty encoding.
    pub(crate) fn fxam(&mut self) -> Result<(), Fault> {
        let value = self.st(0);

        self.sw &= !(SW_C3 | SW_C2 | SW_C1 | SW_C0);

        if self.is_st_empty(0) {
            self.sw |= SW_C3 | SW_C0;
        } else if value.is_zero() {
            self.sw |= SW_C3;
        }
        if value.is_nan() {
            self.sw |= SW_C0;
        } else if value.is_inf() {
            self.sw |= SW_C2 | SW_C0;
        } else {
            self.sw |= SW_C2;
        }

        if value.high & 0x8000 != 0 {
            self.sw |= SW_C1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SW_SF;
    use x87_softfloat::from_f64_bits as f64fx;

    fn fx(v: f64) -> Fx80 {
        f64fx(v.to_bits())
    }

    fn loaded(values: &[Fx80]) -> Fpu {
        let mut fpu = Fpu::default();
        for &v in values {
            assert!(fpu.push());
            fpu.write_stack(0, v, true);
        }
        fpu
    }

    fn cc(fpu: &Fpu) -> (bool, bool, bool) {
        let sw = fpu.status_word();
        (sw & SW_C0 != 0, sw & SW_C2 != 0, sw & SW_C3 != 0)
    }

    #[test]
    fn fcom_orders_st0_against_sti() {
        let mut host = HostState::default();

        let mut fpu = loaded(&[fx(2.0), fx(1.0)]); // ST0=1.0, ST1=2.0
        fpu.fcom_st(&mut host, 1, true, 0).unwrap();
        assert_eq!(cc(&fpu), (true, false, false)); // less

        let mut fpu = loaded(&[fx(1.0), fx(2.0)]);
        fpu.fcom_st(&mut host, 1, true, 0).unwrap();
        assert_eq!(cc(&fpu), (false, false, false)); // greater

        let mut fpu = loaded(&[fx(3.0), fx(3.0)]);
        fpu.fcom_st(&mut host, 1, true, 0).unwrap();
        assert_eq!(cc(&fpu), (false, false, true)); // equal
    }

    #[test]
    fn fucom_signals_only_for_snan() {
        let mut host = HostState::default();
        let qnan = Fx80::new(0x7FFF, 0xC000_0000_0000_0001);
        let snan = Fx80::new(0x7FFF, 0x8000_0000_0000_0001);

        let mut fpu = loaded(&[fx(1.0), qnan]);
        fpu.fcom_st(&mut host, 1, false, 0).unwrap();
        assert_eq!(cc(&fpu), (true, true, true));
        assert_eq!(fpu.status_word() & SW_IE, 0);

        let mut fpu = loaded(&[fx(1.0), snan]);
        fpu.fcom_st(&mut host, 1, false, 0).unwrap();
        assert_eq!(cc(&fpu), (true, true, true));
        assert_eq!(fpu.status_word() & SW_IE, SW_IE);

        // The ordered form flags quiet NaNs too.
        let mut fpu = loaded(&[fx(1.0), qnan]);
        fpu.fcom_st(&mut host, 1, true, 0).unwrap();
        assert_eq!(fpu.status_word() & SW_IE, SW_IE);
    }

    #[test]
    fn fcompp_pops_twice() {
        let mut host = HostState::default();
        let mut fpu = loaded(&[fx(1.0), fx(1.0)]);
        fpu.fcom_st(&mut host, 1, true, 2).unwrap();
        assert!(fpu.is_st_empty(0));
        assert_eq!(fpu.tag_word(), 0xFFFF);
    }

    #[test]
    fn fcomi_drives_host_flags() {
        let mut host = HostState::default();
        let mut fpu = loaded(&[fx(2.0), fx(1.0)]);
        fpu.fcomi_st(&mut host, 0xF1, false, false).unwrap();
        assert!(host.cf && !host.zf && !host.pf);

        let mut fpu = loaded(&[fx(1.0), fx(1.0)]);
        fpu.fcomi_st(&mut host, 0xF1, false, false).unwrap();
        assert!(host.zf && !host.cf && !host.pf);
    }

    #[test]
    fn fcomi_on_empty_sets_unordered_flags() {
        let mut host = HostState::default();
        let mut fpu = Fpu::default();
        fpu.fcomi_st(&mut host, 0xF1, false, false).unwrap();
        assert!(host.zf && host.pf && host.cf);
        assert_eq!(fpu.status_word() & (SW_IE | SW_SF), SW_IE | SW_SF);
    }

    #[test]
    fn ftst_against_zero() {
        let mut host = HostState::default();
        let mut fpu = loaded(&[fx(-3.0)]);
        fpu.ftst(&mut host).unwrap();
        assert_eq!(cc(&fpu), (true, false, false));

        let mut fpu = loaded(&[Fx80::NEG_ZERO]);
        fpu.ftst(&mut host).unwrap();
        assert_eq!(cc(&fpu), (false, false, true));
    }

    #[test]
    fn fxam_classifies() {
        let mut fpu = loaded(&[fx(-1.0)]);
        fpu.fxam().unwrap();
        assert_eq!(cc(&fpu), (false, true, false));
        assert_eq!(fpu.status_word() & SW_C1, SW_C1);

        let mut fpu = loaded(&[Fx80::INFINITY]);
        fpu.fxam().unwrap();
        assert_eq!(cc(&fpu), (true, true, false));

        let mut fpu = loaded(&[Fx80::ZERO]);
        fpu.fxam().unwrap();
        assert_eq!(cc(&fpu), (false, true, true));

        let mut fpu = loaded(&[Fx80::INDEFINITE]);
        fpu.fxam().unwrap();
        assert_eq!(cc(&fpu), (true, false, false));

        let mut fpu = Fpu::default();
        fpu.fxam().unwrap();
        // Empty with stale zero bits: C3|C0 plus the C2 from the stale-value
        // chain.
        assert_eq!(cc(&fpu), (true, true, true));
    }
}
