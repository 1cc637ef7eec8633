//! Control instructions: stack rotation, exchange, tag release, control and
//! status word traffic, reset.

use x87_softfloat::Fx80;

use crate::host::HostState;
use crate::mem::Bus;
use crate::state::{Fpu, SW_C1, TAG_EMPTY, TAG_SPECIAL};
use crate::Fault;

impl Fpu {
    pub(crate) fn fnop(&mut self) -> Result<(), Fault> {
        Ok(())
    }

    /// FDECSTP / FINCSTP: clear C1 and rotate TOP. No fault, no tag
    /// traffic.
    pub(crate) fn fdecstp(&mut self) -> Result<(), Fault> {
        self.sw &= !SW_C1;
        let top = self.phys(7);
        self.set_stack_top(top);
        Ok(())
    }

    pub(crate) fn fincstp(&mut self) -> Result<(), Fault> {
        self.sw &= !SW_C1;
        let top = self.phys(1);
        self.set_stack_top(top);
        Ok(())
    }

    /// FNCLEX: clear the exception bits, stack fault, summary and busy;
    /// condition codes and TOP survive.
    pub(crate) fn fnclex(&mut self) -> Result<(), Fault> {
        self.sw &= !0x80FF;
        Ok(())
    }

    /// FFREE: release the tag, leaving the register bits behind.
    pub(crate) fn ffree(&mut self, modrm: u8) -> Result<(), Fault> {
        let phys = self.phys(u16::from(modrm & 7));
        self.set_tag(phys, TAG_EMPTY);
        Ok(())
    }

    pub(crate) fn finit(&mut self) -> Result<(), Fault> {
        self.reset();
        Ok(())
    }

    pub(crate) fn fldcw_mem(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        let cw = bus.read_u16(ea)?;
        self.write_cw(cw);
        self.check_exceptions(host);
        Ok(())
    }

    pub(crate) fn fstcw_mem(&mut self, bus: &mut impl Bus, modrm: u8) -> Result<(), Fault> {
        let ea = bus.ea(modrm, true)?;
        bus.write_u16(ea, self.cw)
    }

    pub(crate) fn fstsw_mem(&mut self, bus: &mut impl Bus, modrm: u8) -> Result<(), Fault> {
        let ea = bus.ea(modrm, true)?;
        bus.write_u16(ea, self.sw)
    }

    pub(crate) fn fstsw_ax(&mut self, host: &mut HostState) -> Result<(), Fault> {
        host.ax = self.sw;
        Ok(())
    }

    /// FXCH ST(i): swap values and tags. Empty operands are filled with the
    /// indefinite and flagged as underflow before the (gated) swap.
    pub(crate) fn fxch_sti(&mut self, host: &mut HostState, modrm: u8) -> Result<(), Fault> {
        let i = u16::from(modrm & 7);

        if self.is_st_empty(0) {
            self.write_stack(0, Fx80::INDEFINITE, false);
            let phys = self.phys(0);
            self.set_tag(phys, TAG_SPECIAL);
            self.set_stack_underflow();
        }
        if self.is_st_empty(i) {
            self.write_stack(i, Fx80::INDEFINITE, false);
            let phys = self.phys(i);
            self.set_tag(phys, TAG_SPECIAL);
            self.set_stack_underflow();
        }

        if self.check_exceptions(host) {
            let (p0, pi) = (self.phys(0), self.phys(i));
            self.regs.swap(p0 as usize, pi as usize);
            let t0 = self.tag(p0);
            let ti = self.tag(pi);
            self.set_tag(p0, ti);
            self.set_tag(pi, t0);
        }
        Ok(())
    }
}
