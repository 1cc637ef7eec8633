//! FLDENV/FSTENV/FSAVE/FRSTOR: environment and full-state serialization.
//!
//! Four layouts, selected by (CR0.PE, operand size). The 16-bit forms pack
//! the three words at +0/+2/+4 in a 14-byte block; the 32-bit forms spread
//! them over +0/+4/+8 in 28 bytes. The instruction- and data-pointer fields
//! are emitted as zeros; FSAVE/FRSTOR append the eight 10-byte registers in
//! ST(0)..ST(7) order.

use crate::host::{HostState, OperandSize};
use crate::mem::Bus;
use crate::state::Fpu;
use crate::Fault;

/// 16-real / 16-protected / 32-real / 32-protected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Bits16,
    Bits32,
}

impl Layout {
    fn select(host: &HostState) -> Layout {
        // Protected-mode and real-mode differ only in the (zeroed) pointer
        // fields, so the split collapses onto the operand size.
        match host.operand_size {
            OperandSize::Bits16 => Layout::Bits16,
            OperandSize::Bits32 => Layout::Bits32,
        }
    }

    fn word_offsets(self) -> (u32, u32, u32) {
        match self {
            Layout::Bits16 => (0, 2, 4),
            Layout::Bits32 => (0, 4, 8),
        }
    }

    fn env_len(self) -> u32 {
        match self {
            Layout::Bits16 => 14,
            Layout::Bits32 => 28,
        }
    }
}

impl Fpu {
    fn store_env(
        &mut self,
        bus: &mut impl Bus,
        host: &HostState,
        ea: u32,
    ) -> Result<u32, Fault> {
        let layout = Layout::select(host);
        let (cw_off, sw_off, tw_off) = layout.word_offsets();
        bus.write_u16(ea + cw_off, self.cw)?;
        bus.write_u16(ea + sw_off, self.sw)?;
        bus.write_u16(ea + tw_off, self.tw)?;
        // Pointer and opcode fields: structurally present, content zero.
        let mut off = tw_off + 2;
        while off < layout.env_len() {
            bus.write_u16(ea + off, 0)?;
            off += 2;
        }
        Ok(ea + layout.env_len())
    }

    fn load_env(&mut self, bus: &mut impl Bus, host: &HostState, ea: u32) -> Result<u32, Fault> {
        let layout = Layout::select(host);
        let (cw_off, sw_off, tw_off) = layout.word_offsets();
        let cw = bus.read_u16(ea + cw_off)?;
        self.write_cw(cw);
        self.sw = bus.read_u16(ea + sw_off)?;
        self.tw = bus.read_u16(ea + tw_off)?;
        Ok(ea + layout.env_len())
    }

    pub(crate) fn fldenv(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        self.load_env(bus, host, ea)?;
        self.check_exceptions(host);
        Ok(())
    }

    pub(crate) fn fstenv(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, true)?;
        self.store_env(bus, host, ea)?;
        Ok(())
    }

    pub(crate) fn fsave_mem(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, true)?;
        let mut reg_ea = self.store_env(bus, host, ea)?;
        for i in 0..8 {
            bus.write_fx80(reg_ea, self.st(i))?;
            reg_ea += 10;
        }
        Ok(())
    }

    /// FRSTOR: registers come back without reclassification; the restored
    /// tag word is trusted as-is.
    pub(crate) fn frstor_mem(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        let mut reg_ea = self.load_env(bus, host, ea)?;
        for i in 0..8 {
            let value = bus.read_fx80(reg_ea)?;
            self.write_stack(i, value, false);
            reg_ea += 10;
        }
        Ok(())
    }
}
