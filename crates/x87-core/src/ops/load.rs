//! The load family: real, register, integer and packed-BCD pushes.

use x87_softfloat::{from_f32_bits, from_f64_bits, from_i32, from_i64, Fx80};

use crate::host::HostState;
use crate::mem::Bus;
use crate::state::{Fpu, SW_C1, SW_IE};
use crate::Fault;

#[inline]
fn f32_source_is_denormal(bits: u32) -> bool {
    bits & 0x7F80_0000 == 0 && bits & 0x007F_FFFF != 0
}

#[inline]
fn f64_source_is_denormal(bits: u64) -> bool {
    bits & 0x7FF0_0000_0000_0000 == 0 && bits & 0x000F_FFFF_FFFF_FFFF != 0
}

impl Fpu {
    pub(crate) fn fld_m32(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        let value = if self.push() {
            let bits = bus.read_u32(ea)?;
            let value = from_f32_bits(bits);
            self.sw &= !SW_C1;
            if value.is_signaling_nan() || f32_source_is_denormal(bits) {
                self.sw |= SW_IE;
                Fx80::INDEFINITE
            } else {
                value
            }
        } else {
            Fx80::INDEFINITE
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, true);
        }
        Ok(())
    }

    pub(crate) fn fld_m64(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        let value = if self.push() {
            let bits = bus.read_u64(ea)?;
            let value = from_f64_bits(bits);
            self.sw &= !SW_C1;
            if value.is_signaling_nan() || f64_source_is_denormal(bits) {
                self.sw |= SW_IE;
                Fx80::INDEFINITE
            } else {
                value
            }
        } else {
            Fx80::INDEFINITE
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, true);
        }
        Ok(())
    }

    /// FLD m80: the image is loaded untouched, specials included.
    pub(crate) fn fld_m80(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        let value = if self.push() {
            self.sw &= !SW_C1;
            bus.read_fx80(ea)?
        } else {
            Fx80::INDEFINITE
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, true);
        }
        Ok(())
    }

    /// FLD ST(i): the source slot is read after the push, so it sits one
    /// position further down.
    pub(crate) fn fld_sti(&mut self, host: &mut HostState, modrm: u8) -> Result<(), Fault> {
        let value = if self.push() {
            self.sw &= !SW_C1;
            self.st(u16::from(modrm.wrapping_add(1) & 7))
        } else {
            Fx80::INDEFINITE
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, true);
        }
        Ok(())
    }

    pub(crate) fn fild(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
        width: IntWidth,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        let value = if !self.push() {
            Fx80::INDEFINITE
        } else {
            self.sw &= !SW_C1;
            match width {
                IntWidth::W16 => from_i32(i32::from(bus.read_u16(ea)? as i16)),
                IntWidth::W32 => from_i32(bus.read_u32(ea)? as i32),
                IntWidth::W64 => from_i64(bus.read_u64(ea)? as i64),
            }
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, true);
        }
        Ok(())
    }

    /// FBLD: 18 packed decimal digits, sign in the top nibble.
    pub(crate) fn fbld(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let ea = bus.ea(modrm, false)?;
        let value = if !self.push() {
            Fx80::INDEFINITE
        } else {
            self.sw &= !SW_C1;

            let raw = bus.read_fx80(ea)?;
            let sign = raw.high & 0x8000;

            let mut mag: u64 = 0;
            mag += u64::from((raw.high >> 4) & 0xF) * 10;
            mag += u64::from(raw.high & 0xF);
            let mut i = 60;
            loop {
                mag = mag * 10 + ((raw.low >> i) & 0xF);
                if i == 0 {
                    break;
                }
                i -= 4;
            }

            let mut value = from_i64(mag as i64);
            value.high |= sign;
            value
        };

        if self.check_exceptions(host) {
            self.write_stack(0, value, true);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IntWidth {
    W16,
    W32,
    W64,
}
