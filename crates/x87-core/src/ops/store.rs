//! The store family: real and register stores, rounded integer stores with
//! saturation sentinels, and packed-BCD.

use x87_softfloat::{
    from_i32, from_i64, le, lt, round_to_int, to_f32_bits, to_f64_bits, to_i32, to_i64, Fx80,
};

use crate::host::HostState;
use crate::mem::Bus;
use crate::state::{Fpu, SW_C1};
use crate::Fault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RealFmt {
    F32,
    F64,
    F80,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IntFmt {
    I16,
    I32,
    I64,
}

impl Fpu {
    /// ST(0) for a store: empty slots flag underflow and produce the
    /// indefinite.
    fn store_source(&mut self) -> Fx80 {
        if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            self.sw &= !SW_C1;
            self.st(0)
        }
    }

    pub(crate) fn fst_mem(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
        fmt: RealFmt,
        pop: bool,
    ) -> Result<(), Fault> {
        // The popping 64/80-bit forms resolve the address after the operand
        // check; the others resolve it first.
        let ea_late = pop && matches!(fmt, RealFmt::F64 | RealFmt::F80);

        let (ea, value);
        if ea_late {
            value = self.store_source();
            ea = bus.ea(modrm, true)?;
        } else {
            ea = bus.ea(modrm, true)?;
            value = self.store_source();
        }

        if self.check_exceptions(host) {
            match fmt {
                RealFmt::F32 => {
                    let bits = to_f32_bits(value, &mut self.env);
                    bus.write_u32(ea, bits)?;
                }
                RealFmt::F64 => {
                    let bits = to_f64_bits(value, &mut self.env);
                    bus.write_u64(ea, bits)?;
                }
                RealFmt::F80 => bus.write_fx80(ea, value)?,
            }
            if pop {
                self.pop();
            }
        }
        Ok(())
    }

    pub(crate) fn fst_sti(&mut self, host: &mut HostState, modrm: u8, pop: bool) -> Result<(), Fault> {
        let value = self.store_source();
        if self.check_exceptions(host) {
            self.write_stack(u16::from(modrm & 7), value, true);
            if pop {
                self.pop();
            }
        }
        Ok(())
    }

    /// FIST/FISTP: round to integer in the current mode, then range-check
    /// against the destination width; out-of-range (NaN included) stores the
    /// signed-minimum sentinel.
    pub(crate) fn fist_mem(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
        fmt: IntFmt,
        pop: bool,
    ) -> Result<(), Fault> {
        let value: i64 = if self.is_st_empty(0) {
            self.set_stack_underflow();
            sentinel(fmt)
        } else {
            let rounded = round_to_int(self.st(0), &mut self.env);
            let (lower, upper) = match fmt {
                IntFmt::I16 => (from_i32(-32768), from_i32(32767)),
                IntFmt::I32 => (from_i32(i32::MIN), from_i32(i32::MAX)),
                IntFmt::I64 => (from_i64(i64::MIN), from_i64(i64::MAX)),
            };
            self.sw &= !SW_C1;
            if !lt(rounded, lower, &mut self.env) && le(rounded, upper, &mut self.env) {
                match fmt {
                    IntFmt::I16 | IntFmt::I32 => i64::from(to_i32(rounded, &mut self.env)),
                    IntFmt::I64 => to_i64(rounded, &mut self.env),
                }
            } else {
                sentinel(fmt)
            }
        };

        let ea = bus.ea(modrm, true)?;
        if self.check_exceptions(host) {
            match fmt {
                IntFmt::I16 => bus.write_u16(ea, value as u16)?,
                IntFmt::I32 => bus.write_u32(ea, value as u32)?,
                IntFmt::I64 => bus.write_u64(ea, value as u64)?,
            }
            if pop {
                self.pop();
            }
        }
        Ok(())
    }

    /// FBSTP: magnitude as up to 18 packed decimal digits, sign nibble from
    /// ST(0).
    pub(crate) fn fbstp(
        &mut self,
        bus: &mut impl Bus,
        host: &mut HostState,
        modrm: u8,
    ) -> Result<(), Fault> {
        let result = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            let mut mag = to_i64(self.st(0).abs(), &mut self.env) as u64;
            let mut low: u64 = 0;
            for i in (0..64).step_by(4) {
                low += (mag % 10) << i;
                mag /= 10;
            }
            let mut high = (mag % 10) as u16;
            high += (((mag / 10) % 10) as u16) << 4;
            high |= self.st(0).high & 0x8000;
            Fx80 { high, low }
        };

        let ea = bus.ea(modrm, true)?;
        if self.check_exceptions(host) {
            bus.write_fx80(ea, result)?;
            self.pop();
        }
        Ok(())
    }
}

fn sentinel(fmt: IntFmt) -> i64 {
    match fmt {
        IntFmt::I16 => i64::from(i16::MIN),
        IntFmt::I32 => i64::from(i32::MIN),
        IntFmt::I64 => i64::MIN,
    }
}
