//! The host-side hook surface: the handful of operations an embedding
//! process drives directly, without going through instruction decode.
//!
//! This is the trait-object rendition of the exported function-pointer
//! table. The methods operate on the FPU state alone: they latch the error
//! line on unmasked exceptions but never deliver #MF themselves (fault
//! delivery needs the host pipeline, which only the instruction path has).

use x87_softfloat::{from_i32, le, lt, round_to_int, to_i32, Fx80};

use crate::state::{rc_to_rounding, Fpu, SW_C1};

pub trait X87Service {
    fn fldcw(&mut self, cw: u16);
    fn wait(&mut self);
    fn fninit(&mut self);
    fn fstcw(&self) -> u16;
    fn fstsw(&self) -> u16;
    fn frndint(&mut self);
    fn fclex(&mut self);
    /// Compact state image: CW/SW/TW at +0/+2/+4, eight 10-byte registers
    /// from +6. `buf` must hold at least 86 bytes.
    fn fsave(&self, buf: &mut [u8]);
    fn frstor(&mut self, buf: &[u8]);
    /// Pop ST(0) as an i32, rounding per the low two bits of `round`
    /// (the RC encoding); the previous rounding mode is restored.
    fn fistp(&mut self, round: u16) -> u32;
}

impl X87Service for Fpu {
    fn fldcw(&mut self, cw: u16) {
        self.write_cw(cw);
        self.sweep_exceptions();
    }

    fn wait(&mut self) {}

    fn fninit(&mut self) {
        self.reset();
    }

    fn fstcw(&self) -> u16 {
        self.control_word()
    }

    fn fstsw(&self) -> u16 {
        self.status_word()
    }

    fn frndint(&mut self) {
        let value = if self.is_st_empty(0) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            self.sw &= !SW_C1;
            round_to_int(self.st(0), &mut self.env)
        };

        if self.sweep_exceptions() {
            self.write_stack(0, value, true);
        }
    }

    fn fclex(&mut self) {
        self.sw &= !0x80FF;
    }

    fn fsave(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.control_word().to_le_bytes());
        buf[2..4].copy_from_slice(&self.status_word().to_le_bytes());
        buf[4..6].copy_from_slice(&self.tag_word().to_le_bytes());
        for i in 0..8u16 {
            let v = self.st(i);
            let at = 6 + usize::from(i) * 10;
            buf[at..at + 8].copy_from_slice(&v.low.to_le_bytes());
            buf[at + 8..at + 10].copy_from_slice(&v.high.to_le_bytes());
        }
    }

    fn frstor(&mut self, buf: &[u8]) {
        let word = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        self.write_cw(word(0));
        self.sw = word(2);
        self.tw = word(4);
        for i in 0..8u16 {
            let at = 6 + usize::from(i) * 10;
            let low = u64::from_le_bytes(buf[at..at + 8].try_into().expect("10-byte slot"));
            let high = word(at + 8);
            self.write_stack(i, Fx80 { high, low }, false);
        }
    }

    fn fistp(&mut self, round: u16) -> u32 {
        let mut out: u32 = 0x8000_0000;
        if !self.is_st_empty(0) {
            let saved = self.env.rounding;
            self.env.rounding = rc_to_rounding(round & 3);

            let rounded = round_to_int(self.st(0), &mut self.env);
            let lower = from_i32(i32::MIN);
            let upper = from_i32(i32::MAX);
            if !lt(rounded, lower, &mut self.env) && le(rounded, upper, &mut self.env) {
                out = to_i32(rounded, &mut self.env) as u32;
            }
            self.pop();

            self.env.rounding = saved;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x87_softfloat::from_f64_bits;

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
    fn save_restore_roundtrip() {
        let mut fpu = loaded(&[1.5, -2.5, 0.0]);
        fpu.fldcw(0x0C7F);

        let mut image = [0u8; 86];
        fpu.fsave(&mut image);

        let mut other = Fpu::default();
        other.frstor(&image);
        assert_eq!(other.control_word(), 0x0C7F);
        assert_eq!(other.status_word(), fpu.status_word());
        assert_eq!(other.tag_word(), fpu.tag_word());
        for i in 0..8 {
            assert_eq!(other.st(i), fpu.st(i));
        }
    }

    #[test]
    fn fistp_rounding_argument() {
        // 2.5: nearest -> 2, down -> 2, up -> 3, zero -> 2.
        for (rc, want) in [(0u16, 2u32), (1, 2), (2, 3), (3, 2)] {
            let mut fpu = loaded(&[2.5]);
            assert_eq!(fpu.fistp(rc), want, "rc={rc}");
            assert!(fpu.is_st_empty(0));
        }
    }

    #[test]
    fn fistp_restores_rounding_mode() {
        let mut fpu = loaded(&[2.5]);
        let before = fpu.rounding();
        fpu.fistp(3);
        assert_eq!(fpu.rounding(), before);
    }

    #[test]
    fn fistp_of_empty_returns_sentinel() {
        let mut fpu = Fpu::default();
        assert_eq!(fpu.fistp(0), 0x8000_0000);
    }

    #[test]
    fn service_object_is_usable_as_vtable() {
        let mut fpu = Fpu::default();
        let service: &mut dyn X87Service = &mut fpu;
        service.fldcw(0x027F);
        assert_eq!(service.fstcw(), 0x027F);
        service.fninit();
        assert_eq!(service.fstcw(), 0x037F);
    }
}
