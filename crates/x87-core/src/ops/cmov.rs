//! FCMOVcc: conditional register moves keyed on the host integer flags.

use x87_softfloat::Fx80;

use crate::host::HostState;
use crate::state::Fpu;
use crate::Fault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cond {
    B,
    E,
    Be,
    U,
    Nb,
    Ne,
    Nbe,
    Nu,
}

impl Cond {
    fn holds(self, host: &HostState) -> bool {
        match self {
            Cond::B => host.cf,
            Cond::E => host.zf,
            Cond::Be => host.cf || host.zf,
            Cond::U => host.pf,
            Cond::Nb => !host.cf,
            Cond::Ne => !host.zf,
            Cond::Nbe => !host.cf && !host.zf,
            Cond::Nu => !host.pf,
        }
    }
}

impl Fpu {
    /// On a false condition nothing at all happens, not even an exception
    /// sweep. The move itself bypasses tag classification.
    pub(crate) fn fcmov(
        &mut self,
        host: &mut HostState,
        modrm: u8,
        cond: Cond,
    ) -> Result<(), Fault> {
        if !cond.holds(host) {
            return Ok(());
        }

        let i = u16::from(modrm & 7);
        let result = if self.is_st_empty(i) {
            self.set_stack_underflow();
            Fx80::INDEFINITE
        } else {
            self.st(i)
        };

        if self.check_exceptions(host) {
            self.write_stack(0, result, false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{SW_IE, SW_SF};
    use x87_softfloat::from_f64_bits;

    fn fx(v: f64) -> Fx80 {
        from_f64_bits(v.to_bits())
    }

    #[test]
    fn move_happens_only_when_condition_holds() {
        let mut fpu = Fpu::default();
        for v in [1.0, 2.0] {
            assert!(fpu.push());
            fpu.write_stack(0, fx(v), true);
        }

        let mut host = HostState::default();
        fpu.fcmov(&mut host, 0xC1, Cond::B).unwrap(); // CF clear: no move
        assert_eq!(fpu.st(0), fx(2.0));

        host.cf = true;
        fpu.fcmov(&mut host, 0xC1, Cond::B).unwrap();
        assert_eq!(fpu.st(0), fx(1.0));
    }

    #[test]
    fn empty_source_underflows() {
        let mut fpu = Fpu::default();
        assert!(fpu.push());
        fpu.write_stack(0, fx(2.0), true);

        let mut host = HostState { zf: true, ..HostState::default() };
        fpu.fcmov(&mut host, 0xC3, Cond::E).unwrap();
        assert_eq!(fpu.st(0), Fx80::INDEFINITE);
        assert_eq!(fpu.status_word() & (SW_IE | SW_SF), SW_IE | SW_SF);
    }
}
