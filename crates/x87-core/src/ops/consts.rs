//! Constant loads. The transcendental constants carry two ULP-adjacent
//! significands; which one lands depends on the rounding-control field.

use x87_softfloat::{Fx80, RoundingMode};

use crate::host::HostState;
use crate::state::{Fpu, SW_C1, TAG_SPECIAL, TAG_VALID, TAG_ZERO};
use crate::Fault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ConstKind {
    One,
    L2t,
    L2e,
    Pi,
    Lg2,
    Ln2,
    Zero,
}

impl ConstKind {
    fn value(self, rc: RoundingMode) -> (Fx80, u16) {
        use RoundingMode::*;
        match self {
            ConstKind::One => (Fx80::ONE, TAG_VALID),
            ConstKind::Zero => (Fx80::ZERO, TAG_ZERO),
            // log2(10): the up variant is only taken for round-up.
            ConstKind::L2t => {
                let low = if rc == Up { 0xD49A_784B_CD1B_8AFF } else { 0xD49A_784B_CD1B_8AFE };
                (Fx80::new(0x4000, low), TAG_VALID)
            }
            // log2(e).
            ConstKind::L2e => {
                let low = if matches!(rc, Up | NearestEven) {
                    0xB8AA_3B29_5C17_F0BC
                } else {
                    0xB8AA_3B29_5C17_F0BB
                };
                (Fx80::new(0x3FFF, low), TAG_VALID)
            }
            ConstKind::Pi => {
                let low = if matches!(rc, Up | NearestEven) {
                    0xC90F_DAA2_2168_C235
                } else {
                    0xC90F_DAA2_2168_C234
                };
                (Fx80::new(0x4000, low), TAG_VALID)
            }
            // log10(2).
            ConstKind::Lg2 => {
                let low = if matches!(rc, Up | NearestEven) {
                    0x9A20_9A84_FBCF_F799
                } else {
                    0x9A20_9A84_FBCF_F798
                };
                (Fx80::new(0x3FFD, low), TAG_VALID)
            }
            // ln(2).
            ConstKind::Ln2 => {
                let low = if matches!(rc, Up | NearestEven) {
                    0xB172_17F7_D1CF_79AC
                } else {
                    0xB172_17F7_D1CF_79AB
                };
                (Fx80::new(0x3FFE, low), TAG_VALID)
            }
        }
    }
}

impl Fpu {
    pub(crate) fn fld_const(&mut self, host: &mut HostState, kind: ConstKind) -> Result<(), Fault> {
        let (value, tag) = if self.push() {
            self.sw &= !SW_C1;
            kind.value(self.rounding())
        } else {
            (Fx80::INDEFINITE, TAG_SPECIAL)
        };

        if self.check_exceptions(host) {
            let phys = self.phys(0);
            self.set_tag(phys, tag);
            self.write_stack(0, value, false);
        }
        Ok(())
    }
}
