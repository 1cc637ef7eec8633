//! Architectural FPU state: the physical register file, control/status/tag
//! words, stack and tag bookkeeping, and the exception aggregator every
//! handler commits through.

use core::fmt;

use tracing::warn;
use x87_softfloat::{self as sf, Flags, FpEnv, Fx80, Precision, RoundingMode};

use crate::host::{CpuModel, HostState};
use crate::ops::trans::{HostMath, TranscendentalBackend};

pub const SW_IE: u16 = 0x0001;
pub const SW_DE: u16 = 0x0002;
pub const SW_ZE: u16 = 0x0004;
pub const SW_OE: u16 = 0x0008;
pub const SW_UE: u16 = 0x0010;
pub const SW_PE: u16 = 0x0020;
pub const SW_SF: u16 = 0x0040;
pub const SW_ES: u16 = 0x0080;
pub const SW_C0: u16 = 0x0100;
pub const SW_C1: u16 = 0x0200;
pub const SW_C2: u16 = 0x0400;
pub const SW_C3: u16 = 0x4000;
pub const SW_BUSY: u16 = 0x8000;
pub const SW_TOP_SHIFT: u16 = 11;
pub const SW_TOP_MASK: u16 = 7;

pub const CW_IM: u16 = 0x0001;
pub const CW_DM: u16 = 0x0002;
pub const CW_ZM: u16 = 0x0004;
pub const CW_OM: u16 = 0x0008;
pub const CW_UM: u16 = 0x0010;
pub const CW_PM: u16 = 0x0020;
pub const CW_PC_SHIFT: u16 = 8;
pub const CW_PC_MASK: u16 = 3;
pub const CW_RC_SHIFT: u16 = 10;
pub const CW_RC_MASK: u16 = 3;

pub const TAG_VALID: u16 = 0;
pub const TAG_ZERO: u16 = 1;
pub const TAG_SPECIAL: u16 = 2;
pub const TAG_EMPTY: u16 = 3;

/// Maps the RC field onto the kernel rounding modes.
pub fn rc_to_rounding(rc: u16) -> RoundingMode {
    match rc & 3 {
        0 => RoundingMode::NearestEven,
        1 => RoundingMode::Down,
        2 => RoundingMode::Up,
        _ => RoundingMode::TowardZero,
    }
}

/// The x87 coprocessor state. One instance per guest CPU; each instruction
/// executes to completion against it via [`Fpu::execute`].
pub struct Fpu {
    pub(crate) regs: [Fx80; 8],
    pub(crate) cw: u16,
    pub(crate) sw: u16,
    pub(crate) tw: u16,
    // Last instruction/operand pointers and opcode. Reset maintains them;
    // TODO: track them per instruction and emit them in the environment
    // images.
    pub data_ptr: u32,
    pub inst_ptr: u32,
    pub opcode: u16,
    /// Kernel rounding-mode and sticky-flag registers.
    pub(crate) env: FpEnv,
    pub(crate) model: CpuModel,
    /// FERR#-style latch: an unmasked exception was detected.
    error_pending: bool,
    /// #MF armed for delivery at the end of the current instruction.
    pub(crate) fault_armed: bool,
    pub(crate) trans: Box<dyn TranscendentalBackend>,
}

impl fmt::Debug for Fpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fpu")
            .field("top", &self.top())
            .field("cw", &format_args!("{:#06x}", self.cw))
            .field("sw", &format_args!("{:#06x}", self.sw))
            .field("tw", &format_args!("{:#06x}", self.tw))
            .finish()
    }
}

impl Default for Fpu {
    fn default() -> Fpu {
        Fpu::new(CpuModel::default())
    }
}

impl Fpu {
    pub fn new(model: CpuModel) -> Fpu {
        Fpu::with_backend(model, Box::new(HostMath))
    }

    /// Construct with a custom transcendental backend in place of the host
    /// math library.
    pub fn with_backend(model: CpuModel, trans: Box<dyn TranscendentalBackend>) -> Fpu {
        let mut fpu = Fpu {
            regs: [Fx80::ZERO; 8],
            cw: 0,
            sw: 0,
            tw: 0,
            data_ptr: 0,
            inst_ptr: 0,
            opcode: 0,
            env: FpEnv::new(),
            model,
            error_pending: false,
            fault_armed: false,
            trans,
        };
        fpu.reset();
        fpu
    }

    /// FINIT/FNINIT state: default control word, empty stack.
    pub fn reset(&mut self) {
        self.write_cw(0x037F);
        self.sw = 0;
        self.tw = 0xFFFF;
        self.data_ptr = 0;
        self.inst_ptr = 0;
        self.opcode = 0;
        self.env.flags.clear();
        self.error_pending = false;
        self.fault_armed = false;
    }

    pub fn control_word(&self) -> u16 {
        self.cw
    }

    pub fn status_word(&self) -> u16 {
        self.sw
    }

    pub fn tag_word(&self) -> u16 {
        self.tw
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    /// The FERR# latch: set when an unmasked exception was swept, cleared by
    /// reset. The embedding machine may route this to IRQ13 on legacy
    /// systems.
    pub fn error_pending(&self) -> bool {
        self.error_pending
    }

    pub fn top(&self) -> u16 {
        (self.sw >> SW_TOP_SHIFT) & SW_TOP_MASK
    }

    /// Physical slot backing ST(i).
    #[inline]
    pub fn phys(&self, i: u16) -> u16 {
        (self.top() + i) & SW_TOP_MASK
    }

    /// Raw register read; the tag is not consulted.
    #[inline]
    pub fn st(&self, i: u16) -> Fx80 {
        self.regs[self.phys(i) as usize]
    }

    #[inline]
    pub fn tag(&self, phys: u16) -> u16 {
        (self.tw >> (phys << 1)) & 3
    }

    pub(crate) fn set_tag(&mut self, phys: u16, tag: u16) {
        let shift = phys << 1;
        self.tw = (self.tw & !(3 << shift)) | (tag << shift);
    }

    #[inline]
    pub fn is_st_empty(&self, i: u16) -> bool {
        self.tag(self.phys(i)) == TAG_EMPTY
    }

    pub(crate) fn set_stack_top(&mut self, top: u16) {
        self.sw = (self.sw & !(SW_TOP_MASK << SW_TOP_SHIFT)) | (top << SW_TOP_SHIFT);
    }

    /// Store into ST(i), classifying the value into the tag word when asked.
    /// Denormals classify as VALID.
    pub(crate) fn write_stack(&mut self, i: u16, value: Fx80, update_tag: bool) {
        let phys = self.phys(i);
        self.regs[phys as usize] = value;
        if update_tag {
            let tag = if value.is_zero() {
                TAG_ZERO
            } else if value.is_inf() || value.is_nan() {
                TAG_SPECIAL
            } else {
                TAG_VALID
            };
            self.set_tag(phys, tag);
        }
    }

    pub(crate) fn set_stack_underflow(&mut self) {
        self.sw &= !SW_C1;
        self.sw |= SW_IE | SW_SF;
    }

    pub(crate) fn set_stack_overflow(&mut self) {
        self.sw |= SW_C1 | SW_IE | SW_SF;
    }

    /// Rotate TOP down one slot for a push. On overflow the exception bits
    /// are set and, with IM unmasked, the rotation is suppressed.
    pub(crate) fn push(&mut self) -> bool {
        let mut ok = true;
        if self.tag(self.phys(7)) != TAG_EMPTY {
            ok = false;
            self.set_stack_overflow();
            if self.cw & CW_IM == 0 {
                return ok;
            }
        }
        self.set_stack_top(self.phys(7));
        ok
    }

    /// Empty ST(0) and rotate TOP up one slot. On underflow the exception
    /// bits are set and, with IM unmasked, the rotation is suppressed.
    pub(crate) fn pop(&mut self) -> bool {
        let mut ok = true;
        if self.is_st_empty(0) {
            ok = false;
            self.set_stack_underflow();
            if self.cw & CW_IM == 0 {
                return ok;
            }
        }
        self.set_tag(self.phys(0), TAG_EMPTY);
        self.set_stack_top(self.phys(1));
        ok
    }

    /// Write the control word and mirror RC into the kernel rounding mode.
    pub(crate) fn write_cw(&mut self, cw: u16) {
        self.cw = cw;
        self.env.rounding = rc_to_rounding((cw >> CW_RC_SHIFT) & CW_RC_MASK);
    }

    /// Computation precision from the PC field. The reserved encoding 1
    /// behaves as extended.
    pub(crate) fn precision(&self) -> Precision {
        match (self.cw >> CW_PC_SHIFT) & CW_PC_MASK {
            0 => Precision::Single,
            2 => Precision::Double,
            _ => Precision::Extended,
        }
    }

    pub(crate) fn rounding(&self) -> RoundingMode {
        self.env.rounding
    }

    // Precision-gated arithmetic used by the instruction handlers.

    pub(crate) fn fp_add(&mut self, a: Fx80, b: Fx80) -> Fx80 {
        sf::add(a, b, self.precision(), &mut self.env)
    }

    pub(crate) fn fp_sub(&mut self, a: Fx80, b: Fx80) -> Fx80 {
        sf::sub(a, b, self.precision(), &mut self.env)
    }

    pub(crate) fn fp_mul(&mut self, a: Fx80, b: Fx80) -> Fx80 {
        sf::mul(a, b, self.precision(), &mut self.env)
    }

    pub(crate) fn fp_div(&mut self, a: Fx80, b: Fx80) -> Fx80 {
        sf::div(a, b, self.precision(), &mut self.env)
    }

    /// Drain the kernel sticky flags into the status word and recompute the
    /// summary bit. Returns `false` when an unmasked exception is pending on
    /// a model that delivers them; the caller must then withhold its
    /// architectural commits.
    pub(crate) fn sweep_exceptions(&mut self) -> bool {
        let flags = self.env.flags.take();
        if flags.contains(Flags::INVALID) {
            self.sw |= SW_IE;
        }
        if flags.contains(Flags::DIV_BY_ZERO) {
            self.sw |= SW_ZE;
        }
        if flags.contains(Flags::OVERFLOW) {
            self.sw |= SW_OE;
        }
        if flags.contains(Flags::UNDERFLOW) {
            self.sw |= SW_UE;
        }
        if flags.contains(Flags::INEXACT) {
            self.sw |= SW_PE;
        }

        let unmasked = self.sw & !self.cw & 0x3F;
        if unmasked != 0 {
            self.sw |= SW_ES;
        } else {
            self.sw &= !SW_ES;
        }

        if unmasked != 0 && self.model.delivers_math_faults() {
            warn!(
                cw = format_args!("{:#06x}", self.cw),
                sw = format_args!("{:#06x}", self.sw),
                "unmasked x87 exception"
            );
            self.error_pending = true;
            return false;
        }
        true
    }

    /// The per-instruction exception gate: sweep, and arm #MF delivery when
    /// the host runs with CR0.NE set.
    pub(crate) fn check_exceptions(&mut self, host: &mut HostState) -> bool {
        if self.sweep_exceptions() {
            return true;
        }
        if host.numeric_error() {
            self.fault_armed = true;
        }
        false
    }
}
