#![forbid(unsafe_code)]

//! Instruction-level model of the x87 floating-point coprocessor
//! (8087 through 486-class).
//!
//! The crate executes one escape-group instruction at a time against an
//! explicit [`Fpu`] context: eight 80-bit stack registers with their tag
//! word, control/status words, precision- and rounding-control dispatch,
//! and the full D8-DF decode space. Arithmetic runs on the
//! [`x87_softfloat`] kernel; memory and the effective-address unit are
//! reached through the [`Bus`] trait, and the few host-visible touchpoints
//! (integer flags, AX, CR0, cycle counting) live in [`HostState`].
//!
//! ```
//! use x87_core::{Fpu, FlatTestBus, HostState};
//!
//! let mut fpu = Fpu::default();
//! let mut host = HostState::default();
//! let mut bus = FlatTestBus::new(0x1000);
//!
//! // fld dword ptr [0x100]; fsqrt
//! bus.load(0x100, &9.0f32.to_bits().to_le_bytes());
//! bus.load(0, &[0x05, 0x00, 0x01, 0x00, 0x00, 0xFA]);
//! fpu.execute(0xD9, &mut bus, &mut host).unwrap();
//! fpu.execute(0xD9, &mut bus, &mut host).unwrap();
//! # assert_eq!(fpu.st(0), x87_softfloat::from_i32(3));
//! ```
//!
//! Hosts that drive the FPU outside the decode path (plugin-style) use the
//! [`X87Service`] trait object instead.

mod dispatch;
mod env;
mod exception;
mod hooks;
mod host;
mod mem;
mod ops;
mod state;

pub use exception::Fault;
pub use hooks::X87Service;
pub use host::{CpuModel, HostState, OperandSize};
pub use mem::{Bus, FlatTestBus};
pub use ops::trans::{HostMath, TranscendentalBackend};
pub use state::{
    rc_to_rounding, Fpu, CW_DM, CW_IM, CW_OM, CW_PC_MASK, CW_PC_SHIFT, CW_PM, CW_RC_MASK,
    CW_RC_SHIFT, CW_UM, CW_ZM, SW_BUSY, SW_C0, SW_C1, SW_C2, SW_C3, SW_DE, SW_ES, SW_IE, SW_OE,
    SW_PE, SW_SF, SW_TOP_MASK, SW_TOP_SHIFT, SW_UE, SW_ZE, TAG_EMPTY, TAG_SPECIAL, TAG_VALID,
    TAG_ZERO,
};
