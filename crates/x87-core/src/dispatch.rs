//! Escape-group decode: eight 256-entry tables, one per escape byte D8-DF,
//! indexed by the full modrm byte.
//!
//! A modrm below 0xC0 selects a memory form through bits 5:3; 0xC0 and up
//! selects register forms, usually in runs of eight with bits 2:0 carrying
//! the ST index. Entries absent from the manual decode to [`Op::Invalid`].
//! The tables are plain const data consumed by one match per instruction.

use tracing::error;

use crate::host::HostState;
use crate::mem::Bus;
use crate::ops::arith::{ArithKind, MemSrc};
use crate::ops::cmov::Cond;
use crate::ops::compare::CmpSrc;
use crate::ops::consts::ConstKind;
use crate::ops::load::IntWidth;
use crate::ops::store::{IntFmt, RealFmt};
use crate::state::Fpu;
use crate::Fault;

/// Decoded x87 operation. One value per distinct handler; operand details
/// that the handler derives from the modrm byte itself (the ST index) stay
/// out of the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Invalid,
    ArithMem { kind: ArithKind, src: MemSrc, reverse: bool },
    ArithSt { kind: ArithKind, flip: bool, dest_sti: bool, pop: bool },
    ComMem { src: CmpSrc, pop: bool },
    ComSt { ordered: bool, pop: bool },
    ComPP { ordered: bool },
    ComI { unordered: bool, pop: bool },
    Cmov(Cond),
    LdM32,
    LdM64,
    LdM80,
    LdSt,
    Fild(IntWidth),
    Fbld,
    StM(RealFmt, bool),
    StSt { pop: bool },
    Fist(IntFmt, bool),
    Fbstp,
    LdConst(ConstKind),
    Ftst,
    Fxam,
    Fchs,
    Fabs,
    Fsqrt,
    Fscale,
    Frndint,
    Fxtract,
    Fprem,
    Fprem1,
    F2xm1,
    Fyl2x,
    Fyl2xp1,
    Fptan,
    Fpatan,
    Fsin,
    Fcos,
    Fsincos,
    FxchSt,
    Ffree,
    Fnop,
    Fdecstp,
    Fincstp,
    Fclex,
    Finit,
    Fldcw,
    Fstcw,
    Fldenv,
    Fstenv,
    Fsave,
    Frstor,
    FstswM16,
    FstswAx,
}

use ArithKind::{Add, Div, Mul, Sub};

const fn arith_mem(kind: ArithKind, src: MemSrc, reverse: bool) -> Op {
    Op::ArithMem { kind, src, reverse }
}

const fn arith_st(kind: ArithKind, flip: bool, dest_sti: bool, pop: bool) -> Op {
    Op::ArithSt { kind, flip, dest_sti, pop }
}

const fn table_d8() -> [Op; 256] {
    let mut t = [Op::Invalid; 256];
    let mut m = 0;
    while m < 0x100 {
        t[m] = if m < 0xC0 {
            match (m >> 3) & 7 {
                0 => arith_mem(Add, MemSrc::F32, false),
                1 => arith_mem(Mul, MemSrc::F32, false),
                2 => Op::ComMem { src: CmpSrc::F32, pop: false },
                3 => Op::ComMem { src: CmpSrc::F32, pop: true },
                4 => arith_mem(Sub, MemSrc::F32, false),
                5 => arith_mem(Sub, MemSrc::F32, true),
                6 => arith_mem(Div, MemSrc::F32, false),
                _ => arith_mem(Div, MemSrc::F32, true),
            }
        } else {
            match (m >> 3) & 7 {
                0 => arith_st(Add, false, false, false),
                1 => arith_st(Mul, false, false, false),
                2 => Op::ComSt { ordered: true, pop: false },
                3 => Op::ComSt { ordered: true, pop: true },
                4 => arith_st(Sub, false, false, false),
                5 => arith_st(Sub, true, false, false),
                6 => arith_st(Div, false, false, false),
                _ => arith_st(Div, true, false, false),
            }
        };
        m += 1;
    }
    t
}

const fn table_d9() -> [Op; 256] {
    let mut t = [Op::Invalid; 256];
    let mut m = 0;
    while m < 0xC0 {
        t[m] = match (m >> 3) & 7 {
            0 => Op::LdM32,
            2 => Op::StM(RealFmt::F32, false),
            3 => Op::StM(RealFmt::F32, true),
            4 => Op::Fldenv,
            5 => Op::Fldcw,
            6 => Op::Fstenv,
            7 => Op::Fstcw,
            _ => Op::Invalid,
        };
        m += 1;
    }
    while m < 0xD0 {
        t[m] = if m < 0xC8 { Op::LdSt } else { Op::FxchSt };
        m += 1;
    }
    t[0xD0] = Op::Fnop;
    t[0xE0] = Op::Fchs;
    t[0xE1] = Op::Fabs;
    t[0xE4] = Op::Ftst;
    t[0xE5] = Op::Fxam;
    t[0xE8] = Op::LdConst(ConstKind::One);
    t[0xE9] = Op::LdConst(ConstKind::L2t);
    t[0xEA] = Op::LdConst(ConstKind::L2e);
    t[0xEB] = Op::LdConst(ConstKind::Pi);
    t[0xEC] = Op::LdConst(ConstKind::Lg2);
    t[0xED] = Op::LdConst(ConstKind::Ln2);
    t[0xEE] = Op::LdConst(ConstKind::Zero);
    t[0xF0] = Op::F2xm1;
    t[0xF1] = Op::Fyl2x;
    t[0xF2] = Op::Fptan;
    t[0xF3] = Op::Fpatan;
    t[0xF4] = Op::Fxtract;
    t[0xF5] = Op::Fprem1;
    t[0xF6] = Op::Fdecstp;
    t[0xF7] = Op::Fincstp;
    t[0xF8] = Op::Fprem;
    t[0xF9] = Op::Fyl2xp1;
    t[0xFA] = Op::Fsqrt;
    t[0xFB] = Op::Fsincos;
    t[0xFC] = Op::Frndint;
    t[0xFD] = Op::Fscale;
    t[0xFE] = Op::Fsin;
    t[0xFF] = Op::Fcos;
    t
}

const fn table_da() -> [Op; 256] {
    let mut t = [Op::Invalid; 256];
    let mut m = 0;
    while m < 0xC0 {
        t[m] = match (m >> 3) & 7 {
            0 => arith_mem(Add, MemSrc::I32, false),
            1 => arith_mem(Mul, MemSrc::I32, false),
            2 => Op::ComMem { src: CmpSrc::I32, pop: false },
            3 => Op::ComMem { src: CmpSrc::I32, pop: true },
            4 => arith_mem(Sub, MemSrc::I32, false),
            5 => arith_mem(Sub, MemSrc::I32, true),
            6 => arith_mem(Div, MemSrc::I32, false),
            _ => arith_mem(Div, MemSrc::I32, true),
        };
        m += 1;
    }
    while m < 0xE0 {
        t[m] = match (m >> 3) & 7 {
            0 => Op::Cmov(Cond::B),
            1 => Op::Cmov(Cond::E),
            2 => Op::Cmov(Cond::Be),
            _ => Op::Cmov(Cond::U),
        };
        m += 1;
    }
    t[0xE9] = Op::ComPP { ordered: false };
    t
}

const fn table_db() -> [Op; 256] {
    let mut t = [Op::Invalid; 256];
    let mut m = 0;
    while m < 0xC0 {
        t[m] = match (m >> 3) & 7 {
            0 => Op::Fild(IntWidth::W32),
            2 => Op::Fist(IntFmt::I32, false),
            3 => Op::Fist(IntFmt::I32, true),
            5 => Op::LdM80,
            7 => Op::StM(RealFmt::F80, true),
            _ => Op::Invalid,
        };
        m += 1;
    }
    while m < 0xE0 {
        t[m] = match (m >> 3) & 7 {
            0 => Op::Cmov(Cond::Nb),
            1 => Op::Cmov(Cond::Ne),
            2 => Op::Cmov(Cond::Nbe),
            _ => Op::Cmov(Cond::Nu),
        };
        m += 1;
    }
    t[0xE0] = Op::Fnop; // FENI
    t[0xE1] = Op::Fnop; // FDISI
    t[0xE2] = Op::Fclex;
    t[0xE3] = Op::Finit;
    t[0xE4] = Op::Fnop; // FSETPM
    let mut m = 0xE8;
    while m < 0xF0 {
        t[m] = Op::ComI { unordered: true, pop: false };
        m += 1;
    }
    while m < 0xF8 {
        t[m] = Op::ComI { unordered: false, pop: false };
        m += 1;
    }
    t
}

const fn table_dc() -> [Op; 256] {
    let mut t = [Op::Invalid; 256];
    let mut m = 0;
    while m < 0xC0 {
        t[m] = match (m >> 3) & 7 {
            0 => arith_mem(Add, MemSrc::F64, false),
            1 => arith_mem(Mul, MemSrc::F64, false),
            2 => Op::ComMem { src: CmpSrc::F64, pop: false },
            3 => Op::ComMem { src: CmpSrc::F64, pop: true },
            4 => arith_mem(Sub, MemSrc::F64, false),
            5 => arith_mem(Sub, MemSrc::F64, true),
            6 => arith_mem(Div, MemSrc::F64, false),
            _ => arith_mem(Div, MemSrc::F64, true),
        };
        m += 1;
    }
    while m < 0x100 {
        t[m] = match (m >> 3) & 7 {
            0 => arith_st(Add, false, true, false),
            1 => arith_st(Mul, false, true, false),
            4 => arith_st(Sub, false, true, false), // FSUBR ST(i), ST
            5 => arith_st(Sub, true, true, false),  // FSUB ST(i), ST
            6 => arith_st(Div, false, true, false), // FDIVR ST(i), ST
            7 => arith_st(Div, true, true, false),  // FDIV ST(i), ST
            _ => Op::Invalid,
        };
        m += 1;
    }
    t
}

const fn table_dd() -> [Op; 256] {
    let mut t = [Op::Invalid; 256];
    let mut m = 0;
    while m < 0xC0 {
        t[m] = match (m >> 3) & 7 {
            0 => Op::LdM64,
            2 => Op::StM(RealFmt::F64, false),
            3 => Op::StM(RealFmt::F64, true),
            4 => Op::Frstor,
            6 => Op::Fsave,
            7 => Op::FstswM16,
            _ => Op::Invalid,
        };
        m += 1;
    }
    while m < 0x100 {
        t[m] = match (m >> 3) & 7 {
            0 => Op::Ffree,
            1 => Op::FxchSt,
            2 => Op::StSt { pop: false },
            3 => Op::StSt { pop: true },
            4 => Op::ComSt { ordered: false, pop: false },
            5 => Op::ComSt { ordered: false, pop: true },
            _ => Op::Invalid,
        };
        m += 1;
    }
    t
}

const fn table_de() -> [Op; 256] {
    let mut t = [Op::Invalid; 256];
    let mut m = 0;
    while m < 0xC0 {
        t[m] = match (m >> 3) & 7 {
            0 => arith_mem(Add, MemSrc::I16, false),
            1 => arith_mem(Mul, MemSrc::I16, false),
            2 => Op::ComMem { src: CmpSrc::I16, pop: false },
            3 => Op::ComMem { src: CmpSrc::I16, pop: true },
            4 => arith_mem(Sub, MemSrc::I16, false),
            5 => arith_mem(Sub, MemSrc::I16, true),
            6 => arith_mem(Div, MemSrc::I16Via32, false),
            _ => arith_mem(Div, MemSrc::I16Via32, true),
        };
        m += 1;
    }
    while m < 0x100 {
        t[m] = match (m >> 3) & 7 {
            0 => arith_st(Add, false, true, true),  // FADDP
            1 => arith_st(Mul, false, true, true),  // FMULP
            4 => arith_st(Sub, false, true, true),  // FSUBRP
            5 => arith_st(Sub, true, true, true),   // FSUBP
            6 => arith_st(Div, false, true, true),  // FDIVRP
            7 => arith_st(Div, true, true, true),   // FDIVP
            _ => Op::Invalid,
        };
        m += 1;
    }
    t[0xD9] = Op::ComPP { ordered: true }; // FCOMPP
    t
}

const fn table_df() -> [Op; 256] {
    let mut t = [Op::Invalid; 256];
    let mut m = 0;
    while m < 0xC0 {
        t[m] = match (m >> 3) & 7 {
            0 => Op::Fild(IntWidth::W16),
            2 => Op::Fist(IntFmt::I16, false),
            3 => Op::Fist(IntFmt::I16, true),
            4 => Op::Fbld,
            5 => Op::Fild(IntWidth::W64),
            6 => Op::Fbstp,
            7 => Op::Fist(IntFmt::I64, true),
            _ => Op::Invalid,
        };
        m += 1;
    }
    t[0xE0] = Op::FstswAx;
    let mut m = 0xE8;
    while m < 0xF0 {
        t[m] = Op::ComI { unordered: true, pop: true };
        m += 1;
    }
    while m < 0xF8 {
        t[m] = Op::ComI { unordered: false, pop: true };
        m += 1;
    }
    t
}

pub(crate) static TABLES: [[Op; 256]; 8] = [
    table_d8(),
    table_d9(),
    table_da(),
    table_db(),
    table_dc(),
    table_dd(),
    table_de(),
    table_df(),
];

#[inline]
pub(crate) fn lookup(escape: u8, modrm: u8) -> Op {
    TABLES[usize::from(escape - 0xD8)][usize::from(modrm)]
}

/// 486 instruction timings (the load/store group splits on PE for the
/// environment forms).
fn cycles(op: Op, host: &HostState) -> u32 {
    let env_load = if host.protected_mode() { 34 } else { 44 };
    let env_store = if host.protected_mode() { 56 } else { 67 };
    match op {
        Op::Invalid => 0,
        Op::ArithMem { kind, src, .. } => match (kind, src) {
            (Add | Sub, MemSrc::F32 | MemSrc::F64) => 8,
            (Add | Sub, MemSrc::I32) => 19,
            (Add | Sub, _) => 20,
            (Mul, MemSrc::F32) => 11,
            (Mul, MemSrc::F64) => 14,
            (Mul, _) => 22,
            (Div, _) => 73,
        },
        Op::ArithSt { kind, .. } => match kind {
            Add | Sub => 8,
            Mul => 16,
            Div => 73,
        },
        Op::ComMem { src, .. } => match src {
            CmpSrc::F32 | CmpSrc::F64 => 4,
            CmpSrc::I16 => 16,
            CmpSrc::I32 => 15,
        },
        Op::ComSt { .. } => 4,
        Op::ComPP { ordered } => {
            if ordered {
                5
            } else {
                4
            }
        }
        Op::ComI { .. } => 4,
        Op::Cmov(_) => 4,
        Op::LdM32 | Op::LdM64 => 3,
        Op::LdM80 => 6,
        Op::LdSt => 4,
        Op::Fild(IntWidth::W16) => 13,
        Op::Fild(IntWidth::W32) => 9,
        Op::Fild(IntWidth::W64) => 10,
        Op::Fbld => 75,
        Op::StM(RealFmt::F32, _) => 7,
        Op::StM(RealFmt::F64, _) => 8,
        Op::StM(RealFmt::F80, _) => 6,
        Op::StSt { .. } => 3,
        Op::Fist(IntFmt::I32, false) => 28,
        Op::Fist(..) => 29,
        Op::Fbstp => 175,
        Op::LdConst(ConstKind::One | ConstKind::Zero) => 4,
        Op::LdConst(_) => 8,
        Op::Ftst => 4,
        Op::Fxam => 8,
        Op::Fchs | Op::Fabs => 6,
        Op::Fsqrt => 8,
        Op::Fscale => 31,
        Op::Frndint | Op::Fxtract => 21,
        Op::Fprem => 84,
        Op::Fprem1 => 94,
        Op::F2xm1 => 242,
        Op::Fyl2x => 250,
        Op::Fyl2xp1 => 313,
        Op::Fptan => 244,
        Op::Fpatan => 289,
        Op::Fsin | Op::Fcos => 241,
        Op::Fsincos => 291,
        Op::FxchSt => 4,
        Op::Ffree => 3,
        Op::Fnop => 3,
        Op::Fdecstp | Op::Fincstp => 3,
        Op::Fclex => 7,
        Op::Finit => 17,
        Op::Fldcw => 4,
        Op::Fstcw | Op::FstswM16 | Op::FstswAx => 3,
        Op::Fldenv | Op::Frstor => env_load,
        Op::Fstenv | Op::Fsave => env_store,
    }
}

impl Fpu {
    /// Execute one instruction of the escape group `escape` (0xD8..=0xDF):
    /// fetch the modrm byte, decode, run the handler, account cycles, and
    /// deliver any #MF the exception gate armed.
    pub fn execute(
        &mut self,
        escape: u8,
        bus: &mut impl Bus,
        host: &mut HostState,
    ) -> Result<(), Fault> {
        debug_assert!((0xD8..=0xDF).contains(&escape));
        let modrm = bus.fetch()?;
        let op = lookup(escape, modrm);
        self.run(op, escape, modrm, bus, host)?;
        host.tick(cycles(op, host));
        if self.fault_armed {
            self.fault_armed = false;
            return Err(Fault::MathFault);
        }
        Ok(())
    }

    fn run(
        &mut self,
        op: Op,
        escape: u8,
        modrm: u8,
        bus: &mut impl Bus,
        host: &mut HostState,
    ) -> Result<(), Fault> {
        match op {
            Op::Invalid => {
                error!(escape = format_args!("{escape:#04x}"), modrm = format_args!("{modrm:#04x}"), "invalid x87 opcode");
                Err(Fault::InvalidOpcode { escape, modrm })
            }
            Op::ArithMem { kind, src, reverse } => {
                self.arith_mem(bus, host, modrm, kind, src, reverse)
            }
            Op::ArithSt { kind, flip, dest_sti, pop } => {
                self.arith_st(host, modrm, kind, flip, dest_sti, pop)
            }
            Op::ComMem { src, pop } => self.fcom_mem(bus, host, modrm, src, pop),
            Op::ComSt { ordered, pop } => {
                self.fcom_st(host, u16::from(modrm & 7), ordered, u8::from(pop))
            }
            Op::ComPP { ordered } => self.fcom_st(host, 1, ordered, 2),
            Op::ComI { unordered, pop } => self.fcomi_st(host, modrm, unordered, pop),
            Op::Cmov(cond) => self.fcmov(host, modrm, cond),
            Op::LdM32 => self.fld_m32(bus, host, modrm),
            Op::LdM64 => self.fld_m64(bus, host, modrm),
            Op::LdM80 => self.fld_m80(bus, host, modrm),
            Op::LdSt => self.fld_sti(host, modrm),
            Op::Fild(width) => self.fild(bus, host, modrm, width),
            Op::Fbld => self.fbld(bus, host, modrm),
            Op::StM(fmt, pop) => self.fst_mem(bus, host, modrm, fmt, pop),
            Op::StSt { pop } => self.fst_sti(host, modrm, pop),
            Op::Fist(fmt, pop) => self.fist_mem(bus, host, modrm, fmt, pop),
            Op::Fbstp => self.fbstp(bus, host, modrm),
            Op::LdConst(kind) => self.fld_const(host, kind),
            Op::Ftst => self.ftst(host),
            Op::Fxam => self.fxam(),
            Op::Fchs => self.fchs(host),
            Op::Fabs => self.fabs(host),
            Op::Fsqrt => self.fsqrt(host),
            Op::Fscale => self.fscale(host),
            Op::Frndint => self.frndint(host),
            Op::Fxtract => self.fxtract(host),
            Op::Fprem => self.fprem(host),
            Op::Fprem1 => self.fprem1(host),
            Op::F2xm1 => self.f2xm1(host),
            Op::Fyl2x => self.fyl2x(host),
            Op::Fyl2xp1 => self.fyl2xp1(host),
            Op::Fptan => self.fptan(host),
            Op::Fpatan => self.fpatan(host),
            Op::Fsin => self.fsin(host),
            Op::Fcos => self.fcos(host),
            Op::Fsincos => self.fsincos(host),
            Op::FxchSt => self.fxch_sti(host, modrm),
            Op::Ffree => self.ffree(modrm),
            Op::Fnop => self.fnop(),
            Op::Fdecstp => self.fdecstp(),
            Op::Fincstp => self.fincstp(),
            Op::Fclex => self.fnclex(),
            Op::Finit => self.finit(),
            Op::Fldcw => self.fldcw_mem(bus, host, modrm),
            Op::Fstcw => self.fstcw_mem(bus, modrm),
            Op::Fldenv => self.fldenv(bus, host, modrm),
            Op::Fstenv => self.fstenv(bus, host, modrm),
            Op::Fsave => self.fsave_mem(bus, host, modrm),
            Op::Frstor => self.frstor_mem(bus, host, modrm),
            Op::FstswM16 => self.fstsw_mem(bus, modrm),
            Op::FstswAx => self.fstsw_ax(host),
        }
    }
}
