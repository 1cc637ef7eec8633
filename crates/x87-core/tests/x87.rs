//! End-to-end instruction-stream scenarios driven through the escape
//! dispatcher, the way the embedding CPU would.

use x87_core::{
    Bus, Fault, FlatTestBus, Fpu, HostState, CW_RC_SHIFT, SW_C0, SW_C1, SW_C2, SW_C3, SW_IE,
    SW_SF, SW_ZE, TAG_VALID, TAG_ZERO,
};
use x87_softfloat::{from_f64_bits, to_f64_bits, FpEnv, Fx80};

const HLT: u8 = 0xF4;

fn fx(v: f64) -> Fx80 {
    from_f64_bits(v.to_bits())
}

fn back(v: Fx80) -> f64 {
    let mut env = FpEnv::new();
    f64::from_bits(to_f64_bits(v, &mut env))
}

/// Minimal outer dispatcher: x87 escapes go to the FPU, HLT stops.
fn run(fpu: &mut Fpu, bus: &mut FlatTestBus, host: &mut HostState) -> Result<(), Fault> {
    loop {
        let byte = bus.fetch()?;
        match byte {
            0xD8..=0xDF => fpu.execute(byte, bus, host)?,
            HLT => return Ok(()),
            other => panic!("unexpected opcode {other:#04x}"),
        }
    }
}

fn fixture() -> (Fpu, FlatTestBus, HostState) {
    (Fpu::default(), FlatTestBus::new(0x2000), HostState::default())
}

#[test]
fn mem_arithmetic_roundtrip() {
    // fld dword [0x100]; fadd dword [0x104]; fstp dword [0x108]; hlt
    let (mut fpu, mut bus, mut host) = fixture();
    let code = [
        0xD9, 0x05, 0x00, 0x01, 0x00, 0x00,
        0xD8, 0x05, 0x04, 0x01, 0x00, 0x00,
        0xD9, 0x1D, 0x08, 0x01, 0x00, 0x00,
        HLT,
    ];
    bus.load(0x1000, &code);
    bus.load(0x100, &1.5f32.to_bits().to_le_bytes());
    bus.load(0x104, &2.25f32.to_bits().to_le_bytes());
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();

    assert_eq!(f32::from_bits(bus.read_u32(0x108).unwrap()), 3.75);
    assert_eq!(fpu.tag_word(), 0xFFFF);
    assert_eq!(fpu.top(), 0);
}

#[test]
fn constant_then_add_into_sti() {
    // S1: fld1; fldz; fadd st(1), st; hlt
    let (mut fpu, mut bus, mut host) = fixture();
    bus.load(0x1000, &[0xD9, 0xE8, 0xD9, 0xEE, 0xDC, 0xC1, HLT]);
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();

    assert_eq!(fpu.st(0), Fx80::ZERO);
    assert_eq!(fpu.st(1), Fx80::ONE);
    assert_eq!(fpu.tag(fpu.phys(0)), TAG_ZERO);
    assert_eq!(fpu.tag(fpu.phys(1)), TAG_VALID);
    assert_eq!(fpu.status_word() & SW_C1, 0);
}

#[test]
fn arithmetic_on_empty_stack_substitutes_indefinite() {
    // S2: fadd st, st(1) with nothing loaded.
    let (mut fpu, mut bus, mut host) = fixture();
    bus.load(0x1000, &[0xD8, 0xC1, HLT]);
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();

    assert_eq!(fpu.st(0), Fx80::INDEFINITE);
    assert_eq!(fpu.status_word() & (SW_IE | SW_SF), SW_IE | SW_SF);
}

#[test]
fn opposite_infinities_are_invalid_through_the_stack() {
    // S3: fld tword [+inf]; fld tword [-inf]; fadd st(1), st; hlt
    let (mut fpu, mut bus, mut host) = fixture();
    let code = [
        0xDB, 0x2D, 0x00, 0x01, 0x00, 0x00,
        0xDB, 0x2D, 0x10, 0x01, 0x00, 0x00,
        0xDC, 0xC1,
        HLT,
    ];
    bus.load(0x1000, &code);
    bus.write_fx80(0x100, Fx80::INFINITY).unwrap();
    bus.write_fx80(0x110, Fx80::NEG_INF).unwrap();
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();

    assert_eq!(fpu.st(1), Fx80::INDEFINITE);
    assert_eq!(fpu.status_word() & SW_IE, SW_IE);
}

#[test]
fn fldpi_depends_on_rounding_control() {
    // S4: fldcw [rc]; fldpi; hlt
    for (rc, low) in [(1u16, 0xC90F_DAA2_2168_C234u64), (0, 0xC90F_DAA2_2168_C235)] {
        let (mut fpu, mut bus, mut host) = fixture();
        bus.load(0x1000, &[0xD9, 0x2D, 0x00, 0x02, 0x00, 0x00, 0xD9, 0xEB, HLT]);
        bus.load(0x200, &(0x037F | (rc << CW_RC_SHIFT)).to_le_bytes());
        bus.pc = 0x1000;

        run(&mut fpu, &mut bus, &mut host).unwrap();
        assert_eq!(fpu.st(0), Fx80::new(0x4000, low), "rc={rc}");
    }
}

#[test]
fn frndint_follows_rounding_control() {
    // S5: fldcw [rc]; fld qword [1.5]; frndint; hlt
    for (rc, want) in [(0u16, 2.0f64), (1, 1.0), (2, 2.0), (3, 1.0)] {
        let (mut fpu, mut bus, mut host) = fixture();
        let code = [
            0xD9, 0x2D, 0x00, 0x02, 0x00, 0x00,
            0xDD, 0x05, 0x08, 0x02, 0x00, 0x00,
            0xD9, 0xFC,
            HLT,
        ];
        bus.load(0x1000, &code);
        bus.load(0x200, &(0x037F | (rc << CW_RC_SHIFT)).to_le_bytes());
        bus.load(0x208, &1.5f64.to_bits().to_le_bytes());
        bus.pc = 0x1000;

        run(&mut fpu, &mut bus, &mut host).unwrap();
        assert_eq!(back(fpu.st(0)), want, "rc={rc}");
    }
}

#[test]
fn fucom_of_signaling_nan_sets_ie() {
    // S6: fld tword [snan]; fld qword [1.0]; fucom st(1); hlt
    let (mut fpu, mut bus, mut host) = fixture();
    let code = [
        0xDB, 0x2D, 0x00, 0x01, 0x00, 0x00,
        0xDD, 0x05, 0x10, 0x01, 0x00, 0x00,
        0xDD, 0xE1,
        HLT,
    ];
    bus.load(0x1000, &code);
    bus.write_fx80(0x100, Fx80::new(0x7FFF, 0x8000_0000_0000_0001)).unwrap();
    bus.load(0x110, &1.0f64.to_bits().to_le_bytes());
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();

    let sw = fpu.status_word();
    assert_eq!(sw & (SW_C3 | SW_C2 | SW_C0), SW_C3 | SW_C2 | SW_C0);
    assert_eq!(sw & SW_IE, SW_IE);
}

#[test]
fn fnstsw_ax_reports_comparison() {
    // fld qword [1.0]; fcom qword [2.0]; fnstsw ax; hlt
    let (mut fpu, mut bus, mut host) = fixture();
    let code = [
        0xDD, 0x05, 0x00, 0x01, 0x00, 0x00,
        0xDC, 0x15, 0x08, 0x01, 0x00, 0x00,
        0xDF, 0xE0,
        HLT,
    ];
    bus.load(0x1000, &code);
    bus.load(0x100, &1.0f64.to_bits().to_le_bytes());
    bus.load(0x108, &2.0f64.to_bits().to_le_bytes());
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();

    assert_eq!(host.ax & (SW_C0 | SW_C2 | SW_C3), SW_C0);
}

#[test]
fn divide_by_zero_reports_ze() {
    // fld1; fdiv dword [+0.0]; hlt
    let (mut fpu, mut bus, mut host) = fixture();
    bus.load(0x1000, &[0xD9, 0xE8, 0xD8, 0x35, 0x00, 0x01, 0x00, 0x00, HLT]);
    bus.load(0x100, &0.0f32.to_bits().to_le_bytes());
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();

    assert_eq!(fpu.st(0), Fx80::INFINITY);
    assert_eq!(fpu.status_word() & SW_ZE, SW_ZE);
}

#[test]
fn unmasked_divide_by_zero_delivers_mf() {
    // fldcw [ZM unmasked]; fld1; fdiv dword [+0.0]
    let (mut fpu, mut bus, mut host) = fixture();
    host.cr0 = HostState::CR0_NE;
    let code = [
        0xD9, 0x2D, 0x00, 0x02, 0x00, 0x00,
        0xD9, 0xE8,
        0xD8, 0x35, 0x00, 0x01, 0x00, 0x00,
        HLT,
    ];
    bus.load(0x1000, &code);
    bus.load(0x200, &0x037Bu16.to_le_bytes());
    bus.load(0x100, &0.0f32.to_bits().to_le_bytes());
    bus.pc = 0x1000;

    let err = run(&mut fpu, &mut bus, &mut host).unwrap_err();
    assert_eq!(err, Fault::MathFault);
    assert_eq!(fpu.status_word() & SW_ZE, SW_ZE);
    assert!(fpu.error_pending());
    // The quotient was never committed.
    assert_eq!(fpu.st(0), Fx80::ONE);
}

#[test]
fn unmasked_invalid_delivers_mf() {
    // fldcw [IM unmasked]; fstp dword [x] on an empty stack, with CR0.NE.
    let (mut fpu, mut bus, mut host) = fixture();
    host.cr0 = HostState::CR0_NE;
    let code = [
        0xD9, 0x2D, 0x00, 0x02, 0x00, 0x00,
        0xD9, 0x1D, 0x08, 0x02, 0x00, 0x00,
        HLT,
    ];
    bus.load(0x1000, &code);
    bus.load(0x200, &0x037Eu16.to_le_bytes());
    bus.pc = 0x1000;

    let err = run(&mut fpu, &mut bus, &mut host).unwrap_err();
    assert_eq!(err, Fault::MathFault);
    assert!(fpu.error_pending());
    // The store was suppressed.
    assert_eq!(bus.read_u32(0x208).unwrap(), 0);
}

#[test]
fn masked_by_default_does_not_fault() {
    let (mut fpu, mut bus, mut host) = fixture();
    host.cr0 = HostState::CR0_NE;
    bus.load(0x1000, &[0xD9, 0x1D, 0x08, 0x02, 0x00, 0x00, HLT]);
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();
    // Indefinite, stored as a quiet f32 NaN.
    assert_eq!(bus.read_u32(0x208).unwrap(), 0xFFC0_0000);
}

#[test]
fn invalid_opcode_is_fatal() {
    let (mut fpu, mut bus, mut host) = fixture();
    bus.load(0x1000, &[0xDF, 0xC0, HLT]);
    bus.pc = 0x1000;

    let err = run(&mut fpu, &mut bus, &mut host).unwrap_err();
    assert_eq!(err, Fault::InvalidOpcode { escape: 0xDF, modrm: 0xC0 });
}

#[test]
fn stack_balance_over_load_store_pairs() {
    // fld, fld, fstp, fstp leaves TOP and TW as they started.
    let (mut fpu, mut bus, mut host) = fixture();
    let code = [
        0xDD, 0x05, 0x00, 0x01, 0x00, 0x00,
        0xDD, 0x05, 0x00, 0x01, 0x00, 0x00,
        0xDD, 0x1D, 0x20, 0x01, 0x00, 0x00,
        0xDD, 0x1D, 0x28, 0x01, 0x00, 0x00,
        HLT,
    ];
    bus.load(0x1000, &code);
    bus.load(0x100, &42.0f64.to_bits().to_le_bytes());
    bus.pc = 0x1000;

    run(&mut fpu, &mut bus, &mut host).unwrap();

    assert_eq!(fpu.top(), 0);
    assert_eq!(fpu.tag_word(), 0xFFFF);
    assert_eq!(fpu.status_word() & 0x3F, 0);
}

#[test]
fn m80_roundtrip_is_bit_exact() {
    // fld tword [x]; fstp tword [y]: arbitrary images survive untouched.
    for image in [
        fx(0.1),
        Fx80::new(0x0001, 0x8000_0000_0000_0000),
        Fx80::new(0x7FFE, 0xFFFF_FFFF_FFFF_FFFF),
        Fx80::INDEFINITE,
    ] {
        let (mut fpu, mut bus, mut host) = fixture();
        let code = [
            0xDB, 0x2D, 0x00, 0x01, 0x00, 0x00,
            0xDB, 0x3D, 0x20, 0x01, 0x00, 0x00,
            HLT,
        ];
        bus.load(0x1000, &code);
        bus.write_fx80(0x100, image).unwrap();
        bus.pc = 0x1000;

        run(&mut fpu, &mut bus, &mut host).unwrap();
        assert_eq!(bus.read_fx80(0x120).unwrap(), image);
        assert_eq!(fpu.tag_word(), 0xFFFF);
    }
}

#[test]
fn cycles_accumulate() {
    let (mut fpu, mut bus, mut host) = fixture();
    bus.load(0x1000, &[0xD9, 0xE8, HLT]); // fld1: 4 cycles
    bus.pc = 0x1000;
    run(&mut fpu, &mut bus, &mut host).unwrap();
    assert_eq!(host.cycles, 4);
}
