//! Implementations for ARM architectures.

use crate::arch::LoaderArch;

/// Implements `LoaderArch` for ARMv6-M (Cortex-M0 and up, Thumb only).
///
/// This is the drain program used for nRF52-series devices. Parameters are
/// passed in `r0`-`r3`.
pub enum Armv6m {}

impl LoaderArch for Armv6m {
    #[rustfmt::skip]
    const DRAIN_PROGRAM: &'static [u8] = &[
        // wait_fifo:
        0x0d, 0x68, // ldr   r5, [r1, #0]
        0x00, 0x2d, // cmp   r5, #0
        0x0b, 0xd0, // beq.n exit
        0x4c, 0x68, // ldr   r4, [r1, #4]
        0xac, 0x42, // cmp   r4, r5
        0xf9, 0xd0, // beq.n wait_fifo
        0x20, 0xcc, // ldmia r4!, {r5}
        0x20, 0xc3, // stmia r3!, {r5}
        0x94, 0x42, // cmp   r4, r2
        0x01, 0xd3, // bcc.n no_wrap
        0x0c, 0x46, // mov   r4, r1
        0x08, 0x34, // adds  r4, #8
        // no_wrap:
        0x4c, 0x60, // str   r4, [r1, #4]
        0x04, 0x38, // subs  r0, #4
        0xf0, 0xd1, // bne.n wait_fifo
        // exit:
        0x00, 0xbe, // bkpt  0x0000
    ];

    const PARAM_REGS: [u8; 4] = [0, 1, 2, 3];
}
