//! Architecture-specific pieces of the asynchronous flash loader.
//!
//! The loader streams data to flash by running a tiny "drain program" on the
//! target CPU. The program itself is opaque machine code, but every
//! implementation must honor the same ring buffer protocol:
//!
//! - The control block starts at the address passed in the second parameter
//!   register. Word 0 holds the write pointer, word 1 the read pointer, and the
//!   payload spans from `start + 8` up to the end address passed in the third
//!   parameter register. Both pointers are absolute target addresses.
//! - While the write pointer equals the read pointer, the buffer is empty and
//!   the program spins. A write pointer of `0` asks the program to stop.
//! - Otherwise, one 32-bit word is copied from the read pointer to the
//!   destination address (fourth parameter register), the destination
//!   advances by 4, the read pointer advances by 4 (wrapping back to
//!   `start + 8` at the end address) and is published, and the byte count
//!   (first parameter register) is decremented by 4.
//! - Once the byte count reaches zero, the program halts on a breakpoint.

pub mod arm;

/// Encodes the drain program and calling convention for a target architecture.
pub trait LoaderArch {
    /// Position independent machine code for the resident drain program.
    const DRAIN_PROGRAM: &'static [u8];

    /// Raw register numbers used to seed the drain program, in order: byte
    /// count, ring buffer start, ring buffer end, destination address.
    const PARAM_REGS: [u8; 4];

    /// Map the address the drain program was loaded at to the address
    /// execution should resume from.
    fn entry_point(load_addr: u32) -> u32 {
        load_addr
    }
}
