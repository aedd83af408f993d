//! Host-side flash programming for nRF52-series microcontrollers.
//!
//! `nrf52-flash` drives the nRF52's non-volatile memory controller (NVMC)
//! over a register-level debug link (e.g: a SWD probe), exposing the chip's
//! code flash and its single-page UICR as two [`FlashBank`]s which can be
//! probed, erased, and written.
//!
//! Writes are page-granular read-modify-write operations, so arbitrary
//! (word-aligned) byte ranges can be programmed without clobbering their
//! surroundings. When the transport can hand out scratch RAM on the target,
//! data is streamed into flash by a small resident program draining a
//! host-filled ring buffer. Otherwise, flash is written one word at a time.
//!
//! ## Getting Started
//!
//! Implement [`Transport`] for your debug probe, then:
//!
//! ```rust,ignore
//! use nrf52_flash::{regs, Device, FlashBank};
//!
//! let device = Device::builder(my_probe).build()?;
//! let code = FlashBank::new(&device, regs::FLASH_BASE)?;
//!
//! code.write(0x1000, &firmware)?;
//! ```
//!
//! ## Feature flags
//!
//! - `std` (default): `impl std::error::Error` for all error types, and a
//!   default [`Transport::delay`] which actually sleeps.
//! - `sync` (default): every operation blocks. Disable it to get `async fn`s
//!   instead (and implement [`Transport`] with `async fn`s).
//!
//! Without `std`, the crate is `no_std`, but still requires `alloc`.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod arch;
pub mod bank;
pub mod loader;
pub mod nvmc;
pub mod pipeline;
pub mod regs;
pub mod sector;
pub mod transport;

mod device;
mod error;
mod util;

#[cfg(all(test, feature = "sync"))]
mod mock;

pub use device::{Config, Device, DeviceBuilder, DeviceBuilderError, DeviceInfo, FlashBank};
pub use error::{FlashError, InvalidArgument};
pub use transport::{ScratchRegion, Transport};
