//! nRF52 register map used while programming flash.

use bitflags::bitflags;

/// Base of the code flash region.
pub const FLASH_BASE: u32 = 0x0000_0000;

/// Factory information configuration registers.
pub const FICR_BASE: u32 = 0x1000_0000;
/// Code memory page size, in bytes.
pub const FICR_CODEPAGESIZE: u32 = FICR_BASE | 0x010;
/// Code memory size, in pages.
pub const FICR_CODESIZE: u32 = FICR_BASE | 0x014;

/// Base of the user information configuration registers (a single flash page).
pub const UICR_BASE: u32 = 0x1000_1000;

pub const NVMC_BASE: u32 = 0x4001_E000;
pub const NVMC_READY: u32 = NVMC_BASE | 0x400;
pub const NVMC_CONFIG: u32 = NVMC_BASE | 0x504;
pub const NVMC_ERASEPAGE: u32 = NVMC_BASE | 0x508;
pub const NVMC_ERASEALL: u32 = NVMC_BASE | 0x50C;
pub const NVMC_ERASEUICR: u32 = NVMC_BASE | 0x514;

bitflags! {
    /// `NVMC.CONFIG` access mode bits. Read-only access is the empty set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Config: u32 {
        /// Write enabled.
        const WEN = 0x01;
        /// Erase enabled.
        const EEN = 0x02;
    }
}

bitflags! {
    /// `NVMC.READY` status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ready: u32 {
        const READY = 0x01;
    }
}

/// Value written to `ERASEALL` / `ERASEUICR` to start an erase.
pub const ERASE_START: u32 = 0x01;
