//! The two flash banks of an nRF52 device.

use alloc::vec::Vec;

use crate::regs;
use crate::sector::{self, Sector};

/// Which of the device's two flash regions a bank covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BankIndex {
    /// Code flash, made up of `FICR.CODESIZE` pages.
    Code = 0,
    /// User information configuration registers: exactly one page.
    Uicr = 1,
}

impl BankIndex {
    /// Map a bank's base address to the region it covers.
    pub fn from_base(base: u32) -> Option<BankIndex> {
        match base {
            regs::FLASH_BASE => Some(BankIndex::Code),
            regs::UICR_BASE => Some(BankIndex::Uicr),
            _ => None,
        }
    }

    pub fn base(self) -> u32 {
        match self {
            BankIndex::Code => regs::FLASH_BASE,
            BankIndex::Uicr => regs::UICR_BASE,
        }
    }
}

/// How writes to a bank are assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Page-granular read-modify-write across any number of pages.
    Bulk,
    /// Read-modify-write of the single UICR page.
    Config,
}

impl From<BankIndex> for WriteStrategy {
    fn from(index: BankIndex) -> WriteStrategy {
        match index {
            BankIndex::Code => WriteStrategy::Bulk,
            BankIndex::Uicr => WriteStrategy::Config,
        }
    }
}

/// Geometry and cached sector state of one bank.
#[derive(Clone, Debug)]
pub struct Bank {
    pub(crate) index: BankIndex,
    pub(crate) base: u32,
    pub(crate) size: u32,
    pub(crate) sectors: Vec<Sector>,
}

impl Bank {
    /// An unprobed bank, with no sectors.
    pub fn new(index: BankIndex) -> Bank {
        Bank {
            index,
            base: index.base(),
            size: 0,
            sectors: Vec::new(),
        }
    }

    /// Rebuild the sector table from a freshly read geometry, forgetting
    /// everything cached about the previous one.
    pub fn rebuild(&mut self, page_size: u32, page_count: u32) {
        let num_pages = match self.index {
            BankIndex::Code => page_count,
            BankIndex::Uicr => 1,
        };

        self.size = num_pages * page_size;
        self.sectors = sector::uniform_sectors(num_pages, page_size).collect();
    }

    pub fn index(&self) -> BankIndex {
        self.index
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }
}
