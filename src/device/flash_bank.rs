use log::*;
use maybe_async::maybe_async;

use crate::arch::arm::Armv6m;
use crate::arch::LoaderArch;
use crate::bank::{BankIndex, WriteStrategy};
use crate::error::{FlashError, InvalidArgument};
use crate::sector::Sector;
use crate::transport::Transport;

use super::Device;

/// One of the two flash banks of a [`Device`]: code flash, or the UICR.
///
/// Every operation takes exclusive access to the device for its whole
/// duration. Calling back into the device from within a [`Transport`] method
/// panics.
pub struct FlashBank<T, A = Armv6m> {
    device: Device<T, A>,
    index: BankIndex,
}

#[maybe_async(AFIT)]
impl<T: Transport, A: LoaderArch> FlashBank<T, A> {
    /// Register the bank starting at `base`, which must be either
    /// [`FLASH_BASE`](crate::regs::FLASH_BASE) or
    /// [`UICR_BASE`](crate::regs::UICR_BASE).
    ///
    /// (Re)registering a bank forgets whether it was probed.
    pub fn new(device: &Device<T, A>, base: u32) -> Result<FlashBank<T, A>, InvalidArgument> {
        let index = match BankIndex::from_base(base) {
            Some(index) => index,
            None => {
                error!("Invalid bank address {:#010x}", base);
                return Err(InvalidArgument::UnknownBank(base));
            }
        };

        device.state.borrow_mut().register(index);

        Ok(FlashBank {
            device: device.clone(),
            index,
        })
    }

    pub fn device(&self) -> &Device<T, A> {
        &self.device
    }

    pub fn index(&self) -> BankIndex {
        self.index
    }

    pub fn base(&self) -> u32 {
        self.index.base()
    }

    /// Size of the bank in bytes, as of the most recent probe.
    pub fn size(&self) -> u32 {
        self.device.slot(self.index).bank.size
    }

    pub fn num_sectors(&self) -> usize {
        self.device.slot(self.index).bank.sectors.len()
    }

    /// A snapshot of the `n`-th sector's descriptor.
    pub fn sector(&self, n: usize) -> Option<Sector> {
        self.device.slot(self.index).bank.sectors.get(n).copied()
    }

    pub fn is_probed(&self) -> bool {
        self.device.slot(self.index).probed
    }

    pub fn write_strategy(&self) -> WriteStrategy {
        self.device.slot(self.index).strategy
    }

    /// Read the flash geometry from the FICR, and rebuild the sector table.
    ///
    /// Everything cached about the bank's sectors is discarded.
    pub async fn probe(&self) -> Result<(), FlashError<T::Error>> {
        self.device.state.borrow_mut().probe(self.index).await
    }

    /// Probe the bank, unless it's already been probed.
    pub async fn auto_probe(&self) -> Result<(), FlashError<T::Error>> {
        self.device.state.borrow_mut().auto_probe(self.index).await
    }

    /// Erase sectors `first..=last`, stopping at the first failure.
    pub async fn erase(&self, first: usize, last: usize) -> Result<(), FlashError<T::Error>> {
        self.device
            .state
            .borrow_mut()
            .erase(self.index, first, last)
            .await
    }

    /// Write `data` at the bank-relative `offset`.
    ///
    /// The rest of every page touched is preserved. The UICR is rewritten
    /// as a whole, so writes to it must stay within its single page.
    pub async fn write(&self, offset: u32, data: &[u8]) -> Result<(), FlashError<T::Error>> {
        self.device
            .state
            .borrow_mut()
            .write(self.index, offset, data)
            .await
    }

    /// Read `buf.len()` bytes starting at the bank-relative `offset`.
    pub async fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), FlashError<T::Error>> {
        self.device
            .state
            .borrow_mut()
            .read(self.index, offset, buf)
            .await
    }

    /// Read back every sector, and record which ones are blank.
    pub async fn erase_check(&self) -> Result<(), FlashError<T::Error>> {
        self.device.state.borrow_mut().erase_check(self.index).await
    }

    /// Not supported on nRF52 devices: logs a warning and succeeds.
    pub fn protect(&self, set: bool, first: usize, last: usize) -> Result<(), FlashError<T::Error>> {
        warn!(
            "protect() is not implemented for nRF52 series devices yet (set={}, sectors {}..={})",
            set, first, last
        );
        Ok(())
    }

    /// Not supported on nRF52 devices: logs a warning and succeeds, leaving
    /// every sector's protection state unknown.
    pub fn protect_check(&self) -> Result<(), FlashError<T::Error>> {
        self.device.state.borrow_mut().protect_check(self.index)
    }
}
