//! The shared device handle, and the bank operations behind it.
//!
//! A [`Device`] owns the transport and everything cached about the chip.
//! [`FlashBank`] handles for the code region and the UICR share that state,
//! since probing or mass-erasing through one bank changes what is known about
//! the other.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Ref, RefCell};
use core::fmt::{self, Display};

use log::*;
use maybe_async::maybe_async;

use crate::arch::arm::Armv6m;
use crate::arch::LoaderArch;
use crate::bank::{Bank, BankIndex, WriteStrategy};
use crate::error::{FlashError, InvalidArgument};
use crate::loader::{FlashLoader, LoaderConfig};
use crate::nvmc::{EraseTrigger, Nvmc, ReadyPoll};
use crate::pipeline::Pipeline;
use crate::regs;
use crate::sector::EraseState;
use crate::transport::Transport;
use crate::util::align::is_aligned;

mod builder;
mod flash_bank;

pub use builder::{DeviceBuilder, DeviceBuilderError};
pub use flash_bank::FlashBank;

/// Settings a [`Device`] was built with. See [`DeviceBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub ready_poll: ReadyPoll,
    pub loader: LoaderConfig,
}

/// Flash geometry as reported by the FICR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Code page size, in bytes.
    pub page_size: u32,
    /// Code memory size, in pages.
    pub page_count: u32,
}

impl DeviceInfo {
    /// Code memory size, in bytes.
    pub fn code_size(&self) -> u64 {
        self.page_size as u64 * self.page_count as u64
    }
}

impl Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--------nRF52 Series Device--------")?;
        writeln!(f)?;
        writeln!(f, "[factory information control block]")?;
        writeln!(f, "code page size: {}B", self.page_size)?;
        write!(f, "code memory size: {}kB", self.code_size() / 1024)
    }
}

struct Slot {
    bank: Bank,
    strategy: WriteStrategy,
    probed: bool,
}

impl Slot {
    fn new(index: BankIndex) -> Slot {
        Slot {
            bank: Bank::new(index),
            strategy: index.into(),
            probed: false,
        }
    }
}

struct DeviceState<T, A> {
    transport: T,
    config: Config,
    loader: FlashLoader<A>,
    page_size: u32,
    code_size: u32,
    slots: [Slot; 2],
}

/// A handle to an nRF52 on the other end of a [`Transport`].
///
/// Cloning the handle is cheap, and every clone refers to the same chip.
pub struct Device<T, A = Armv6m> {
    state: Rc<RefCell<DeviceState<T, A>>>,
}

impl<T, A> Clone for Device<T, A> {
    fn clone(&self) -> Self {
        Device {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Transport> Device<T> {
    /// Start configuring a device reached through `transport`.
    pub fn builder(transport: T) -> DeviceBuilder<T, Armv6m> {
        DeviceBuilder::new(transport)
    }
}

#[maybe_async(AFIT)]
impl<T: Transport, A: LoaderArch> Device<T, A> {
    fn from_parts(transport: T, config: Config) -> Device<T, A> {
        let state = DeviceState {
            transport,
            config,
            loader: FlashLoader::new(config.loader),
            page_size: 0,
            code_size: 0,
            slots: [Slot::new(BankIndex::Code), Slot::new(BankIndex::Uicr)],
        };

        Device {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn config(&self) -> Config {
        self.state.borrow().config
    }

    /// Code page size, as of the most recent probe (0 if never probed).
    pub fn page_size(&self) -> u32 {
        self.state.borrow().page_size
    }

    /// Code region size, as of the most recent probe (0 if never probed).
    pub fn code_size(&self) -> u32 {
        self.state.borrow().code_size
    }

    /// Run `f` with exclusive access to the underlying transport.
    ///
    /// # Panics
    ///
    /// Panics if called from within another operation on the same device.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.state.borrow_mut().transport)
    }

    /// Erase all of code flash and the UICR.
    ///
    /// Both banks are probed as a side effect. The UICR is reported as erased
    /// even if the chip erase itself failed.
    pub async fn mass_erase(&self) -> Result<(), FlashError<T::Error>> {
        self.state.borrow_mut().mass_erase().await
    }

    /// Read the flash geometry straight from the FICR.
    pub async fn info(&self) -> Result<DeviceInfo, FlashError<T::Error>> {
        let mut state = self.state.borrow_mut();
        let page_size = state.read_ficr(regs::FICR_CODEPAGESIZE).await?;
        let page_count = state.read_ficr(regs::FICR_CODESIZE).await?;
        Ok(DeviceInfo {
            page_size,
            page_count,
        })
    }

    fn slot(&self, index: BankIndex) -> Ref<'_, Slot> {
        Ref::map(self.state.borrow(), |s| &s.slots[index as usize])
    }
}

fn check_bounds(size: u32, offset: u32, len: usize) -> Result<(), InvalidArgument> {
    let count = u32::try_from(len).unwrap_or(u32::MAX);
    match offset.checked_add(count) {
        Some(end) if end <= size => Ok(()),
        _ => Err(InvalidArgument::OutOfBounds {
            offset,
            count,
            size,
        }),
    }
}

#[maybe_async(AFIT)]
impl<T: Transport, A: LoaderArch> DeviceState<T, A> {
    fn nvmc(&mut self) -> Nvmc<'_, T> {
        Nvmc::new(&mut self.transport, self.config.ready_poll)
    }

    /// Split the state into a write pipeline, and the bank it should work on.
    fn pipeline(&mut self, index: BankIndex) -> (Pipeline<'_, T, A>, &mut Bank) {
        let nvmc = Nvmc::new(&mut self.transport, self.config.ready_poll);
        let pipeline = Pipeline::new(nvmc, &self.loader, self.page_size);
        (pipeline, &mut self.slots[index as usize].bank)
    }

    fn register(&mut self, index: BankIndex) {
        let slot = &mut self.slots[index as usize];
        slot.strategy = index.into();
        slot.probed = false;
    }

    async fn read_ficr(&mut self, addr: u32) -> Result<u32, FlashError<T::Error>> {
        self.transport.read_word(addr).await.map_err(|e| {
            error!("Couldn't read FICR register {:#010x}", addr);
            FlashError::Transport(e)
        })
    }

    async fn probe(&mut self, index: BankIndex) -> Result<(), FlashError<T::Error>> {
        let page_size = self.read_ficr(regs::FICR_CODEPAGESIZE).await?;
        let page_count = self.read_ficr(regs::FICR_CODESIZE).await?;

        let code_size = match page_size.checked_mul(page_count) {
            Some(size) if page_size != 0 && is_aligned(page_size, 4) => size,
            _ => {
                error!(
                    "Unusable flash geometry: {} pages of {} bytes",
                    page_count, page_size
                );
                return Err(FlashError::InvalidGeometry {
                    page_size,
                    page_count,
                });
            }
        };

        self.page_size = page_size;
        self.code_size = code_size;
        self.slots[index as usize].bank.rebuild(page_size, page_count);

        if index == BankIndex::Code {
            self.protect_check(index)?;
        }

        let slot = &mut self.slots[index as usize];
        slot.probed = true;
        debug!(
            "Probed {:?} bank: {} sectors of {} bytes",
            index,
            slot.bank.sectors.len(),
            page_size
        );
        Ok(())
    }

    async fn auto_probe(&mut self, index: BankIndex) -> Result<(), FlashError<T::Error>> {
        if self.slots[index as usize].probed {
            return Ok(());
        }
        self.probe(index).await
    }

    fn protect_check(&mut self, index: BankIndex) -> Result<(), FlashError<T::Error>> {
        warn!(
            "protect_check() is not implemented for nRF52 series devices yet ({:?} bank)",
            index
        );
        Ok(())
    }

    async fn erase(
        &mut self,
        index: BankIndex,
        first: usize,
        last: usize,
    ) -> Result<(), FlashError<T::Error>> {
        self.auto_probe(index).await?;

        let (mut pipeline, bank) = self.pipeline(index);
        let num_sectors = bank.sectors.len();
        if first > last || last >= num_sectors {
            return Err(InvalidArgument::SectorRange {
                first,
                last,
                num_sectors,
            }
            .into());
        }

        let base = bank.base;
        for sector in &mut bank.sectors[first..=last] {
            pipeline.erase_sector(index, base, sector).await?;
        }
        Ok(())
    }

    async fn mass_erase(&mut self) -> Result<(), FlashError<T::Error>> {
        self.auto_probe(BankIndex::Code).await?;

        let res = self.nvmc().erase(EraseTrigger::All).await;
        if res.is_err() {
            error!("Failed to erase the chip");
        }

        // cached as erased even when the chip erase reports failure
        let code = &mut self.slots[BankIndex::Code as usize].bank;
        code.sectors
            .iter_mut()
            .for_each(|s| s.erase = EraseState::Erased);

        let check = self.protect_check(BankIndex::Code);

        // ERASEALL takes the UICR with it
        let uicr = self.auto_probe(BankIndex::Uicr).await;
        if uicr.is_ok() {
            let uicr = &mut self.slots[BankIndex::Uicr as usize].bank;
            uicr.sectors
                .iter_mut()
                .for_each(|s| s.erase = EraseState::Erased);
        }

        res.and(check).and(uicr)
    }

    async fn write(
        &mut self,
        index: BankIndex,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FlashError<T::Error>> {
        self.auto_probe(index).await?;
        if data.is_empty() {
            return Ok(());
        }

        let strategy = self.slots[index as usize].strategy;
        let (mut pipeline, bank) = self.pipeline(index);
        match strategy {
            WriteStrategy::Bulk => {
                check_bounds(bank.size, offset, data.len())?;
                pipeline.write_region(bank, offset, data).await
            }
            WriteStrategy::Config => pipeline.write_config_page(bank, offset, data).await,
        }
    }

    async fn read(
        &mut self,
        index: BankIndex,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<(), FlashError<T::Error>> {
        self.auto_probe(index).await?;

        let bank = &self.slots[index as usize].bank;
        check_bounds(bank.size, offset, buf.len())?;
        let addr = bank.base + offset;

        self.transport
            .read_block(addr, buf)
            .await
            .map_err(FlashError::Transport)
    }

    /// Check every sector of the bank for blankness, refreshing the cached
    /// erase state.
    async fn erase_check(&mut self, index: BankIndex) -> Result<(), FlashError<T::Error>> {
        self.auto_probe(index).await?;

        let bank = &mut self.slots[index as usize].bank;
        let mut buf = Vec::new();
        for sector in bank.sectors.iter_mut() {
            buf.resize(sector.size as usize, 0);
            self.transport
                .read_block(bank.base + sector.offset, &mut buf)
                .await
                .map_err(FlashError::Transport)?;

            sector.erase = if buf.iter().all(|b| *b == 0xff) {
                EraseState::Erased
            } else {
                EraseState::Dirty
            };
        }
        Ok(())
    }
}
