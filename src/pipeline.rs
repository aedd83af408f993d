//! Page-granular read-modify-write, for both the code region and the
//! single-page UICR.

use alloc::vec;

use log::*;
use maybe_async::maybe_async;

use crate::arch::LoaderArch;
use crate::bank::{Bank, BankIndex};
use crate::error::{FlashError, InvalidArgument};
use crate::loader::FlashLoader;
use crate::nvmc::{EraseTrigger, Mode, Nvmc};
use crate::sector::{self, EraseState, Sector};
use crate::transport::Transport;
use crate::util::align::{align_down, align_up, is_aligned};

/// Everything needed to erase and program pages of a bank.
pub struct Pipeline<'a, T, A> {
    nvmc: Nvmc<'a, T>,
    loader: &'a FlashLoader<A>,
    page_size: u32,
}

#[maybe_async(AFIT)]
impl<'a, T: Transport, A: LoaderArch> Pipeline<'a, T, A> {
    pub fn new(nvmc: Nvmc<'a, T>, loader: &'a FlashLoader<A>, page_size: u32) -> Self {
        Pipeline {
            nvmc,
            loader,
            page_size,
        }
    }

    /// Erase a single sector of the bank with the given `index` and `base`.
    pub async fn erase_sector(
        &mut self,
        index: BankIndex,
        base: u32,
        sector: &mut Sector,
    ) -> Result<(), FlashError<T::Error>> {
        let addr = base + sector.offset;

        if sector.is_protected() {
            error!("Cannot erase protected sector at {:#010x}", addr);
            return Err(FlashError::ProtectedSector { addr });
        }

        let trigger = match index {
            BankIndex::Code => EraseTrigger::Page(addr),
            BankIndex::Uicr => EraseTrigger::Uicr,
        };

        debug!("Erasing page at {:#010x}", addr);
        self.nvmc.erase(trigger).await?;

        sector.erase = EraseState::Erased;
        Ok(())
    }

    /// Write `data` at the bank-relative `offset`, preserving the contents of
    /// the surrounding bytes in every page touched.
    pub async fn write_region(
        &mut self,
        bank: &mut Bank,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FlashError<T::Error>> {
        if data.is_empty() {
            return Ok(());
        }

        let count = data.len() as u32;
        let out_of_bounds = InvalidArgument::OutOfBounds {
            offset,
            count,
            size: bank.size,
        };

        let end = offset.checked_add(count).ok_or(out_of_bounds)?;
        let first_page_offset = align_down(offset, self.page_size);
        let last_page_offset = align_up(end, self.page_size).ok_or(out_of_bounds)?;

        debug!(
            "Padding write from {:#010x}-{:#010x} as {:#010x}-{:#010x}",
            offset, end, first_page_offset, last_page_offset
        );

        let mut buffer = vec![0xff; (last_page_offset - first_page_offset) as usize];
        let head = (offset - first_page_offset) as usize;
        let tail = head + data.len();

        if head > 0 {
            debug!(
                "Read head {:#010x}-{:#010x}",
                first_page_offset,
                offset - 1
            );
            self.nvmc
                .transport()
                .read_block(bank.base + first_page_offset, &mut buffer[..head])
                .await
                .map_err(|e| {
                    error!("Couldn't read head of the first page");
                    FlashError::Transport(e)
                })?;
        }

        buffer[head..tail].copy_from_slice(data);

        if tail < buffer.len() {
            debug!(
                "Read tail {:#010x}-{:#010x}",
                end,
                last_page_offset - 1
            );
            self.nvmc
                .transport()
                .read_block(bank.base + end, &mut buffer[tail..])
                .await
                .map_err(|e| {
                    error!("Couldn't read tail of the last page");
                    FlashError::Transport(e)
                })?;
        }

        self.write_pages(bank, first_page_offset, last_page_offset, &buffer)
            .await
    }

    /// Erase (where needed) and program the page-aligned range `start..end`
    /// of the bank with `buffer`.
    pub async fn write_pages(
        &mut self,
        bank: &mut Bank,
        start: u32,
        end: u32,
        buffer: &[u8],
    ) -> Result<(), FlashError<T::Error>> {
        if start > end
            || !is_aligned(start, self.page_size)
            || !is_aligned(end, self.page_size)
            || buffer.len() != (end - start) as usize
        {
            return Err(InvalidArgument::Unaligned { start, end }.into());
        }

        let (index, base) = (bank.index, bank.base);
        let mut offset = start;
        while offset < end {
            let sector = match sector::find_sector_by_address(&mut bank.sectors, offset) {
                Some(sector) => sector,
                None => {
                    error!("Invalid sector @ {:#010x}", offset);
                    return Err(FlashError::SectorInvalid { addr: offset });
                }
            };

            if sector.is_protected() {
                error!("Can't erase protected sector @ {:#010x}", offset);
                return Err(FlashError::ProtectedSector {
                    addr: base + sector.offset,
                });
            }

            if sector.erase.needs_erase() {
                if let Err(e) = self.erase_sector(index, base, sector).await {
                    error!("Failed to erase sector @ {:#010x}", base + sector.offset);
                    return Err(e);
                }
            }

            sector.erase = EraseState::Erased;
            offset = sector.offset + sector.size;
        }

        self.nvmc.set_mode(Mode::WriteEnable).await?;

        let res = self.loader.write(&mut self.nvmc, base + start, buffer).await;
        if res.is_err() {
            error!("Failed to write sector(s) {:#010x}-{:#010x}", start, end - 1);
        }

        mark_dirty(&mut bank.sectors, start, end);

        let restore = self.nvmc.set_mode(Mode::ReadOnly).await;
        res.and(restore)
    }

    /// Overwrite `data` at `offset` within the single UICR page, preserving
    /// the rest of the page.
    pub async fn write_config_page(
        &mut self,
        bank: &mut Bank,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FlashError<T::Error>> {
        let page_size = self.page_size;
        let count = data.len() as u32;

        if offset.checked_add(count).map_or(true, |end| end > page_size) {
            return Err(InvalidArgument::ConfigPageOverflow {
                offset,
                count,
                page_size,
            }
            .into());
        }

        if data.is_empty() {
            return Ok(());
        }

        let mut page = vec![0; page_size as usize];
        self.nvmc
            .transport()
            .read_block(bank.base, &mut page)
            .await
            .map_err(|e| {
                error!("Couldn't read UICR page");
                FlashError::Transport(e)
            })?;

        let (index, base) = (bank.index, bank.base);
        let sector = match bank.sectors.first_mut() {
            Some(sector) => sector,
            None => return Err(FlashError::SectorInvalid { addr: 0 }),
        };

        if sector.erase.needs_erase() {
            self.erase_sector(index, base, sector).await?;
        }

        let offset = offset as usize;
        page[offset..offset + data.len()].copy_from_slice(data);

        self.nvmc.set_mode(Mode::WriteEnable).await?;

        let res = self.loader.write(&mut self.nvmc, base, &page).await;
        if res.is_err() {
            error!("Failed to write UICR");
        }

        sector.erase = EraseState::Dirty;

        let restore = self.nvmc.set_mode(Mode::ReadOnly).await;
        res.and(restore)
    }
}

/// Sectors starting within `start..end` no longer hold erased data.
fn mark_dirty(sectors: &mut [Sector], start: u32, end: u32) {
    sectors
        .iter_mut()
        .filter(|s| s.offset >= start && s.offset < end)
        .for_each(|s| s.erase = EraseState::Dirty);
}
