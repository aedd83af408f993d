//! A simulated nRF52 sitting behind a debug link.
//!
//! Models just enough of the chip to exercise the driver end to end: the FICR
//! geometry registers, the NVMC (mode gating, erase triggers, a configurable
//! number of "busy" polls), NOR flash semantics (programming can only clear
//! bits), a scratch RAM allocator, and the resident drain program consuming
//! the ring buffer while the host fills it.
//!
//! The "CPU" only makes progress when the host talks to the target, which is
//! plenty to interleave host and target the way real hardware would.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use core::time::Duration;

use crate::arch::arm::Armv6m;
use crate::arch::LoaderArch;
use crate::nvmc::EraseTrigger;
use crate::regs::{self, Config};
use crate::transport::{ScratchRegion, Transport};
use crate::util::align::align_up;

/// Start of the simulated scratch RAM.
pub const SCRATCH_BASE: u32 = 0x2000_0000;
const SCRATCH_SIZE: u32 = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// Failure requested through [`SimTarget::fault`].
    Injected,
    /// Access to an address the simulator doesn't model.
    BadAddress(u32),
}

/// A single injected transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every `write_word` to the address fails.
    WriteTo(u32),
    /// The n-th (0-based) `write_word` to the address fails.
    NthWriteTo(u32, usize),
    /// The n-th (0-based) `write_block` fails.
    NthWriteBlock(usize),
    /// Every `read_word` / `read_block` starting at the address fails.
    ReadFrom(u32),
    Resume,
    IsHalted,
}

pub struct SimTarget {
    /// Value reported by `FICR.CODEPAGESIZE`.
    pub codepagesize: u32,
    /// Value reported by `FICR.CODESIZE`.
    pub codesize: u32,

    code: Vec<u8>,
    uicr: Vec<u8>,
    ram: Vec<u8>,
    config: Config,
    core_regs: [u32; 16],
    scratch: Vec<ScratchRegion>,
    write_counts: BTreeMap<u32, usize>,
    block_writes: usize,

    // knobs
    pub fault: Option<Fault>,
    /// Number of upcoming `NVMC.READY` reads reporting busy.
    pub busy_polls: u32,
    /// Largest scratch allocation that succeeds.
    pub max_scratch: u32,
    /// Words the drain program copies per host interaction.
    pub drain_per_poll: usize,
    /// Read pointer reported to the host once the drain program has started.
    pub corrupt_read_pointer: Option<u32>,
    /// Host interactions the drain program sits out after being resumed.
    pub stall_ticks: usize,
    /// Drain program publishes a null read pointer as it finishes.
    pub abort_when_done: bool,

    // observations
    pub halted: bool,
    pub ran_drain_program: bool,
    pub ready_polls: u32,
    pub delays: Vec<Duration>,
    pub config_writes: Vec<u32>,
    pub erases: Vec<EraseTrigger>,
    pub scratch_requests: Vec<u32>,
    pub slow_word_writes: usize,
    pub ring_wraps: usize,
    /// Null write pointers stored by the host while the drain program ran.
    pub abort_requests: usize,
    /// Flash programming attempted outside of write-enable mode.
    pub rejected_writes: usize,
}

impl SimTarget {
    /// A blank chip with `page_count` code pages of `page_size` bytes.
    pub fn new(page_count: u32, page_size: u32) -> SimTarget {
        let _ = pretty_env_logger::try_init();

        SimTarget {
            codepagesize: page_size,
            codesize: page_count,

            code: vec![0xff; (page_count * page_size) as usize],
            uicr: vec![0xff; page_size as usize],
            ram: vec![0; SCRATCH_SIZE as usize],
            config: Config::empty(),
            core_regs: [0; 16],
            scratch: Vec::new(),
            write_counts: BTreeMap::new(),
            block_writes: 0,

            fault: None,
            busy_polls: 0,
            max_scratch: u32::MAX,
            drain_per_poll: usize::MAX,
            corrupt_read_pointer: None,
            stall_ticks: 0,
            abort_when_done: false,

            halted: true,
            ran_drain_program: false,
            ready_polls: 0,
            delays: Vec::new(),
            config_writes: Vec::new(),
            erases: Vec::new(),
            scratch_requests: Vec::new(),
            slow_word_writes: 0,
            ring_wraps: 0,
            abort_requests: 0,
            rejected_writes: 0,
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn uicr(&self) -> &[u8] {
        &self.uicr
    }

    pub fn fill_code(&mut self, val: u8) {
        self.code.iter_mut().for_each(|b| *b = val);
    }

    pub fn fill_uicr(&mut self, val: u8) {
        self.uicr.iter_mut().for_each(|b| *b = val);
    }

    pub fn scratch_in_use(&self) -> &[ScratchRegion] {
        &self.scratch
    }

    fn flash_mut(&mut self, addr: u32, len: usize) -> Option<&mut [u8]> {
        let (mem, offset) = if addr >= regs::UICR_BASE {
            (&mut self.uicr, (addr - regs::UICR_BASE) as usize)
        } else {
            (&mut self.code, (addr - regs::FLASH_BASE) as usize)
        };
        mem.get_mut(offset..offset.checked_add(len)?)
    }

    fn mem(&self, addr: u32, len: usize) -> Option<&[u8]> {
        let (mem, base) = match addr {
            a if a >= SCRATCH_BASE => (&self.ram, SCRATCH_BASE),
            a if a >= regs::UICR_BASE => (&self.uicr, regs::UICR_BASE),
            _ => (&self.code, regs::FLASH_BASE),
        };
        let offset = (addr - base) as usize;
        mem.get(offset..offset.checked_add(len)?)
    }

    fn ram_mut(&mut self, addr: u32, len: usize) -> Option<&mut [u8]> {
        let offset = addr.checked_sub(SCRATCH_BASE)? as usize;
        self.ram.get_mut(offset..offset.checked_add(len)?)
    }

    fn ram_word(&self, addr: u32) -> u32 {
        let b = self.mem(addr, 4).unwrap();
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn set_ram_word(&mut self, addr: u32, val: u32) {
        self.ram_mut(addr, 4)
            .unwrap()
            .copy_from_slice(&val.to_le_bytes());
    }

    /// Program a word of flash. Like the real NVMC, this can only clear bits,
    /// and only does anything in write-enable mode.
    fn program(&mut self, addr: u32, val: u32) -> Result<(), SimError> {
        if !self.config.contains(Config::WEN) {
            self.rejected_writes += 1;
            return Ok(());
        }

        let cells = self.flash_mut(addr, 4).ok_or(SimError::BadAddress(addr))?;
        for (cell, b) in cells.iter_mut().zip(val.to_le_bytes()) {
            *cell &= b;
        }
        Ok(())
    }

    fn erase(&mut self, trigger: EraseTrigger) {
        if !self.config.contains(Config::EEN) {
            self.rejected_writes += 1;
            return;
        }

        match trigger {
            EraseTrigger::Page(addr) => {
                let page_size = self.codepagesize as usize;
                let start = addr as usize / page_size * page_size;
                if let Some(page) = self.code.get_mut(start..start + page_size) {
                    page.iter_mut().for_each(|b| *b = 0xff);
                }
            }
            EraseTrigger::All => {
                self.fill_code(0xff);
                self.fill_uicr(0xff);
            }
            EraseTrigger::Uicr => self.fill_uicr(0xff),
        }
        self.erases.push(trigger);
    }

    fn check_write(&mut self, addr: u32) -> Result<(), SimError> {
        let count = self.write_counts.entry(addr).or_insert(0);
        let nth = *count;
        *count += 1;

        match self.fault {
            Some(Fault::WriteTo(a)) if a == addr => Err(SimError::Injected),
            Some(Fault::NthWriteTo(a, n)) if a == addr && n == nth => Err(SimError::Injected),
            _ => Ok(()),
        }
    }

    fn check_read(&self, addr: u32) -> Result<(), SimError> {
        match self.fault {
            Some(Fault::ReadFrom(a)) if a == addr => Err(SimError::Injected),
            _ => Ok(()),
        }
    }

    /// Let the drain program run for a bit.
    fn tick(&mut self) {
        if self.halted {
            return;
        }

        if self.stall_ticks > 0 {
            self.stall_ticks -= 1;
            return;
        }

        let [count, control, end, dest] = [0, 1, 2, 3].map(|r| self.core_regs[r]);
        let (mut count, mut dest) = (count, dest);

        for _ in 0..self.drain_per_poll {
            let wp = self.ram_word(control);
            if wp == 0 {
                self.halted = true;
                break;
            }

            let rp = self.ram_word(control + 4);
            if rp == wp {
                break;
            }

            let word = self.ram_word(rp);
            self.program(dest, word).unwrap();
            dest += 4;

            let mut rp = rp + 4;
            if rp >= end {
                rp = control + 8;
                self.ring_wraps += 1;
            }
            self.set_ram_word(control + 4, rp);

            count -= 4;
            if count == 0 {
                if self.abort_when_done {
                    self.set_ram_word(control + 4, 0);
                }
                self.halted = true;
                break;
            }
        }

        self.core_regs[0] = count;
        self.core_regs[3] = dest;
    }
}

impl Transport for SimTarget {
    type Error = SimError;

    fn read_word(&mut self, addr: u32) -> Result<u32, SimError> {
        self.tick();
        self.check_read(addr)?;

        match addr {
            regs::FICR_CODEPAGESIZE => Ok(self.codepagesize),
            regs::FICR_CODESIZE => Ok(self.codesize),
            regs::NVMC_READY => {
                self.ready_polls += 1;
                if self.busy_polls > 0 {
                    self.busy_polls -= 1;
                    Ok(0)
                } else {
                    Ok(regs::Ready::READY.bits())
                }
            }
            regs::NVMC_CONFIG => Ok(self.config.bits()),
            _ => {
                if let Some(rp) = self.corrupt_read_pointer {
                    if self.ran_drain_program && addr == self.core_regs[1] + 4 {
                        return Ok(rp);
                    }
                }
                let b = self.mem(addr, 4).ok_or(SimError::BadAddress(addr))?;
                Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
        }
    }

    fn write_word(&mut self, addr: u32, val: u32) -> Result<(), SimError> {
        self.tick();
        self.check_write(addr)?;

        match addr {
            regs::NVMC_CONFIG => {
                self.config = Config::from_bits_truncate(val);
                self.config_writes.push(val);
            }
            regs::NVMC_ERASEPAGE => self.erase(EraseTrigger::Page(val)),
            regs::NVMC_ERASEALL if val == regs::ERASE_START => self.erase(EraseTrigger::All),
            regs::NVMC_ERASEUICR if val == regs::ERASE_START => self.erase(EraseTrigger::Uicr),
            a if a >= SCRATCH_BASE => {
                if self.ran_drain_program && a == self.core_regs[1] && val == 0 {
                    self.abort_requests += 1;
                }
                let cells = self.ram_mut(a, 4).ok_or(SimError::BadAddress(a))?;
                cells.copy_from_slice(&val.to_le_bytes());
            }
            a if self.flash_mut(a, 4).is_some() => {
                self.slow_word_writes += 1;
                self.program(a, val)?;
            }
            a => return Err(SimError::BadAddress(a)),
        }
        Ok(())
    }

    fn read_block(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), SimError> {
        self.tick();
        self.check_read(addr)?;

        let mem = self.mem(addr, buf.len()).ok_or(SimError::BadAddress(addr))?;
        buf.copy_from_slice(mem);
        Ok(())
    }

    fn write_block(&mut self, addr: u32, data: &[u8]) -> Result<(), SimError> {
        self.tick();

        let nth = self.block_writes;
        self.block_writes += 1;
        if self.fault == Some(Fault::NthWriteBlock(nth)) {
            return Err(SimError::Injected);
        }

        let cells = self
            .ram_mut(addr, data.len())
            .ok_or(SimError::BadAddress(addr))?;
        cells.copy_from_slice(data);
        Ok(())
    }

    fn alloc_scratch(&mut self, size: u32) -> Option<ScratchRegion> {
        self.scratch_requests.push(size);
        if size > self.max_scratch {
            return None;
        }

        let address = self
            .scratch
            .iter()
            .filter_map(|r| r.end())
            .max()
            .unwrap_or(SCRATCH_BASE);
        let address = align_up(address, 4)?;
        if address + size > SCRATCH_BASE + SCRATCH_SIZE {
            return None;
        }

        let region = ScratchRegion { address, size };
        self.scratch.push(region);
        Some(region)
    }

    fn free_scratch(&mut self, region: ScratchRegion) {
        let pos = self
            .scratch
            .iter()
            .position(|r| *r == region)
            .expect("freed a region that was never allocated");
        self.scratch.remove(pos);
    }

    fn write_core_reg(&mut self, reg: u8, val: u32) -> Result<(), SimError> {
        assert!(self.halted, "core registers written while running");
        self.core_regs[reg as usize] = val;
        Ok(())
    }

    fn resume(&mut self, entry: u32) -> Result<(), SimError> {
        if self.fault == Some(Fault::Resume) {
            return Err(SimError::Injected);
        }

        let program = self
            .mem(entry, Armv6m::DRAIN_PROGRAM.len())
            .ok_or(SimError::BadAddress(entry))?;
        assert_eq!(program, Armv6m::DRAIN_PROGRAM, "resumed into garbage");

        self.ran_drain_program = true;
        self.halted = false;
        Ok(())
    }

    fn is_halted(&mut self) -> Result<bool, SimError> {
        self.tick();
        if self.fault == Some(Fault::IsHalted) {
            return Err(SimError::Injected);
        }
        Ok(self.halted)
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
        self.tick();
    }
}
