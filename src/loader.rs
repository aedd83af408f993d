//! Streaming data into flash, either through a resident drain program running
//! on the target, or (as a fallback) one word at a time over the debug link.
//!
//! The fast path is a single-producer / single-consumer channel between the
//! host and the target CPU, synchronized purely through polled shared memory:
//! the host fills a ring buffer in target RAM, and the drain program (see
//! [`LoaderArch`]) copies each word into flash as it arrives. The host never
//! lets the write pointer catch up with the read pointer (that is the "empty"
//! condition), and the target never reads past the write pointer.

use core::cmp;
use core::marker::PhantomData;
use core::time::Duration;

use log::*;
use maybe_async::maybe_async;

use crate::arch::LoaderArch;
use crate::error::{FlashError, InvalidArgument};
use crate::nvmc::Nvmc;
use crate::transport::{ScratchRegion, Transport};
use crate::util::align::is_aligned;

/// The smallest ring buffer the loader will try to allocate.
pub const MIN_BUFFER_SIZE: u32 = 256;

/// Tunables for the fast path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Size of the first ring buffer allocation attempted. Halved on every
    /// failed attempt, down to [`MIN_BUFFER_SIZE`].
    pub buffer_size: u32,
    /// How long to back off when the ring buffer is full.
    pub throttle: Duration,
}

impl Default for LoaderConfig {
    fn default() -> LoaderConfig {
        LoaderConfig {
            buffer_size: 8192,
            throttle: Duration::from_millis(10),
        }
    }
}

/// Layout of the ring buffer living in target scratch memory.
///
/// The first word holds the write pointer, the second word holds the read
/// pointer, and the rest is payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RingBuffer {
    control: u32,
    start: u32,
    end: u32,
}

impl RingBuffer {
    /// `None` if the region can't hold a control block and at least one
    /// payload word, or wraps around the address space.
    fn new(region: ScratchRegion) -> Option<RingBuffer> {
        let end = region.end()?;
        if region.size < 12 {
            return None;
        }

        Some(RingBuffer {
            control: region.address,
            start: region.address + 8,
            end,
        })
    }

    fn wp_addr(&self) -> u32 {
        self.control
    }

    fn rp_addr(&self) -> u32 {
        self.control + 4
    }

    fn is_valid_ptr(&self, ptr: u32) -> bool {
        ptr >= self.start && ptr < self.end && is_aligned(ptr - self.start, 4)
    }

    /// Number of bytes which can be written at `wp` without wrapping, and
    /// without filling the buffer completely (which would make `wp == rp`,
    /// i.e: empty).
    fn free_contiguous(&self, wp: u32, rp: u32) -> u32 {
        if rp > wp {
            rp - wp - 4
        } else if rp > self.start {
            self.end - wp
        } else {
            self.end - wp - 4
        }
    }

    fn advance(&self, wp: u32, len: u32) -> u32 {
        let wp = wp + len;
        if wp >= self.end {
            self.start
        } else {
            wp
        }
    }
}

/// Writes word-aligned buffers into (already erased, write-enabled) flash.
pub struct FlashLoader<A> {
    config: LoaderConfig,
    _arch: PhantomData<A>,
}

#[maybe_async(AFIT)]
impl<A: LoaderArch> FlashLoader<A> {
    pub fn new(config: LoaderConfig) -> FlashLoader<A> {
        FlashLoader {
            config,
            _arch: PhantomData,
        }
    }

    /// Write `data` to the absolute address `dest`.
    ///
    /// `data.len()` must be a multiple of 4. The NVMC must already be in
    /// write-enable mode.
    pub async fn write<T: Transport>(
        &self,
        nvmc: &mut Nvmc<'_, T>,
        dest: u32,
        data: &[u8],
    ) -> Result<(), FlashError<T::Error>> {
        if data.is_empty() {
            return Ok(());
        }

        let len = data.len() as u32;
        if !is_aligned(len, 4) {
            return Err(InvalidArgument::Unaligned {
                start: dest,
                end: dest.wrapping_add(len),
            }
            .into());
        }

        debug!(
            "Writing buffer to flash address={:#010x} bytes={:#x}",
            dest, len
        );

        let program = match nvmc.transport().alloc_scratch(A::DRAIN_PROGRAM.len() as u32) {
            Some(program) => program,
            None => {
                warn!("no working area available, falling back to slow memory writes");
                return write_slow(nvmc, dest, data).await;
            }
        };

        let buffer = match self.alloc_buffer(nvmc.transport()) {
            Some(buffer) => buffer,
            None => {
                nvmc.transport().free_scratch(program);
                warn!("No large enough working area available, can't do block memory writes");
                return Err(FlashError::ResourceUnavailable);
            }
        };

        debug!(
            "using fast async flash loader: program @ {:#010x}, {} byte buffer @ {:#010x}",
            program.address, buffer.size, buffer.address
        );

        let interval = nvmc.poll().interval;
        let transport = nvmc.transport();
        let res = self
            .run(transport, program, buffer, dest, data, interval)
            .await;

        transport.free_scratch(buffer);
        transport.free_scratch(program);

        res
    }

    /// Allocate the largest ring buffer available, halving the request on
    /// every failure.
    fn alloc_buffer<T: Transport>(&self, transport: &mut T) -> Option<ScratchRegion> {
        let mut size = self.config.buffer_size;
        loop {
            if let Some(region) = transport.alloc_scratch(size) {
                return Some(region);
            }

            if size <= MIN_BUFFER_SIZE {
                return None;
            }

            size = cmp::max((size / 2) & !3, MIN_BUFFER_SIZE);
            trace!("retrying ring buffer allocation with {} bytes", size);
        }
    }

    async fn run<T: Transport>(
        &self,
        transport: &mut T,
        program: ScratchRegion,
        buffer: ScratchRegion,
        dest: u32,
        data: &[u8],
        interval: Duration,
    ) -> Result<(), FlashError<T::Error>> {
        transport
            .write_block(program.address, A::DRAIN_PROGRAM)
            .await
            .map_err(FlashError::Transport)?;

        let ring = RingBuffer::new(buffer).ok_or_else(|| {
            error!(
                "unusable ring buffer: {} bytes @ {:#010x}",
                buffer.size, buffer.address
            );
            FlashError::ResourceUnavailable
        })?;
        transport
            .write_word(ring.wp_addr(), ring.start)
            .await
            .map_err(FlashError::Transport)?;
        transport
            .write_word(ring.rp_addr(), ring.start)
            .await
            .map_err(FlashError::Transport)?;

        let params = [data.len() as u32, ring.control, ring.end, dest];
        for (reg, val) in A::PARAM_REGS.iter().zip(params.iter()) {
            transport
                .write_core_reg(*reg, *val)
                .await
                .map_err(FlashError::Transport)?;
        }

        transport
            .resume(A::entry_point(program.address))
            .await
            .map_err(|e| {
                error!("error starting target flash write algorithm");
                FlashError::Transport(e)
            })?;

        let mut res = self.stream(transport, &ring, data).await;
        if res.is_err() {
            // a null write pointer tells the drain program to bail out
            if transport.write_word(ring.wp_addr(), 0).await.is_err() {
                warn!("failed to abort flash write algorithm");
            }
        }

        if let Err(e) = wait_halted(transport, interval).await {
            error!("error waiting for target flash write algorithm");
            if res.is_ok() {
                res = Err(e);
            }
        }
        res?;

        let rp = transport
            .read_word(ring.rp_addr())
            .await
            .map_err(FlashError::Transport)?;
        if rp == 0 {
            error!("flash write algorithm aborted by target");
            return Err(FlashError::LoaderAborted);
        }

        Ok(())
    }

    /// Feed `data` into the ring buffer as fast as the target drains it.
    async fn stream<T: Transport>(
        &self,
        transport: &mut T,
        ring: &RingBuffer,
        data: &[u8],
    ) -> Result<(), FlashError<T::Error>> {
        let mut wp = ring.start;
        let mut written = 0;

        while written < data.len() {
            let rp = transport.read_word(ring.rp_addr()).await.map_err(|e| {
                error!("failed to get read pointer");
                FlashError::Transport(e)
            })?;

            trace!(
                "offs {:#x} count {:#x} wp {:#010x} rp {:#010x}",
                written,
                data.len() - written,
                wp,
                rp
            );

            if rp == 0 {
                error!("flash write algorithm aborted by target");
                return Err(FlashError::LoaderAborted);
            }

            if !ring.is_valid_ptr(rp) {
                error!("corrupted fifo read pointer {:#010x}", rp);
                return Err(FlashError::CorruptReadPointer(rp));
            }

            let free = ring.free_contiguous(wp, rp) as usize;
            if free == 0 {
                transport.delay(self.config.throttle).await;
                continue;
            }

            let chunk = &data[written..][..cmp::min(free, data.len() - written)];
            transport
                .write_block(wp, chunk)
                .await
                .map_err(FlashError::Transport)?;

            written += chunk.len();
            wp = ring.advance(wp, chunk.len() as u32);

            transport
                .write_word(ring.wp_addr(), wp)
                .await
                .map_err(FlashError::Transport)?;
        }

        Ok(())
    }
}

/// Poll until the drain program hits its final breakpoint.
#[maybe_async]
async fn wait_halted<T: Transport>(
    transport: &mut T,
    interval: Duration,
) -> Result<(), FlashError<T::Error>> {
    while !transport.is_halted().await.map_err(FlashError::Transport)? {
        transport.delay(interval).await;
    }
    Ok(())
}

/// Write `data` one word at a time, waiting for the NVMC after each word.
#[maybe_async]
async fn write_slow<T: Transport>(
    nvmc: &mut Nvmc<'_, T>,
    mut dest: u32,
    data: &[u8],
) -> Result<(), FlashError<T::Error>> {
    for word in data.chunks_exact(4) {
        let val = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        nvmc.transport()
            .write_word(dest, val)
            .await
            .map_err(FlashError::Transport)?;
        nvmc.wait_ready().await?;
        dest = dest.wrapping_add(4);
    }
    Ok(())
}
