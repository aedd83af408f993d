//! The register-level link to the target being programmed.

use core::time::Duration;

use maybe_async::maybe_async;

/// A block of target RAM handed out by [`Transport::alloc_scratch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScratchRegion {
    /// Start address of the region.
    pub address: u32,
    /// Size of the region, in bytes.
    pub size: u32,
}

impl ScratchRegion {
    /// One past the last address of the region, or `None` if the region runs
    /// off the end of the address space.
    pub fn end(&self) -> Option<u32> {
        self.address.checked_add(self.size)
    }
}

/// Memory, register, and execution access to a target over a debug link
/// (e.g: a SWD probe).
///
/// Every method blocks until the debug link has acknowledged the request.
/// With the `sync` feature disabled, the methods are `async` instead, and
/// return once the underlying request has completed.
#[maybe_async(AFIT)]
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Transport-specific error type.
    type Error;

    /// Read a single 32-bit word.
    async fn read_word(&mut self, addr: u32) -> Result<u32, Self::Error>;

    /// Write a single 32-bit word.
    async fn write_word(&mut self, addr: u32, val: u32) -> Result<(), Self::Error>;

    /// Fill `buf` with the bytes starting at `addr`.
    async fn read_block(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write all of `data`, starting at `addr`.
    async fn write_block(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Reserve `size` bytes of target RAM, returning `None` if no suitably
    /// sized region is available.
    ///
    /// This method's default implementation never hands out memory, which
    /// restricts flash writes to the (slow) word-at-a-time path.
    fn alloc_scratch(&mut self, size: u32) -> Option<ScratchRegion> {
        let _ = size;
        None
    }

    /// Return a region obtained from `alloc_scratch`.
    fn free_scratch(&mut self, region: ScratchRegion) {
        let _ = region;
    }

    /// Write a core register, identified by its raw architecture-specific
    /// number (see [`LoaderArch::PARAM_REGS`](crate::arch::LoaderArch)).
    ///
    /// Only called while the core is halted.
    async fn write_core_reg(&mut self, reg: u8, val: u32) -> Result<(), Self::Error>;

    /// Resume execution of the (halted) core at `entry`.
    async fn resume(&mut self, entry: u32) -> Result<(), Self::Error>;

    /// Check whether the core has halted (e.g: by hitting a breakpoint).
    async fn is_halted(&mut self) -> Result<bool, Self::Error>;

    /// Sleep for `duration` between polls.
    ///
    /// With the `std` feature enabled, this method's default implementation
    /// calls [`std::thread::sleep`]. Otherwise, it returns immediately, and
    /// polling turns into busy-waiting.
    async fn delay(&mut self, duration: Duration) {
        cfg_if::cfg_if! {
            if #[cfg(feature = "std")] {
                std::thread::sleep(duration);
            } else {
                let _ = duration;
            }
        }
    }
}
