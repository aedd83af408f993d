use core::fmt::{self, Debug, Display};

/// An error which may occur while erasing, writing, or probing flash.
///
/// `E` is the error type of the underlying
/// [`Transport`](crate::transport::Transport).
#[derive(Debug)]
#[non_exhaustive]
pub enum FlashError<E> {
    /// A register, memory, or execution call over the debug link failed.
    Transport(E),
    /// The NVMC did not report ready within the configured poll budget.
    Busy,
    /// The address does not map onto any sector of the bank.
    SectorInvalid {
        /// Bank-relative offset that could not be resolved.
        addr: u32,
    },
    /// The operation targets a sector known to be write protected.
    ///
    /// nRF52 protection querying is not implemented, so sectors never end up
    /// in this state today.
    ProtectedSector {
        /// Absolute address of the offending sector.
        addr: u32,
    },
    /// Not even the smallest usable ring buffer could be allocated in target
    /// scratch memory.
    ResourceUnavailable,
    /// The caller passed an argument the operation cannot honor.
    InvalidArgument(InvalidArgument),
    /// The FICR reported a flash geometry which cannot be programmed.
    InvalidGeometry {
        /// `FICR.CODEPAGESIZE`
        page_size: u32,
        /// `FICR.CODESIZE`
        page_count: u32,
    },
    /// The resident drain program signalled an abort by zeroing its read
    /// pointer.
    LoaderAborted,
    /// The resident drain program published a read pointer outside of the
    /// ring buffer payload.
    CorruptReadPointer(u32),
}

/// Detailed reason for a [`FlashError::InvalidArgument`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidArgument {
    /// A UICR write would run past the end of its single page.
    ConfigPageOverflow {
        offset: u32,
        count: u32,
        page_size: u32,
    },
    /// The requested range runs past the end of the bank.
    OutOfBounds { offset: u32, count: u32, size: u32 },
    /// A page- or word-aligned range was expected.
    Unaligned { start: u32, end: u32 },
    /// Sector indices outside of `0..num_sectors`, or `first > last`.
    SectorRange {
        first: usize,
        last: usize,
        num_sectors: usize,
    },
    /// The base address matches neither the code region nor the UICR.
    UnknownBank(u32),
}

impl<E> From<InvalidArgument> for FlashError<E> {
    fn from(e: InvalidArgument) -> Self {
        FlashError::InvalidArgument(e)
    }
}

impl Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::InvalidArgument::*;
        match self {
            ConfigPageOverflow { offset, count, page_size } => write!(f, "UICR write of {} bytes at offset {:#x} exceeds the {} byte page", count, offset, page_size),
            OutOfBounds { offset, count, size } => write!(f, "{} bytes at offset {:#x} exceed the bank size of {:#x}", count, offset, size),
            Unaligned { start, end } => write!(f, "range {:#010x}..{:#010x} is not aligned", start, end),
            SectorRange { first, last, num_sectors } => write!(f, "sector range {}..={} is invalid for a bank with {} sectors", first, last, num_sectors),
            UnknownBank(base) => write!(f, "invalid bank address {:#010x}", base),
        }
    }
}

impl<E> Display for FlashError<E>
where
    E: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::FlashError::*;
        match self {
            Transport(e) => write!(f, "Transport error: {:?}", e),
            Busy => write!(f, "Timed out waiting for the NVMC to be ready"),
            SectorInvalid { addr } => write!(f, "Invalid sector @ {:#010x}", addr),
            ProtectedSector { addr } => write!(f, "Sector @ {:#010x} is protected", addr),
            ResourceUnavailable => write!(f, "No large enough working area available, can't do block memory writes"),
            InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            InvalidGeometry { page_size, page_count } => write!(f, "FICR reports an unusable flash geometry: {} pages of {} bytes", page_count, page_size),
            LoaderAborted => write!(f, "Flash write algorithm aborted by target"),
            CorruptReadPointer(rp) => write!(f, "Corrupted fifo read pointer {:#010x}", rp),
        }
    }
}

#[cfg(feature = "std")]
impl<E> std::error::Error for FlashError<E> where E: Debug {}

#[cfg(feature = "std")]
impl std::error::Error for InvalidArgument {}
