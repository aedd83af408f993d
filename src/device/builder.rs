use core::fmt::{self, Display};
use core::marker::PhantomData;
use core::time::Duration;

use crate::arch::LoaderArch;
use crate::loader::{LoaderConfig, MIN_BUFFER_SIZE};
use crate::nvmc::ReadyPoll;
use crate::transport::Transport;

use super::{Config, Device};

/// An error which may occur when building a [`Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceBuilderError {
    /// `ready_poll` was given zero attempts, so the NVMC could never be
    /// observed as ready.
    ZeroReadyAttempts,
    /// `loader_buffer_size` is smaller than the smallest usable ring buffer.
    LoaderBufferTooSmall(u32),
}

impl Display for DeviceBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::DeviceBuilderError::*;
        match self {
            ZeroReadyAttempts => write!(f, "`ready_poll` must allow at least one attempt."),
            LoaderBufferTooSmall(size) => write!(
                f,
                "`loader_buffer_size` of {} bytes is smaller than the minimum of {} bytes.",
                size, MIN_BUFFER_SIZE
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DeviceBuilderError {}

/// Helper to construct and customize a [`Device`].
pub struct DeviceBuilder<T, A> {
    transport: T,
    ready_poll: Option<ReadyPoll>,
    loader_buffer_size: Option<u32>,
    loader_throttle: Option<Duration>,

    _arch: PhantomData<A>,
}

impl<T: Transport, A: LoaderArch> DeviceBuilder<T, A> {
    /// Create a new `DeviceBuilder` using the provided transport.
    pub fn new(transport: T) -> DeviceBuilder<T, A> {
        DeviceBuilder {
            transport,
            ready_poll: None,
            loader_buffer_size: None,
            loader_throttle: None,

            _arch: PhantomData,
        }
    }

    /// How many times to poll `NVMC.READY`, and how long to sleep between
    /// polls. Defaults to 100 attempts, 1ms apart.
    ///
    /// The same interval is used while waiting for the drain program to
    /// halt.
    pub fn ready_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_poll = Some(ReadyPoll { attempts, interval });
        self
    }

    /// Size of the first ring buffer allocation attempted by the flash
    /// loader. Defaults to 8192 bytes.
    ///
    /// Rounded down to a multiple of 4.
    pub fn loader_buffer_size(mut self, size: u32) -> Self {
        self.loader_buffer_size = Some(size);
        self
    }

    /// How long the flash loader backs off when the ring buffer is full.
    /// Defaults to 10ms.
    pub fn loader_throttle(mut self, throttle: Duration) -> Self {
        self.loader_throttle = Some(throttle);
        self
    }

    /// Build the Device, returning an error if something went wrong.
    pub fn build(self) -> Result<Device<T, A>, DeviceBuilderError> {
        let ready_poll = self.ready_poll.unwrap_or_default();
        if ready_poll.attempts == 0 {
            return Err(DeviceBuilderError::ZeroReadyAttempts);
        }

        let mut loader = LoaderConfig::default();
        if let Some(size) = self.loader_buffer_size {
            if size < MIN_BUFFER_SIZE {
                return Err(DeviceBuilderError::LoaderBufferTooSmall(size));
            }
            loader.buffer_size = size & !3;
        }
        if let Some(throttle) = self.loader_throttle {
            loader.throttle = throttle;
        }

        Ok(Device::from_parts(
            self.transport,
            Config { ready_poll, loader },
        ))
    }
}
