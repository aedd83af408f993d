//! Driving the NVMC's access mode and erase triggers over the debug link.

use core::time::Duration;

use log::*;
use maybe_async::maybe_async;

use crate::error::FlashError;
use crate::regs::{self, Config, Ready};
use crate::transport::Transport;

/// NVMC access mode, as selected by `NVMC.CONFIG`.
///
/// Every mode can be entered directly from every other mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    WriteEnable,
    EraseEnable,
}

impl Mode {
    fn config(self) -> Config {
        match self {
            Mode::ReadOnly => Config::empty(),
            Mode::WriteEnable => Config::WEN,
            Mode::EraseEnable => Config::EEN,
        }
    }
}

/// What to erase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraseTrigger {
    /// Erase the code page starting at the given absolute address.
    Page(u32),
    /// Erase all of code flash (and the UICR).
    All,
    /// Erase the UICR page.
    Uicr,
}

impl EraseTrigger {
    /// The register to write, and the value to write to it.
    fn register(self) -> (u32, u32) {
        match self {
            EraseTrigger::Page(addr) => (regs::NVMC_ERASEPAGE, addr),
            EraseTrigger::All => (regs::NVMC_ERASEALL, regs::ERASE_START),
            EraseTrigger::Uicr => (regs::NVMC_ERASEUICR, regs::ERASE_START),
        }
    }
}

/// Bounded retry budget used when polling `NVMC.READY`.
///
/// This is a fixed number of polls with a fixed delay in between, not a
/// wall-clock deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadyPoll {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ReadyPoll {
    fn default() -> ReadyPoll {
        ReadyPoll {
            attempts: 100,
            interval: Duration::from_millis(1),
        }
    }
}

/// A borrowed transport, viewed as the NVMC peripheral.
pub struct Nvmc<'a, T> {
    transport: &'a mut T,
    poll: ReadyPoll,
}

#[maybe_async(AFIT)]
impl<'a, T: Transport> Nvmc<'a, T> {
    pub fn new(transport: &'a mut T, poll: ReadyPoll) -> Nvmc<'a, T> {
        Nvmc { transport, poll }
    }

    /// Access the underlying transport.
    pub fn transport(&mut self) -> &mut T {
        self.transport
    }

    pub fn poll(&self) -> ReadyPoll {
        self.poll
    }

    /// Poll `NVMC.READY` until it reports ready, or the poll budget runs out.
    pub async fn wait_ready(&mut self) -> Result<(), FlashError<T::Error>> {
        for attempt in 0..self.poll.attempts {
            if attempt != 0 {
                self.transport.delay(self.poll.interval).await;
            }

            let ready = match self.transport.read_word(regs::NVMC_READY).await {
                Ok(v) => Ready::from_bits_retain(v),
                Err(e) => {
                    error!("Couldn't read NVMC_READY register");
                    return Err(FlashError::Transport(e));
                }
            };

            if ready == Ready::READY {
                return Ok(());
            }
        }

        debug!("Timed out waiting for the NVMC to be ready");
        Err(FlashError::Busy)
    }

    /// Wait for the NVMC to become ready, then switch it to `mode`.
    pub async fn set_mode(&mut self, mode: Mode) -> Result<(), FlashError<T::Error>> {
        self.wait_ready().await?;

        self.transport
            .write_word(regs::NVMC_CONFIG, mode.config().bits())
            .await
            .map_err(|e| {
                error!("Failed to configure the NVMC for {:?}", mode);
                FlashError::Transport(e)
            })
    }

    /// Enable erasing, fire `trigger`, then return to read-only mode.
    ///
    /// Returning to read-only mode is attempted even if firing the trigger
    /// failed, in which case the trigger's error is reported.
    pub async fn erase(&mut self, trigger: EraseTrigger) -> Result<(), FlashError<T::Error>> {
        self.set_mode(Mode::EraseEnable).await?;

        let (reg, val) = trigger.register();
        let res = self.transport.write_word(reg, val).await.map_err(|e| {
            error!("Failed to write NVMC erase register");
            FlashError::Transport(e)
        });

        let restore = self.set_mode(Mode::ReadOnly).await;
        res.and(restore)
    }
}
