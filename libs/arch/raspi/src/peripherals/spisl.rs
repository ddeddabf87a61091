//! SPI slave on top of the PCM/I2S block.
//!
//! The SPI slave controller of the SoC is not wired to the board, so the PCM
//! receiver is run in slave mode on GPIO 28 to 31 (header P5) instead. Chip
//! select is not used: the Pi has to be the only slave on the bus.
//!
//! PCM has no notion of byte boundaries. [`SpiSlave::synchronize`] finds them
//! by having the master repeat [`MARKER`] and briefly stopping the receive
//! clock whenever a byte comes in misaligned, until enough markers arrive in a
//! row. The master then waits for the marker to come back and answers with
//! [`ACK`].

use log::{debug, info};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

use super::{
    gpio::{Function, Gpio},
    registers::{ClockManager, CM_CTL, CM_DIV, PCM_CHANNEL, PCM_CS, PCM_INT, PCM_MODE},
    timer::{Delay, TICKS_PER_MS, TICKS_PER_US},
    Peripherals,
};
use crate::{
    concurrency::barrier::{memory_barrier, synchronization_barrier},
    Result, Spin,
};

/// Byte the master repeats until the slave is aligned.
pub const MARKER: u8 = 0x81;

/// Byte the master sends once it has seen the marker echoed.
pub const ACK: u8 = MARKER ^ 0xff;

/// Consecutive markers that count as aligned.
pub const SYNC_RUN: u32 = 10;

/// How long the receive clock is held off to shift the bit position.
pub const GLITCH_TICKS: u32 = TICKS_PER_US;

/// PCM pins on header P5: CLK, FS, DIN, DOUT.
const PINS: core::ops::RangeInclusive<u8> = 28..=31;

/// Clock manager divisor for the PCM clock during the reset sequence.
const RESET_DIVISOR: u32 = 250;

/// Access to the PCM FIFO and receive clock.
pub trait PcmPort {
    /// The receive FIFO holds at least one byte.
    fn rx_ready(&self) -> bool;
    /// The transmit FIFO can take a byte.
    fn tx_ready(&self) -> bool;
    fn tx_empty(&self) -> bool;
    fn read_fifo(&self) -> u8;
    fn write_fifo(&self, byte: u8);
    fn set_clock_enabled(&self, enabled: bool);
}

impl<P: PcmPort + ?Sized> PcmPort for &P {
    fn rx_ready(&self) -> bool {
        (**self).rx_ready()
    }

    fn tx_ready(&self) -> bool {
        (**self).tx_ready()
    }

    fn tx_empty(&self) -> bool {
        (**self).tx_empty()
    }

    fn read_fifo(&self) -> u8 {
        (**self).read_fifo()
    }

    fn write_fifo(&self, byte: u8) {
        (**self).write_fifo(byte)
    }

    fn set_clock_enabled(&self, enabled: bool) {
        (**self).set_clock_enabled(enabled)
    }
}

impl PcmPort for Peripherals {
    fn rx_ready(&self) -> bool {
        self.pcm().cs.is_set(PCM_CS::RXD)
    }

    fn tx_ready(&self) -> bool {
        self.pcm().cs.is_set(PCM_CS::TXD)
    }

    fn tx_empty(&self) -> bool {
        self.pcm().cs.is_set(PCM_CS::TXE)
    }

    fn read_fifo(&self) -> u8 {
        self.pcm().fifo.get() as u8
    }

    fn write_fifo(&self, byte: u8) {
        self.pcm().fifo.set(u32::from(byte))
    }

    fn set_clock_enabled(&self, enabled: bool) {
        self.pcm().mode.modify(if enabled {
            PCM_MODE::CLK_DIS::CLEAR
        } else {
            PCM_MODE::CLK_DIS::SET
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Matched,
    /// The byte was not a marker; alignment starts over.
    Glitch,
}

/// Run of consecutive markers seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Alignment {
    run: u32,
}

impl Alignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, byte: u8) -> Observation {
        if byte == MARKER {
            self.run += 1;
            Observation::Matched
        } else {
            self.run = 0;
            Observation::Glitch
        }
    }

    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn is_aligned(&self) -> bool {
        self.run >= SYNC_RUN
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Bytes read until [`SYNC_RUN`] markers arrived in a row.
    pub consumed: usize,
    /// Receive clock interruptions.
    pub glitches: usize,
    /// Bytes read after echoing the marker, the final [`ACK`] included.
    pub handshake_bytes: usize,
}

pub struct SpiSlave<P, D> {
    port: P,
    delay: D,
    budget: Spin,
}

impl<P: PcmPort, D: Delay> SpiSlave<P, D> {
    pub fn new(port: P, delay: D) -> Self {
        Self::with_budget(port, delay, Spin::forever())
    }

    /// Each operation fails with [`crate::Error::Timeout`] once it has used
    /// up `budget`. During [`SpiSlave::synchronize`] every discarded byte also
    /// counts against it.
    pub fn with_budget(port: P, delay: D, budget: Spin) -> Self {
        SpiSlave {
            port,
            delay,
            budget,
        }
    }

    /// True if at least `num` bytes are waiting. Only exact for `num <= 1`;
    /// larger values are answered as if they were 1.
    pub fn poll(&self, num: usize) -> bool {
        num == 0 || self.port.rx_ready()
    }

    fn read_with(&self, spin: &mut Spin) -> Result<u8> {
        spin.wait_until(|| self.port.rx_ready())?;
        Ok(self.port.read_fifo())
    }

    fn write_with(&self, spin: &mut Spin, byte: u8) -> Result<()> {
        spin.wait_until(|| self.port.tx_ready())?;
        self.port.write_fifo(byte);
        // Whatever the master clocked in meanwhile is stale
        while self.port.rx_ready() {
            self.port.read_fifo();
            spin.tick()?;
        }
        Ok(())
    }

    pub fn read(&self) -> Result<u8> {
        let mut spin = self.budget;
        self.read_with(&mut spin)
    }

    /// Queues `byte`. It only goes out while the master clocks in the next
    /// byte, which may be much later or never.
    pub fn write(&self, byte: u8) -> Result<()> {
        let mut spin = self.budget;
        self.write_with(&mut spin, byte)
    }

    /// Waits until the transmit FIFO is empty.
    pub fn flush(&self) -> Result<()> {
        let mut spin = self.budget;
        spin.wait_until(|| self.port.tx_empty())
    }

    fn glitch(&self) {
        self.port.set_clock_enabled(false);
        self.delay.delay_ticks(GLITCH_TICKS);
        self.port.set_clock_enabled(true);
    }

    /// Aligns to the master's byte stream, then runs the marker handshake.
    ///
    /// A single wrong byte throws away all progress, so a noisy line may keep
    /// this from ever finishing under the default budget.
    pub fn synchronize(&self) -> Result<SyncReport> {
        let mut spin = self.budget;
        let mut alignment = Alignment::new();
        let mut report = SyncReport::default();

        while !alignment.is_aligned() {
            let byte = self.read_with(&mut spin)?;
            report.consumed += 1;
            if alignment.observe(byte) == Observation::Glitch {
                self.glitch();
                report.glitches += 1;
                spin.tick()?;
            }
        }
        debug!(
            "spi slave: aligned after {} bytes and {} glitches",
            report.consumed, report.glitches
        );

        self.write_with(&mut spin, MARKER)?;
        loop {
            let byte = self.read_with(&mut spin)?;
            report.handshake_bytes += 1;
            if byte == ACK {
                break;
            }
            spin.tick()?;
        }
        info!("spi slave: synchronized with master");
        Ok(report)
    }
}

impl<D: Delay> SpiSlave<Peripherals, D> {
    /// Resets the PCM block and attaches it to GPIO 28 to 31 as a clock
    /// slave. Kernel drivers for PCM must not be loaded.
    pub fn init(&self) -> Result<()> {
        let mut spin = self.budget;
        let hw = self.port;
        let gpio = Gpio::new(hw);
        let pcm = hw.pcm();
        let cm = hw.cm(ClockManager::Pcm);

        // Detach the interface while reconfiguring
        for pin in PINS {
            gpio.configure(pin, Function::Input)?;
        }
        memory_barrier();

        while pcm.cs.is_set(PCM_CS::RXD) {
            pcm.fifo.get();
            spin.tick()?;
        }

        pcm.cs.modify(PCM_CS::EN::CLEAR);
        self.delay.delay_ticks(TICKS_PER_MS);

        pcm.rxc.set(0);
        pcm.txc.set(0);
        pcm.inten.set(0);
        pcm.intstc.write(
            PCM_INT::TXW::SET + PCM_INT::RXR::SET + PCM_INT::TXERR::SET + PCM_INT::RXERR::SET,
        );
        pcm.gray.set(0);

        let channel_1 = PCM_CHANNEL::CH1WEX::CLEAR
            + PCM_CHANNEL::CH1POS.val(0)
            + PCM_CHANNEL::CH1WID.val(0)
            + PCM_CHANNEL::CH1EN::SET;
        pcm.rxc.modify(channel_1);
        pcm.txc.modify(channel_1);

        // Reset sequence, run as clock master from the oscillator
        cm.div.write(CM_DIV::PASSWD::Passwd + CM_DIV::DIVI.val(RESET_DIVISOR));
        cm.ctl.write(
            CM_CTL::PASSWD::Passwd + CM_CTL::SRC::Oscillator + CM_CTL::MASH.val(1) + CM_CTL::ENAB::SET,
        );
        pcm.mode.write(PCM_MODE::FLEN.val(7) + PCM_MODE::FSLEN.val(7) + PCM_MODE::CLK_DIS::SET);
        pcm.mode.modify(PCM_MODE::CLK_DIS::CLEAR);
        pcm.cs.write(
            PCM_CS::TXCLR::SET
                + PCM_CS::RXCLR::SET
                + PCM_CS::TXERR::SET
                + PCM_CS::RXERR::SET
                + PCM_CS::TXON::SET
                + PCM_CS::RXON::SET
                + PCM_CS::SYNC::SET
                + PCM_CS::STBY::SET
                + PCM_CS::EN::SET,
        );

        spin.wait_until(|| pcm.cs.is_set(PCM_CS::SYNC))?;
        pcm.cs.modify(PCM_CS::SYNC::CLEAR);
        spin.wait_until(|| !pcm.cs.is_set(PCM_CS::SYNC))?;

        // Clock and frame sync now come from the master
        pcm.mode.modify(PCM_MODE::CLK_DIS::SET);
        pcm.mode.write(
            PCM_MODE::FLEN.val(7)
                + PCM_MODE::FSLEN.val(7)
                + PCM_MODE::CLKM::SET
                + PCM_MODE::FSM::SET
                + PCM_MODE::FSI::SET
                + PCM_MODE::CLK_DIS::SET,
        );

        memory_barrier();
        for pin in PINS {
            gpio.configure(pin, Function::Alt2)?;
        }
        memory_barrier();

        pcm.mode.modify(PCM_MODE::CLK_DIS::CLEAR);
        synchronization_barrier();

        info!("spi slave: PCM attached to GPIO {}..={}", PINS.start(), PINS.end());
        Ok(())
    }
}
