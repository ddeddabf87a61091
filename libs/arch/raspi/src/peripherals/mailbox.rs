//! Property calls to the VideoCore firmware through the ARM mailboxes.
//!
//! A call writes the bus address of a message buffer, tagged with a channel
//! number in the low 4 bits, to mailbox 1 and waits for mailbox 0 to echo the
//! same word back. The firmware overwrites the request values in place with
//! its response.

use core::{mem::size_of, ptr};

use bitfield::{Bit, BitRange, BitRangeMut};
use log::{debug, trace};
use tock_registers::interfaces::{Readable, Writeable};

use super::{registers::MBOX_STATUS, Peripherals};
use crate::{concurrency::barrier::memory_barrier, Error, Result, Spin};

pub const REQUEST: u32 = 0;
pub const RESPONSE_SUCCESS: u32 = 0x8000_0000;
pub const RESPONSE_ERROR: u32 = 0x8000_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Channel {
    PowerManagement = 0,
    Framebuffer = 1,
    VirtualUart = 2,
    Vchiq = 3,
    Leds = 4,
    Buttons = 5,
    TouchScreen = 6,
    /// Property tags, ARM to VideoCore.
    Property = 8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Tag {
    GetFirmwareRevision = 0x0000_0001,
    GetClockState = 0x0003_0001,
    GetClockRate = 0x0003_0002,
    GetClockRateMeasured = 0x0003_0047,
    SetClockState = 0x0003_8001,
    SetClockRate = 0x0003_8002,
}

/// Clocks known to the firmware's clock tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Clock {
    Reserved = 0,
    Emmc = 1,
    Uart = 2,
    Arm = 3,
    Core = 4,
    V3d = 5,
    H264 = 6,
    Isp = 7,
    Sdram = 8,
    Pixel = 9,
    Pwm = 10,
    Hevc = 11,
    Emmc2 = 12,
    M2mc = 13,
    PixelBvb = 14,
}

impl TryFrom<u32> for Clock {
    type Error = u32;

    fn try_from(id: u32) -> core::result::Result<Self, u32> {
        Ok(match id {
            0 => Clock::Reserved,
            1 => Clock::Emmc,
            2 => Clock::Uart,
            3 => Clock::Arm,
            4 => Clock::Core,
            5 => Clock::V3d,
            6 => Clock::H264,
            7 => Clock::Isp,
            8 => Clock::Sdram,
            9 => Clock::Pixel,
            10 => Clock::Pwm,
            11 => Clock::Hevc,
            12 => Clock::Emmc2,
            13 => Clock::M2mc,
            14 => Clock::PixelBvb,
            other => return Err(other),
        })
    }
}

/// Raw access to the two mailboxes.
pub trait MailboxPort {
    /// Mailbox 0 cannot take another word.
    fn is_full(&self) -> bool;
    /// Mailbox 0 holds no word for the ARM.
    fn is_empty(&self) -> bool;
    fn read(&self) -> u32;
    /// Writes to mailbox 1.
    fn write(&self, word: u32);
    /// Address the firmware uses to reach the buffer at `addr`.
    fn bus_address(&self, addr: usize) -> Result<u32>;
}

impl<P: MailboxPort + ?Sized> MailboxPort for &P {
    fn is_full(&self) -> bool {
        (**self).is_full()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn read(&self) -> u32 {
        (**self).read()
    }

    fn write(&self, word: u32) {
        (**self).write(word)
    }

    fn bus_address(&self, addr: usize) -> Result<u32> {
        (**self).bus_address(addr)
    }
}

impl MailboxPort for Peripherals {
    fn is_full(&self) -> bool {
        self.mailbox().status0.is_set(MBOX_STATUS::FULL)
    }

    fn is_empty(&self) -> bool {
        self.mailbox().status0.is_set(MBOX_STATUS::EMPTY)
    }

    fn read(&self) -> u32 {
        self.mailbox().read.get()
    }

    fn write(&self, word: u32) {
        self.mailbox().write.set(word)
    }

    /// Passes the buffer's virtual address through unchanged. This only
    /// reaches the firmware when the process's virtual addresses coincide with
    /// bus addresses, which ordinary Linux processes do not get: on 64-bit
    /// user space nearly every buffer fails with [`Error::BufferAddress`], and
    /// on 32-bit the firmware is handed a non-physical address.
    fn bus_address(&self, addr: usize) -> Result<u32> {
        u32::try_from(addr).map_err(|_| Error::BufferAddress(addr))
    }
}

/// Tag header. The status word holds the response length in bits 30..0 and
/// the response flag in bit 31.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TagHeader {
    pub id: u32,
    pub buffer_size: u32,
    status: u32,
}

impl TagHeader {
    pub fn request(tag: Tag, buffer_size: u32) -> Self {
        let mut status = 0u32;
        status.set_bit_range(30, 0, buffer_size);
        TagHeader {
            id: tag as u32,
            buffer_size,
            status,
        }
    }

    pub fn response_length(&self) -> u32 {
        self.status.bit_range(30, 0)
    }

    pub fn has_response(&self) -> bool {
        self.status.bit(31)
    }
}

/// One tag with `N` value words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Property<const N: usize> {
    pub tag: TagHeader,
    pub data: [u32; N],
}

impl<const N: usize> Property<N> {
    pub fn new(data: [u32; N]) -> Self {
        Property {
            tag: TagHeader::default(),
            data,
        }
    }
}

/// Message buffer: header, `body` (one or more tags), end tag.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(16))]
pub struct Message<T> {
    buffer_size: u32,
    pub code: u32,
    pub body: T,
    end: u32,
}

pub type PropertyMessage<const N: usize> = Message<Property<N>>;

impl<T> Message<T> {
    pub fn new(body: T) -> Self {
        Message {
            buffer_size: Self::BUFFER_SIZE,
            code: REQUEST,
            body,
            end: 0,
        }
    }

    /// Byte length rounded up to 16.
    const BUFFER_SIZE: u32 = size_of::<Self>() as u32;

    fn reset_header(&mut self) {
        self.buffer_size = Self::BUFFER_SIZE;
        self.code = REQUEST;
        self.end = 0;
    }
}

pub struct Mailbox<P> {
    port: P,
    budget: Spin,
}

impl<P: MailboxPort> Mailbox<P> {
    pub fn new(port: P) -> Self {
        Self::with_budget(port, Spin::forever())
    }

    /// Each operation fails with [`Error::Timeout`] once it has used up
    /// `budget`.
    pub fn with_budget(port: P, budget: Spin) -> Self {
        Mailbox { port, budget }
    }

    fn compose(channel: Channel, addr: u32) -> u32 {
        let mut word = addr;
        word.set_bit_range(3, 0, channel as u32);
        word
    }

    fn send_word(&self, spin: &mut Spin, word: u32) -> Result<()> {
        spin.wait_until(|| !self.port.is_full())?;
        self.port.write(word);
        memory_barrier();
        Ok(())
    }

    fn receive_word(&self, spin: &mut Spin) -> Result<u32> {
        memory_barrier();
        spin.wait_until(|| !self.port.is_empty())?;
        Ok(self.port.read())
    }

    /// Posts `addr` on `channel` without waiting for an answer.
    pub fn send(&self, channel: Channel, addr: u32) -> Result<()> {
        let mut spin = self.budget;
        self.send_word(&mut spin, Self::compose(channel, addr))
    }

    /// Next word from mailbox 0, whatever channel it belongs to.
    pub fn receive(&self) -> Result<u32> {
        let mut spin = self.budget;
        self.receive_word(&mut spin)
    }

    /// Sends `addr` on `channel` and waits for the firmware to echo it.
    /// Words for other requests are discarded.
    pub fn call(&self, channel: Channel, addr: u32) -> Result<()> {
        let mut spin = self.budget;
        let wanted = Self::compose(channel, addr);
        self.send_word(&mut spin, wanted)?;

        loop {
            let word = self.receive_word(&mut spin)?;
            if word == wanted {
                return Ok(());
            }
            trace!("mailbox: discarding {word:#010x} while waiting for {wanted:#010x}");
            spin.tick()?;
        }
    }

    fn call_message<T: Copy>(&self, message: &mut Message<T>) -> Result<()> {
        let buffer: *mut Message<T> = message;
        let addr = self.port.bus_address(buffer as usize)?;

        // The firmware reads and writes the buffer behind the compiler's back
        unsafe { ptr::write_volatile(buffer, *message) };
        self.call(Channel::Property, addr)?;
        *message = unsafe { ptr::read_volatile(buffer) };

        if message.code != RESPONSE_SUCCESS {
            debug!("mailbox: firmware answered with code {:#010x}", message.code);
        }
        Ok(())
    }

    /// Runs the single tag in `message` as `tag`. The response replaces
    /// `message.body.data`.
    pub fn property_call<const N: usize>(
        &self,
        tag: Tag,
        message: &mut PropertyMessage<N>,
    ) -> Result<()> {
        message.reset_header();
        message.body.tag = TagHeader::request(tag, (N * size_of::<u32>()) as u32);
        self.call_message(message)?;
        debug!(
            "mailbox: {tag:?} answered with {} bytes",
            message.body.tag.response_length()
        );
        Ok(())
    }

    /// Runs a message whose tags the caller laid out in `message.body`. Only
    /// the header is filled in here.
    pub fn property_call_multi<T: Copy>(&self, message: &mut Message<T>) -> Result<()> {
        message.reset_header();
        self.call_message(message)
    }

    /// Switches `clock` on, then sets its rate.
    pub fn set_clock_rate(&self, clock: Clock, rate: u32) -> Result<()> {
        let mut state = Message::new(Property::new([clock as u32, 1]));
        self.property_call(Tag::SetClockState, &mut state)?;

        let mut rate = Message::new(Property::new([clock as u32, rate, 0]));
        self.property_call(Tag::SetClockRate, &mut rate)
    }

    /// Rate of `clock` in Hz, or 0 if the clock is off.
    pub fn clock_rate(&self, clock: Clock) -> Result<u32> {
        let mut message = Message::new(Property::new([clock as u32, 0]));
        self.property_call(Tag::GetClockState, &mut message)?;
        if !message.body.data[1].bit(0) {
            return Ok(0);
        }

        message.body.data = [clock as u32, 0];
        self.property_call(Tag::GetClockRate, &mut message)?;
        Ok(message.body.data[1])
    }

    /// Rate the firmware actually measures on `clock`, in Hz.
    pub fn measured_clock_rate(&self, clock: Clock) -> Result<u32> {
        let mut message = Message::new(Property::new([clock as u32, 0]));
        self.property_call(Tag::GetClockRateMeasured, &mut message)?;
        Ok(message.body.data[1])
    }

    pub fn firmware_revision(&self) -> Result<u32> {
        let mut message = Message::new(Property::new([0]));
        self.property_call(Tag::GetFirmwareRevision, &mut message)?;
        Ok(message.body.data[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SimMailbox, SIM_FIRMWARE_REVISION};

    const SET_STATE: u32 = Tag::SetClockState as u32;
    const SET_RATE: u32 = Tag::SetClockRate as u32;

    #[test]
    fn message_sizes_round_up_to_16_bytes() {
        assert_eq!(PropertyMessage::<1>::BUFFER_SIZE, 32);
        assert_eq!(PropertyMessage::<2>::BUFFER_SIZE, 32);
        assert_eq!(PropertyMessage::<3>::BUFFER_SIZE, 48);
        assert_eq!(PropertyMessage::<6>::BUFFER_SIZE, 48);
        assert_eq!(PropertyMessage::<7>::BUFFER_SIZE, 64);
        assert_eq!(core::mem::align_of::<PropertyMessage<2>>(), 16);
    }

    #[test]
    fn channel_goes_in_the_low_nibble() {
        assert_eq!(
            Mailbox::<SimMailbox>::compose(Channel::Property, 0x3b40_0010),
            0x3b40_0018
        );
    }

    #[test]
    fn tag_header_views() {
        let header = TagHeader::request(Tag::GetClockRate, 8);
        assert_eq!(header.id, 0x0003_0002);
        assert_eq!(header.response_length(), 8);
        assert!(!header.has_response());
    }

    #[test]
    fn set_uart_clock_enables_then_sets_rate() {
        let sim = SimMailbox::new();
        let mailbox = Mailbox::new(&sim);

        mailbox.set_clock_rate(Clock::Uart, 3_000_000).unwrap();

        assert_eq!(
            sim.calls(),
            vec![
                (SET_STATE, vec![2, 1]),
                (SET_RATE, vec![2, 3_000_000, 0]),
            ]
        );
        assert_eq!(mailbox.clock_rate(Clock::Uart).unwrap(), 3_000_000);
    }

    #[test]
    fn stopped_clock_reports_zero_without_asking_for_the_rate() {
        let sim = SimMailbox::new().with_clock(Clock::Pwm as u32, false, 25_000_000);
        let mailbox = Mailbox::new(&sim);

        assert_eq!(mailbox.clock_rate(Clock::Pwm).unwrap(), 0);
        assert_eq!(sim.calls().len(), 1);
    }

    #[test]
    fn absent_clock_reports_zero() {
        // Bit 1 alone means "off, not present": still a zero rate
        let sim = SimMailbox::new().with_clock_state(Clock::Hevc as u32, 0b10, 500_000_000);
        let mailbox = Mailbox::new(&sim);

        assert_eq!(mailbox.clock_rate(Clock::Hevc).unwrap(), 0);
        assert_eq!(sim.calls().len(), 1);
    }

    #[test]
    fn running_clock_state_only_looks_at_bit_0() {
        let sim = SimMailbox::new().with_clock_state(Clock::Emmc as u32, 0b11, 200_000_000);
        let mailbox = Mailbox::new(&sim);

        assert_eq!(mailbox.clock_rate(Clock::Emmc).unwrap(), 200_000_000);
        assert_eq!(sim.calls().len(), 2);
    }

    #[test]
    fn response_overwrites_the_request_in_place() {
        let sim = SimMailbox::new().with_clock(Clock::Core as u32, true, 400_000_000);
        let mailbox = Mailbox::new(&sim);

        let mut message = Message::new(Property::new([Clock::Core as u32, 0]));
        mailbox
            .property_call(Tag::GetClockRateMeasured, &mut message)
            .unwrap();

        assert_eq!(message.code, RESPONSE_SUCCESS);
        assert!(message.body.tag.has_response());
        assert_eq!(message.body.tag.response_length(), 8);
        assert_eq!(message.body.data, [Clock::Core as u32, 400_000_000]);
        assert_eq!(mailbox.firmware_revision().unwrap(), SIM_FIRMWARE_REVISION);
    }

    #[test]
    fn multi_tag_messages_keep_the_callers_tags() {
        #[derive(Clone, Copy)]
        #[repr(C)]
        struct Both {
            arm: Property<2>,
            core: Property<2>,
        }

        let sim = SimMailbox::new()
            .with_clock(Clock::Arm as u32, true, 700_000_000)
            .with_clock(Clock::Core as u32, true, 250_000_000);
        let mailbox = Mailbox::new(&sim);

        let mut arm = Property::new([Clock::Arm as u32, 0]);
        arm.tag = TagHeader::request(Tag::GetClockRate, 8);
        let mut core_clock = Property::new([Clock::Core as u32, 0]);
        core_clock.tag = TagHeader::request(Tag::GetClockRate, 8);
        let mut message = Message::new(Both {
            arm,
            core: core_clock,
        });

        mailbox.property_call_multi(&mut message).unwrap();

        assert_eq!(message.body.arm.data[1], 700_000_000);
        assert_eq!(message.body.core.data[1], 250_000_000);
        assert_eq!(sim.calls().len(), 2);
    }

    #[test]
    fn foreign_words_are_skipped() {
        let sim = SimMailbox::new().with_foreign_word(0x1234_5671);
        let mailbox = Mailbox::new(&sim);

        mailbox.firmware_revision().unwrap();
        // one foreign word, then the echo
        assert_eq!(sim.reads(), 2);
    }

    #[test]
    fn receive_returns_words_in_order() {
        let sim = SimMailbox::new().with_foreign_word(0xdead_bee1);
        let mut buffer = Message::new(Property::new([0u32]));
        let addr = sim.bus_address(&mut buffer as *mut _ as usize).unwrap();
        let mailbox = Mailbox::new(&sim);

        mailbox.send(Channel::Property, addr).unwrap();
        assert_eq!(mailbox.receive().unwrap(), 0xdead_bee1);
        assert_eq!(mailbox.receive().unwrap(), addr | 8);
    }

    #[test]
    fn silent_firmware_times_out_under_a_budget() {
        let sim = SimMailbox::new().silent();
        let mailbox = Mailbox::with_budget(&sim, Spin::bounded(1000));

        assert!(matches!(
            mailbox.clock_rate(Clock::Arm),
            Err(Error::Timeout)
        ));
    }

    #[test]
    fn buffers_above_4_gib_are_rejected() {
        let region = crate::testing::HeapRegion::new();
        let hw = region.peripherals();
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            hw.bus_address(0x1_0000_0000),
            Err(Error::BufferAddress(0x1_0000_0000))
        ));
        assert_eq!(hw.bus_address(0x3b40_0000).unwrap(), 0x3b40_0000);
    }
}
