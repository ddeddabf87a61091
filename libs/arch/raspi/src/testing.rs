//! Stand-ins for the hardware used by the unit tests.

use std::{
    collections::{BTreeMap, VecDeque},
    ptr::{self, NonNull},
};

use crate::{
    concurrency::spinlock::Spinlock,
    memory::layout::PERIPHERALS_SIZE,
    peripherals::{
        mailbox::{MailboxPort, RESPONSE_SUCCESS},
        spisl::PcmPort,
        timer::Delay,
        Peripherals,
    },
    Result,
};

const WORDS: usize = PERIPHERALS_SIZE / 4;

/// Zeroed heap memory shaped like the peripheral block. Registers keep
/// whatever was last written; nothing reacts on its own.
pub struct HeapRegion {
    base: NonNull<u32>,
}

impl HeapRegion {
    pub fn new() -> Self {
        let words = vec![0u32; WORDS].into_boxed_slice();
        let base = NonNull::new(Box::into_raw(words).cast::<u32>()).unwrap();
        HeapRegion { base }
    }

    pub fn peripherals(&self) -> Peripherals {
        unsafe { Peripherals::from_ptr(self.base.cast()) }
    }

    pub fn read(&self, offset: usize) -> u32 {
        assert!(offset % 4 == 0 && offset < PERIPHERALS_SIZE);
        unsafe { self.base.as_ptr().add(offset / 4).read_volatile() }
    }

    pub fn write(&self, offset: usize, value: u32) {
        assert!(offset % 4 == 0 && offset < PERIPHERALS_SIZE);
        unsafe { self.base.as_ptr().add(offset / 4).write_volatile(value) }
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.base.as_ptr(),
                WORDS,
            )));
        }
    }
}

/// Records every delay instead of waiting.
#[derive(Default)]
pub struct FakeDelay {
    delays: Spinlock<Vec<u32>>,
}

impl FakeDelay {
    pub fn delays(&self) -> Vec<u32> {
        self.delays.lock().clone()
    }
}

impl Delay for FakeDelay {
    fn delay_ticks(&self, ticks: u32) {
        self.delays.lock().push(ticks);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClockState {
    state: u32,
    rate: u32,
}

#[derive(Default)]
struct MailboxState {
    buffers: Vec<usize>,
    replies: VecDeque<u32>,
    calls: Vec<(u32, Vec<u32>)>,
    clocks: BTreeMap<u32, ClockState>,
    foreign: Option<u32>,
    silent: bool,
    reads: usize,
}

/// Firmware that answers property calls the moment they are written.
///
/// Buffer addresses are replaced by small tokens so the simulation does not
/// depend on where the heap lives.
#[derive(Default)]
pub struct SimMailbox {
    state: Spinlock<MailboxState>,
}

pub const SIM_FIRMWARE_REVISION: u32 = 0x5f3e_2a10;

impl SimMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `word` ahead of every reply, as another channel's traffic would.
    pub fn with_foreign_word(self, word: u32) -> Self {
        self.state.lock().foreign = Some(word);
        self
    }

    /// Never answers.
    pub fn silent(self) -> Self {
        self.state.lock().silent = true;
        self
    }

    pub fn with_clock(self, clock: u32, on: bool, rate: u32) -> Self {
        self.with_clock_state(clock, u32::from(on), rate)
    }

    /// Raw state word: bit 0 is "on", bit 1 is "not present".
    pub fn with_clock_state(self, clock: u32, state: u32, rate: u32) -> Self {
        self.state.lock().clocks.insert(clock, ClockState { state, rate });
        self
    }

    /// Tag id and request values of every tag processed so far.
    pub fn calls(&self) -> Vec<(u32, Vec<u32>)> {
        self.state.lock().calls.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }

    fn process(state: &mut MailboxState, buffer: *mut u32) {
        unsafe {
            let mut index = 2;
            loop {
                let tag = buffer.add(index).read_volatile();
                if tag == 0 {
                    break;
                }
                let size = buffer.add(index + 1).read_volatile() as usize;
                let data = buffer.add(index + 3);
                let request: Vec<u32> = (0..size / 4).map(|i| data.add(i).read_volatile()).collect();

                let response: Vec<u32> = match tag {
                    0x0000_0001 => vec![SIM_FIRMWARE_REVISION],
                    0x0003_0001 => {
                        let clock = state.clocks.get(&request[0]).copied().unwrap_or_default();
                        vec![request[0], clock.state]
                    }
                    0x0003_0002 | 0x0003_0047 => {
                        let clock = state.clocks.get(&request[0]).copied().unwrap_or_default();
                        vec![request[0], clock.rate]
                    }
                    0x0003_8001 => {
                        let clock = state.clocks.entry(request[0]).or_default();
                        clock.state = request[1] & 1;
                        vec![request[0], clock.state]
                    }
                    0x0003_8002 => {
                        let clock = state.clocks.entry(request[0]).or_default();
                        clock.rate = request[1];
                        vec![request[0], clock.rate]
                    }
                    _ => Vec::new(),
                };
                state.calls.push((tag, request));

                for (i, word) in response.iter().enumerate() {
                    data.add(i).write_volatile(*word);
                }
                buffer
                    .add(index + 2)
                    .write_volatile(1 << 31 | (response.len() * 4) as u32);
                index += 3 + size / 4;
            }
            buffer.add(1).write_volatile(RESPONSE_SUCCESS);
        }
    }
}

impl MailboxPort for SimMailbox {
    fn is_full(&self) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        self.state.lock().replies.is_empty()
    }

    fn read(&self) -> u32 {
        let mut state = self.state.lock();
        state.reads += 1;
        state.replies.pop_front().unwrap_or(0)
    }

    fn write(&self, word: u32) {
        let mut state = self.state.lock();
        if state.silent {
            return;
        }
        let token = (word >> 4) as usize;
        let buffer = state.buffers[token - 1] as *mut u32;
        Self::process(&mut state, buffer);
        if let Some(foreign) = state.foreign {
            state.replies.push_back(foreign);
        }
        state.replies.push_back(word);
    }

    fn bus_address(&self, addr: usize) -> Result<u32> {
        assert_eq!(addr % 16, 0, "message buffer must be 16-byte aligned");
        let mut state = self.state.lock();
        state.buffers.push(addr);
        Ok((state.buffers.len() as u32) << 4)
    }
}

#[derive(Default)]
struct PcmState {
    stream: VecDeque<u8>,
    after_ack: Option<VecDeque<u8>>,
    idle: Option<u8>,
    hide_rx_once: bool,
    written: Vec<u8>,
    clock: Vec<bool>,
    reads: usize,
}

/// PCM receiver fed from a scripted byte stream.
///
/// With [`SimPcm::after_ack`], the first byte written switches the stream to
/// that script, after one poll that reports an empty FIFO. Without it, bytes
/// stay queued across writes.
#[derive(Default)]
pub struct SimPcm {
    state: Spinlock<PcmState>,
}

impl SimPcm {
    pub fn new(stream: impl IntoIterator<Item = u8>) -> Self {
        let pcm = Self::default();
        pcm.state.lock().stream = stream.into_iter().collect();
        pcm
    }

    pub fn after_ack(self, stream: impl IntoIterator<Item = u8>) -> Self {
        self.state.lock().after_ack = Some(stream.into_iter().collect());
        self
    }

    /// Byte received forever once the script runs out.
    pub fn idle(self, byte: u8) -> Self {
        self.state.lock().idle = Some(byte);
        self
    }

    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Every clock enable (true) and disable (false), in order.
    pub fn clock_changes(&self) -> Vec<bool> {
        self.state.lock().clock.clone()
    }
}

impl PcmPort for SimPcm {
    fn rx_ready(&self) -> bool {
        let mut state = self.state.lock();
        if state.hide_rx_once {
            state.hide_rx_once = false;
            return false;
        }
        !state.stream.is_empty() || state.idle.is_some()
    }

    fn tx_ready(&self) -> bool {
        true
    }

    fn tx_empty(&self) -> bool {
        true
    }

    fn read_fifo(&self) -> u8 {
        let mut state = self.state.lock();
        state.reads += 1;
        let idle = state.idle.unwrap_or(0);
        state.stream.pop_front().unwrap_or(idle)
    }

    fn write_fifo(&self, byte: u8) {
        let mut state = self.state.lock();
        state.written.push(byte);
        if let Some(after_ack) = state.after_ack.take() {
            state.stream = after_ack;
            state.hide_rx_once = true;
        }
    }

    fn set_clock_enabled(&self, enabled: bool) {
        self.state.lock().clock.push(enabled);
    }
}
