//! Register blocks of the peripherals this crate drives.
//!
//! Each struct overlays one sub-region of [`crate::memory::layout::LAYOUT`]
//! and every bitfield names the fields of one 32-bit register. Reads and
//! writes go straight to the mapped hardware.

#![allow(non_snake_case)]

use tock_registers::{
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite, WriteOnly},
};

/// Password the clock manager expects in the top byte of every write.
pub const CM_PASSWD: u32 = 0x5a;

register_bitfields! [u32,
    pub ST_CS [
        M0 OFFSET(0) NUMBITS(1) [],
        M1 OFFSET(1) NUMBITS(1) [],
        M2 OFFSET(2) NUMBITS(1) [],
        M3 OFFSET(3) NUMBITS(1) []
    ],

    pub CM_CTL [
        SRC OFFSET(0) NUMBITS(4) [
            Gnd = 0,
            Oscillator = 1,
            PllA = 4,
            PllC = 5,
            PllD = 6,
            Hdmi = 7
        ],
        ENAB OFFSET(4) NUMBITS(1) [],
        KILL OFFSET(5) NUMBITS(1) [],
        BUSY OFFSET(7) NUMBITS(1) [],
        FLIP OFFSET(8) NUMBITS(1) [],
        MASH OFFSET(9) NUMBITS(2) [],
        PASSWD OFFSET(24) NUMBITS(8) [
            Passwd = 0x5a
        ]
    ],

    pub CM_DIV [
        DIVF OFFSET(0) NUMBITS(12) [],
        DIVI OFFSET(12) NUMBITS(12) [],
        PASSWD OFFSET(24) NUMBITS(8) [
            Passwd = 0x5a
        ]
    ],

    pub GPIO_PUD [
        PUD OFFSET(0) NUMBITS(2) [
            Off = 0,
            Down = 1,
            Up = 2
        ]
    ],

    pub PCM_CS [
        EN OFFSET(0) NUMBITS(1) [],
        RXON OFFSET(1) NUMBITS(1) [],
        TXON OFFSET(2) NUMBITS(1) [],
        TXCLR OFFSET(3) NUMBITS(1) [],
        RXCLR OFFSET(4) NUMBITS(1) [],
        TXTHR OFFSET(5) NUMBITS(2) [],
        RXTHR OFFSET(7) NUMBITS(2) [],
        DMAEN OFFSET(9) NUMBITS(1) [],
        TXSYNC OFFSET(13) NUMBITS(1) [],
        RXSYNC OFFSET(14) NUMBITS(1) [],
        TXERR OFFSET(15) NUMBITS(1) [],
        RXERR OFFSET(16) NUMBITS(1) [],
        TXW OFFSET(17) NUMBITS(1) [],
        RXR OFFSET(18) NUMBITS(1) [],
        TXD OFFSET(19) NUMBITS(1) [],
        RXD OFFSET(20) NUMBITS(1) [],
        TXE OFFSET(21) NUMBITS(1) [],
        RXF OFFSET(22) NUMBITS(1) [],
        RXSEX OFFSET(23) NUMBITS(1) [],
        SYNC OFFSET(24) NUMBITS(1) [],
        STBY OFFSET(25) NUMBITS(1) []
    ],

    pub PCM_MODE [
        FSLEN OFFSET(0) NUMBITS(10) [],
        FLEN OFFSET(10) NUMBITS(10) [],
        FSI OFFSET(20) NUMBITS(1) [],
        FSM OFFSET(21) NUMBITS(1) [],
        CLKI OFFSET(22) NUMBITS(1) [],
        CLKM OFFSET(23) NUMBITS(1) [],
        FTXP OFFSET(24) NUMBITS(1) [],
        FRXP OFFSET(25) NUMBITS(1) [],
        PDME OFFSET(26) NUMBITS(1) [],
        PDMN OFFSET(27) NUMBITS(1) [],
        CLK_DIS OFFSET(28) NUMBITS(1) []
    ],

    /// Shared by the RXC and TXC registers.
    pub PCM_CHANNEL [
        CH2WID OFFSET(0) NUMBITS(4) [],
        CH2POS OFFSET(4) NUMBITS(10) [],
        CH2EN OFFSET(14) NUMBITS(1) [],
        CH2WEX OFFSET(15) NUMBITS(1) [],
        CH1WID OFFSET(16) NUMBITS(4) [],
        CH1POS OFFSET(20) NUMBITS(10) [],
        CH1EN OFFSET(30) NUMBITS(1) [],
        CH1WEX OFFSET(31) NUMBITS(1) []
    ],

    pub PCM_DREQ [
        RX OFFSET(0) NUMBITS(7) [],
        TX OFFSET(8) NUMBITS(7) [],
        RX_PANIC OFFSET(16) NUMBITS(7) [],
        TX_PANIC OFFSET(24) NUMBITS(7) []
    ],

    /// Shared by the INTEN and INTSTC registers.
    pub PCM_INT [
        TXW OFFSET(0) NUMBITS(1) [],
        RXR OFFSET(1) NUMBITS(1) [],
        TXERR OFFSET(2) NUMBITS(1) [],
        RXERR OFFSET(3) NUMBITS(1) []
    ],

    pub PCM_GRAY [
        EN OFFSET(0) NUMBITS(1) [],
        CLR OFFSET(1) NUMBITS(1) [],
        FLUSH OFFSET(2) NUMBITS(1) [],
        RXLEVEL OFFSET(4) NUMBITS(6) [],
        FLUSHED OFFSET(10) NUMBITS(6) [],
        RXFIFOLEVEL OFFSET(16) NUMBITS(6) []
    ],

    pub MBOX_STATUS [
        EMPTY OFFSET(30) NUMBITS(1) [],
        FULL OFFSET(31) NUMBITS(1) []
    ],

    pub UART0_DR [
        DATA OFFSET(0) NUMBITS(8) [],
        FE OFFSET(8) NUMBITS(1) [],
        PE OFFSET(9) NUMBITS(1) [],
        BE OFFSET(10) NUMBITS(1) [],
        OE OFFSET(11) NUMBITS(1) []
    ],

    pub UART0_FR [
        CTS OFFSET(0) NUMBITS(1) [],
        DSR OFFSET(1) NUMBITS(1) [],
        DCD OFFSET(2) NUMBITS(1) [],
        BUSY OFFSET(3) NUMBITS(1) [],
        RXFE OFFSET(4) NUMBITS(1) [],
        TXFF OFFSET(5) NUMBITS(1) [],
        RXFF OFFSET(6) NUMBITS(1) [],
        TXFE OFFSET(7) NUMBITS(1) [],
        RI OFFSET(8) NUMBITS(1) []
    ],

    pub UART0_IBRD [
        IBRD OFFSET(0) NUMBITS(16) []
    ],

    pub UART0_FBRD [
        FBRD OFFSET(0) NUMBITS(6) []
    ],

    pub UART0_LCRH [
        BRK OFFSET(0) NUMBITS(1) [],
        PEN OFFSET(1) NUMBITS(1) [],
        EPS OFFSET(2) NUMBITS(1) [],
        STP2 OFFSET(3) NUMBITS(1) [],
        FEN OFFSET(4) NUMBITS(1) [],
        WLEN OFFSET(5) NUMBITS(2) [
            FiveBit = 0,
            SixBit = 1,
            SevenBit = 2,
            EightBit = 3
        ],
        SPS OFFSET(7) NUMBITS(1) []
    ],

    pub UART0_CR [
        UARTEN OFFSET(0) NUMBITS(1) [],
        SIREN OFFSET(1) NUMBITS(1) [],
        SIRLP OFFSET(2) NUMBITS(1) [],
        LBE OFFSET(7) NUMBITS(1) [],
        TXE OFFSET(8) NUMBITS(1) [],
        RXE OFFSET(9) NUMBITS(1) [],
        DTR OFFSET(10) NUMBITS(1) [],
        RTS OFFSET(11) NUMBITS(1) [],
        OUT1 OFFSET(12) NUMBITS(1) [],
        OUT2 OFFSET(13) NUMBITS(1) [],
        RTSEN OFFSET(14) NUMBITS(1) [],
        CTSEN OFFSET(15) NUMBITS(1) []
    ],

    pub SPI0_CS [
        CS OFFSET(0) NUMBITS(2) [],
        CPHA OFFSET(2) NUMBITS(1) [],
        CPOL OFFSET(3) NUMBITS(1) [],
        CLEAR OFFSET(4) NUMBITS(2) [
            Keep = 0,
            Tx = 1,
            Rx = 2,
            Both = 3
        ],
        CSPOL OFFSET(6) NUMBITS(1) [],
        TA OFFSET(7) NUMBITS(1) [],
        DMAEN OFFSET(8) NUMBITS(1) [],
        INTD OFFSET(9) NUMBITS(1) [],
        INTR OFFSET(10) NUMBITS(1) [],
        ADCS OFFSET(11) NUMBITS(1) [],
        REN OFFSET(12) NUMBITS(1) [],
        LEN OFFSET(13) NUMBITS(1) [],
        LMONO OFFSET(14) NUMBITS(1) [],
        TE_EN OFFSET(15) NUMBITS(1) [],
        DONE OFFSET(16) NUMBITS(1) [],
        RXD OFFSET(17) NUMBITS(1) [],
        TXD OFFSET(18) NUMBITS(1) [],
        RXR OFFSET(19) NUMBITS(1) [],
        RXF OFFSET(20) NUMBITS(1) [],
        CSPOL0 OFFSET(21) NUMBITS(1) [],
        CSPOL1 OFFSET(22) NUMBITS(1) [],
        CSPOL2 OFFSET(23) NUMBITS(1) [],
        DMA_LEN OFFSET(24) NUMBITS(1) [],
        LEN_LONG OFFSET(25) NUMBITS(1) []
    ],

    pub SPI0_CLK [
        CDIV OFFSET(0) NUMBITS(16) []
    ],

    /// Shared by the AUX IRQ and ENABLES registers.
    pub AUX_DEVICES [
        MINI_UART OFFSET(0) NUMBITS(1) [],
        SPI1 OFFSET(1) NUMBITS(1) [],
        SPI2 OFFSET(2) NUMBITS(1) []
    ],

    pub MU_IO [
        DATA OFFSET(0) NUMBITS(8) []
    ],

    pub MU_IER [
        RX OFFSET(0) NUMBITS(1) [],
        TX OFFSET(1) NUMBITS(1) []
    ],

    /// Writes clear the FIFOs, reads report the pending interrupt.
    pub MU_IIR [
        PENDING OFFSET(0) NUMBITS(1) [],
        FIFO OFFSET(1) NUMBITS(2) [
            Keep = 0,
            ClearRx = 1,
            ClearTx = 2,
            ClearBoth = 3
        ]
    ],

    pub MU_LCR [
        DATA_SIZE OFFSET(0) NUMBITS(2) [
            SevenBit = 0,
            EightBit = 3
        ],
        BREAK OFFSET(6) NUMBITS(1) [],
        DLAB OFFSET(7) NUMBITS(1) []
    ],

    pub MU_CNTL [
        RX_ENABLE OFFSET(0) NUMBITS(1) [],
        TX_ENABLE OFFSET(1) NUMBITS(1) [],
        RTS_AUTO OFFSET(2) NUMBITS(1) [],
        CTS_AUTO OFFSET(3) NUMBITS(1) []
    ],

    pub MU_STAT [
        RX_READY OFFSET(0) NUMBITS(1) [],
        TX_READY OFFSET(1) NUMBITS(1) [],
        RX_IDLE OFFSET(2) NUMBITS(1) [],
        TX_IDLE OFFSET(3) NUMBITS(1) [],
        RX_OVERRUN OFFSET(4) NUMBITS(1) [],
        TX_FULL OFFSET(5) NUMBITS(1) [],
        TX_EMPTY OFFSET(8) NUMBITS(1) [],
        TX_DONE OFFSET(9) NUMBITS(1) [],
        RX_LEVEL OFFSET(16) NUMBITS(4) [],
        TX_LEVEL OFFSET(24) NUMBITS(4) []
    ],

    pub MU_BAUD [
        BAUD OFFSET(0) NUMBITS(16) []
    ]
];

register_structs! {
    pub SystemTimerRegisters {
        (0x00 => pub cs: ReadWrite<u32, ST_CS::Register>),
        (0x04 => pub clo: ReadOnly<u32>),
        (0x08 => pub chi: ReadOnly<u32>),
        (0x0c => pub compare: [ReadWrite<u32>; 4]),
        (0x1c => @END),
    },

    pub ClockManagerRegisters {
        (0x00 => pub ctl: ReadWrite<u32, CM_CTL::Register>),
        (0x04 => pub div: ReadWrite<u32, CM_DIV::Register>),
        (0x08 => @END),
    },

    pub GpioRegisters {
        (0x00 => pub fsel: [ReadWrite<u32>; 6]),
        (0x18 => _reserved0),
        (0x1c => pub set: [WriteOnly<u32>; 2]),
        (0x24 => _reserved1),
        (0x28 => pub clr: [WriteOnly<u32>; 2]),
        (0x30 => _reserved2),
        (0x34 => pub lev: [ReadOnly<u32>; 2]),
        (0x3c => _reserved3),
        (0x40 => pub eds: [ReadWrite<u32>; 2]),
        (0x48 => _reserved4),
        (0x4c => pub ren: [ReadWrite<u32>; 2]),
        (0x54 => _reserved5),
        (0x58 => pub fen: [ReadWrite<u32>; 2]),
        (0x60 => _reserved6),
        (0x64 => pub hen: [ReadWrite<u32>; 2]),
        (0x6c => _reserved7),
        (0x70 => pub len: [ReadWrite<u32>; 2]),
        (0x78 => _reserved8),
        (0x7c => pub aren: [ReadWrite<u32>; 2]),
        (0x84 => _reserved9),
        (0x88 => pub afen: [ReadWrite<u32>; 2]),
        (0x90 => _reserved10),
        (0x94 => pub pud: ReadWrite<u32, GPIO_PUD::Register>),
        (0x98 => pub pudclk: [ReadWrite<u32>; 2]),
        (0xa0 => _reserved11),
        (0xb0 => pub test: ReadWrite<u32>),
        (0xb4 => @END),
    },

    pub PcmRegisters {
        (0x00 => pub cs: ReadWrite<u32, PCM_CS::Register>),
        (0x04 => pub fifo: ReadWrite<u32>),
        (0x08 => pub mode: ReadWrite<u32, PCM_MODE::Register>),
        (0x0c => pub rxc: ReadWrite<u32, PCM_CHANNEL::Register>),
        (0x10 => pub txc: ReadWrite<u32, PCM_CHANNEL::Register>),
        (0x14 => pub dreq: ReadWrite<u32, PCM_DREQ::Register>),
        (0x18 => pub inten: ReadWrite<u32, PCM_INT::Register>),
        (0x1c => pub intstc: ReadWrite<u32, PCM_INT::Register>),
        (0x20 => pub gray: ReadWrite<u32, PCM_GRAY::Register>),
        (0x24 => @END),
    },

    /// Mailbox 0 carries firmware to ARM traffic, mailbox 1 the other way.
    pub MailboxRegisters {
        (0x00 => pub read: ReadOnly<u32>),
        (0x04 => _reserved0),
        (0x10 => pub peek0: ReadOnly<u32>),
        (0x14 => pub sender0: ReadOnly<u32>),
        (0x18 => pub status0: ReadOnly<u32, MBOX_STATUS::Register>),
        (0x1c => pub config0: ReadWrite<u32>),
        (0x20 => pub write: WriteOnly<u32>),
        (0x24 => _reserved1),
        (0x30 => pub peek1: ReadOnly<u32>),
        (0x34 => pub sender1: ReadOnly<u32>),
        (0x38 => pub status1: ReadOnly<u32, MBOX_STATUS::Register>),
        (0x3c => pub config1: ReadWrite<u32>),
        (0x40 => @END),
    },

    pub Uart0Registers {
        (0x00 => pub dr: ReadWrite<u32, UART0_DR::Register>),
        (0x04 => pub rsrecr: ReadWrite<u32>),
        (0x08 => _reserved0),
        (0x18 => pub fr: ReadOnly<u32, UART0_FR::Register>),
        (0x1c => _reserved1),
        (0x20 => pub ilpr: ReadWrite<u32>),
        (0x24 => pub ibrd: ReadWrite<u32, UART0_IBRD::Register>),
        (0x28 => pub fbrd: ReadWrite<u32, UART0_FBRD::Register>),
        (0x2c => pub lcrh: ReadWrite<u32, UART0_LCRH::Register>),
        (0x30 => pub cr: ReadWrite<u32, UART0_CR::Register>),
        (0x34 => pub ifls: ReadWrite<u32>),
        (0x38 => pub imsc: ReadWrite<u32>),
        (0x3c => pub ris: ReadOnly<u32>),
        (0x40 => pub mis: ReadOnly<u32>),
        (0x44 => pub icr: WriteOnly<u32>),
        (0x48 => pub dmacr: ReadWrite<u32>),
        (0x4c => _reserved2),
        (0x80 => pub itcr: ReadWrite<u32>),
        (0x84 => pub itip: ReadWrite<u32>),
        (0x88 => pub itop: ReadWrite<u32>),
        (0x8c => pub tdr: ReadWrite<u32>),
        (0x90 => @END),
    },

    pub Spi0Registers {
        (0x00 => pub cs: ReadWrite<u32, SPI0_CS::Register>),
        (0x04 => pub fifo: ReadWrite<u32>),
        (0x08 => pub clk: ReadWrite<u32, SPI0_CLK::Register>),
        (0x0c => pub dlen: ReadWrite<u32>),
        (0x10 => pub ltoh: ReadWrite<u32>),
        (0x14 => pub dc: ReadWrite<u32>),
        (0x18 => @END),
    },

    pub AuxRegisters {
        (0x00 => pub irq: ReadWrite<u32, AUX_DEVICES::Register>),
        (0x04 => pub enables: ReadWrite<u32, AUX_DEVICES::Register>),
        (0x08 => @END),
    },

    /// Mini UART, the AUX_MU_* registers.
    pub Uart1Registers {
        (0x00 => pub io: ReadWrite<u32, MU_IO::Register>),
        (0x04 => pub ier: ReadWrite<u32, MU_IER::Register>),
        (0x08 => pub iir: ReadWrite<u32, MU_IIR::Register>),
        (0x0c => pub lcr: ReadWrite<u32, MU_LCR::Register>),
        (0x10 => pub mcr: ReadWrite<u32>),
        (0x14 => pub lsr: ReadOnly<u32>),
        (0x18 => pub msr: ReadOnly<u32>),
        (0x1c => pub scratch: ReadWrite<u32>),
        (0x20 => pub cntl: ReadWrite<u32, MU_CNTL::Register>),
        (0x24 => pub stat: ReadOnly<u32, MU_STAT::Register>),
        (0x28 => pub baud: ReadWrite<u32, MU_BAUD::Register>),
        (0x2c => @END),
    }
}

/// Clock manager entries, indexing the CTL/DIV pairs at the start of the CM
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ClockManager {
    Vpu = 1,
    H264 = 5,
    V3d = 7,
    Cam0Lp = 8,
    DsiEsc = 11,
    Dpi = 13,
    Gp0 = 14,
    Gp1 = 15,
    Gp2 = 16,
    Hsm = 17,
    Isp = 18,
    Pcm = 19,
    Pwm = 20,
    Slim = 21,
    Smi = 22,
    Emmc = 24,
    Tsens = 28,
    Time = 29,
    Uart = 30,
    Vec = 31,
    Arm = 54,
}

impl ClockManager {
    pub const fn offset(self) -> usize {
        self as usize * core::mem::size_of::<ClockManagerRegisters>()
    }
}

#[cfg(test)]
mod tests {
    use core::mem::size_of;

    use tock_registers::LocalRegisterCopy;

    use super::*;
    use crate::memory::layout::{self, CM_ENTRIES, CM_OFFSET, GPCLK_OFFSET};

    fn layout_size(name: &str) -> usize {
        layout::find(name).unwrap().size
    }

    #[test]
    fn blocks_match_layout_table() {
        assert_eq!(size_of::<SystemTimerRegisters>(), layout_size("ST"));
        assert_eq!(size_of::<GpioRegisters>(), layout_size("GPIO"));
        assert_eq!(size_of::<PcmRegisters>(), layout_size("PCM"));
        assert_eq!(size_of::<MailboxRegisters>(), layout_size("MBOX"));
        assert_eq!(size_of::<Uart0Registers>(), layout_size("UART0"));
        assert_eq!(size_of::<Spi0Registers>(), layout_size("SPI0"));
        assert_eq!(size_of::<AuxRegisters>(), layout_size("AUX"));
        assert_eq!(size_of::<Uart1Registers>(), layout_size("UART1"));
        assert_eq!(
            CM_ENTRIES * size_of::<ClockManagerRegisters>(),
            layout_size("CM")
        );
    }

    #[test]
    fn clock_manager_indices() {
        assert_eq!(ClockManager::Pcm.offset(), 0x98);
        assert_eq!(CM_OFFSET + ClockManager::Gp0.offset(), GPCLK_OFFSET);
        assert!(ClockManager::Arm.offset() < layout_size("CM"));
    }

    #[test]
    fn pcm_status_fields_are_isolated() {
        let mut cs = LocalRegisterCopy::<u32, PCM_CS::Register>::new(0);
        cs.modify(PCM_CS::SYNC::SET + PCM_CS::EN::SET);
        assert_eq!(cs.get(), 1 << 24 | 1);

        cs.modify(PCM_CS::RXTHR.val(3));
        assert_eq!(cs.get(), 1 << 24 | 0b11 << 7 | 1);
        assert!(cs.is_set(PCM_CS::SYNC));
        assert!(!cs.is_set(PCM_CS::STBY));

        cs.modify(PCM_CS::SYNC::CLEAR);
        assert_eq!(cs.get(), 0b11 << 7 | 1);
    }

    #[test]
    fn whole_word_and_field_views_agree() {
        let mode = LocalRegisterCopy::<u32, PCM_MODE::Register>::new(0x1000_1c07);
        assert_eq!(mode.read(PCM_MODE::FSLEN), 7);
        assert_eq!(mode.read(PCM_MODE::FLEN), 7);
        assert!(mode.is_set(PCM_MODE::CLK_DIS));
        assert!(!mode.is_set(PCM_MODE::CLKM));
    }

    #[test]
    fn channel_one_fields() {
        let mut rxc = LocalRegisterCopy::<u32, PCM_CHANNEL::Register>::new(0xffff);
        rxc.modify(PCM_CHANNEL::CH1EN::SET + PCM_CHANNEL::CH1WID.val(0));
        assert_eq!(rxc.get(), 0x4000_ffff);
        assert_eq!(rxc.read(PCM_CHANNEL::CH2POS), 0x3ff);
    }

    #[test]
    fn clock_manager_words_carry_the_password() {
        let mut ctl = LocalRegisterCopy::<u32, CM_CTL::Register>::new(0);
        ctl.write(
            CM_CTL::PASSWD::Passwd + CM_CTL::SRC::Oscillator + CM_CTL::MASH.val(1) + CM_CTL::ENAB::SET,
        );
        assert_eq!(ctl.get(), CM_PASSWD << 24 | 1 << 9 | 1 << 4 | 1);

        let mut div = LocalRegisterCopy::<u32, CM_DIV::Register>::new(0);
        div.write(CM_DIV::PASSWD::Passwd + CM_DIV::DIVI.val(250));
        assert_eq!(div.get(), 0x5a0f_a000);
    }

    #[test]
    fn mailbox_status_flags() {
        let status = LocalRegisterCopy::<u32, MBOX_STATUS::Register>::new(0x4000_0000);
        assert!(status.is_set(MBOX_STATUS::EMPTY));
        assert!(!status.is_set(MBOX_STATUS::FULL));
    }

    #[test]
    fn spi_clear_values() {
        let mut cs = LocalRegisterCopy::<u32, SPI0_CS::Register>::new(0);
        cs.modify(SPI0_CS::CS.val(1) + SPI0_CS::CLEAR::Rx + SPI0_CS::TA::SET);
        assert_eq!(cs.get(), 1 | 2 << 4 | 1 << 7);
    }
}
