//! SD card in SPI mode.
//!
//! Power-up follows the SPI-mode initialization flow: `CMD0` to enter idle,
//! `CMD8` to check the interface condition, `ACMD41` until the card leaves
//! idle, then `CMD58` to learn whether blocks are addressed by index (SDHC)
//! or by byte offset. Transfers use single-block `CMD17`/`CMD24`. Every
//! command sequence holds the chip select for its whole duration through
//! `cs_control`, so the card must use a software chip select.

use std::ops::RangeInclusive;

use tracing::{debug, trace};

use idhal_core::config::SDCARD_MAX_ID;
use idhal_core::{HalError, Level, Result};
use idhal_drivers::spi::ChipSelect;
use idhal_drivers::{SpiDriver, SpiTransport};

use crate::table::{self, DeviceTable};
use crate::traits::{SpiAttachment, StorageDevice, StorageSpecs};

pub const SD_BLOCK_SIZE: usize = 512;

const GO_IDLE_STATE: u8 = 0;
const SEND_IF_COND: u8 = 8;
const SET_BLOCKLEN: u8 = 16;
const READ_SINGLE_BLOCK: u8 = 17;
const WRITE_BLOCK: u8 = 24;
const SD_SEND_OP_COND: u8 = 41;
const APP_CMD: u8 = 55;
const READ_OCR: u8 = 58;

const R1_READY: u8 = 0x00;
const R1_IDLE: u8 = 0x01;
const R1_ILLEGAL_COMMAND: u8 = 0x04;
const DATA_TOKEN: u8 = 0xFE;
const DATA_ACCEPTED: u8 = 0x05;

/// 2.7-3.6 V with check pattern 0xAA.
const IF_COND_ARGUMENT: u32 = 0x1AA;
/// Host supports high capacity cards.
const HCS: u32 = 0x4000_0000;
/// Card capacity status bit in the first OCR byte.
const OCR_CCS: u8 = 0x40;

/// Bytes polled for an R1 response.
const RESPONSE_POLLS: usize = 8;
/// `ACMD41` attempts before giving up on a card stuck in idle.
const OP_COND_ATTEMPTS: usize = 100;
/// Bytes polled for a data token or for the end of a write.
const BUSY_POLLS: usize = 4096;

const SPECS: StorageSpecs = StorageSpecs {
    block_size: SD_BLOCK_SIZE as u16,
    max_clock_hz: 25_000_000,
};

/// What `ext_hw_config` learned about the card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardInfo {
    /// Blocks are addressed by index rather than byte offset.
    pub high_capacity: bool,
    /// Chip-select level that selects the card.
    pub select: Level,
}

/// SD card driver with its own device table.
#[derive(Debug)]
pub struct SdCard<const N: usize = SDCARD_MAX_ID> {
    devices: DeviceTable<table::Storage, CardInfo, N>,
}

impl<const N: usize> SdCard<N> {
    pub fn new() -> Self {
        Self {
            devices: DeviceTable::new(),
        }
    }

    /// Card details of a ready ID.
    pub fn info(&mut self, id: u8) -> Result<CardInfo> {
        let (_, info) = self.devices.ready(id)?;
        Ok(*info)
    }
}

impl<const N: usize> Default for SdCard<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Command framing over one selected SPI ID.
struct Session<'a, T, const M: usize> {
    bus: &'a mut SpiDriver<T, M>,
    bus_id: u8,
}

impl<T: SpiTransport, const M: usize> Session<'_, T, M> {
    /// Run `f` with the card selected, releasing the chip select on every path.
    fn selected<R>(
        bus: &mut SpiDriver<T, M>,
        bus_id: u8,
        select: Level,
        f: impl FnOnce(&mut Session<'_, T, M>) -> Result<R>,
    ) -> Result<R> {
        bus.cs_control(bus_id, true, select)?;
        let result = f(&mut Session {
            bus: &mut *bus,
            bus_id,
        });
        // The release level comes from the chip select's polarity.
        bus.cs_control(bus_id, false, select)?;
        result
    }

    fn byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.bus.read(self.bus_id, &mut byte)?;
        Ok(byte[0])
    }

    /// Send a command frame and return its R1 response.
    fn command(&mut self, index: u8, argument: u32) -> Result<u8> {
        let crc = match index {
            GO_IDLE_STATE => 0x95,
            SEND_IF_COND => 0x87,
            _ => 0x01,
        };
        let [a, b, c, d] = argument.to_be_bytes();
        self.bus
            .send(self.bus_id, &[0x40 | index, a, b, c, d, crc])?;

        for _ in 0..RESPONSE_POLLS {
            let r1 = self.byte()?;
            if r1 & 0x80 == 0 {
                trace!(index, argument, r1, "SD command");
                return Ok(r1);
            }
        }
        Err(HalError::hardware_fault(format!(
            "no response to CMD{index}"
        )))
    }

    fn app_command(&mut self, index: u8, argument: u32) -> Result<u8> {
        self.command(APP_CMD, 0)?;
        self.command(index, argument)
    }

    fn trailer(&mut self) -> Result<[u8; 4]> {
        let mut trailer = [0u8; 4];
        self.bus.read(self.bus_id, &mut trailer)?;
        Ok(trailer)
    }

    /// Poll until the card sends something other than `idle`.
    fn wait_while(&mut self, idle: u8) -> Result<u8> {
        for _ in 0..BUSY_POLLS {
            let byte = self.byte()?;
            if byte != idle {
                return Ok(byte);
            }
        }
        Err(HalError::hardware_fault("SD card stayed busy"))
    }
}

fn expect_ready(index: u8, r1: u8) -> Result<()> {
    if r1 != R1_READY {
        return Err(HalError::hardware_fault(format!(
            "CMD{index} answered R1 0x{r1:02X}"
        )));
    }
    Ok(())
}

fn power_up<T: SpiTransport, const M: usize>(
    session: &mut Session<'_, T, M>,
    select: Level,
) -> Result<CardInfo> {
    let r1 = session.command(GO_IDLE_STATE, 0)?;
    if r1 != R1_IDLE {
        return Err(HalError::hardware_fault(format!(
            "card did not enter idle (R1 0x{r1:02X})"
        )));
    }

    let r1 = session.command(SEND_IF_COND, IF_COND_ARGUMENT)?;
    if r1 & R1_ILLEGAL_COMMAND != 0 {
        return Err(HalError::unsupported("SD version 1 cards"));
    }
    let echo = session.trailer()?;
    if echo[3] != 0xAA {
        return Err(HalError::hardware_fault(format!(
            "CMD8 check pattern came back as 0x{:02X}",
            echo[3]
        )));
    }

    let mut attempts = 0;
    while session.app_command(SD_SEND_OP_COND, HCS)? != R1_READY {
        attempts += 1;
        if attempts == OP_COND_ATTEMPTS {
            return Err(HalError::hardware_fault(format!(
                "card still idle after {OP_COND_ATTEMPTS} ACMD41"
            )));
        }
    }

    expect_ready(READ_OCR, session.command(READ_OCR, 0)?)?;
    let ocr = session.trailer()?;
    let high_capacity = ocr[0] & OCR_CCS != 0;
    if !high_capacity {
        expect_ready(SET_BLOCKLEN, session.command(SET_BLOCKLEN, SD_BLOCK_SIZE as u32)?)?;
    }

    Ok(CardInfo {
        high_capacity,
        select,
    })
}

fn check_blocks(len: usize) -> Result<usize> {
    if len == 0 || len % SD_BLOCK_SIZE != 0 {
        return Err(HalError::invalid_parameter(format!(
            "{len} bytes is not a whole number of {SD_BLOCK_SIZE}-byte blocks"
        )));
    }
    Ok(len / SD_BLOCK_SIZE)
}

/// Block numbers covered by `len` bytes starting at `block`.
fn block_range(block: u32, len: usize) -> Result<RangeInclusive<u32>> {
    let count = check_blocks(len)?;
    u32::try_from(count - 1)
        .ok()
        .and_then(|extra| block.checked_add(extra))
        .map(|last| block..=last)
        .ok_or_else(|| {
            HalError::invalid_parameter(format!(
                "{count} blocks from block {block} run past block {}",
                u32::MAX
            ))
        })
}

fn address(info: &CardInfo, block: u32) -> Result<u32> {
    if info.high_capacity {
        return Ok(block);
    }
    block
        .checked_mul(SD_BLOCK_SIZE as u32)
        .ok_or_else(|| HalError::invalid_parameter(format!("block {block} is beyond 4 GiB")))
}

impl<T: SpiTransport, const M: usize, const N: usize> StorageDevice<SpiDriver<T, M>> for SdCard<N> {
    fn int_hw_init(
        &mut self,
        bus: &mut SpiDriver<T, M>,
        id: u8,
        attachment: SpiAttachment,
    ) -> Result<()> {
        if !matches!(attachment.chip_select, ChipSelect::Software { .. }) {
            return Err(HalError::invalid_parameter(
                "SD card needs a software chip select",
            ));
        }
        self.devices.bind(id, attachment.bus_id, |bus_id| {
            bus.attach(
                bus_id,
                attachment.parameters().with_mosi_value_on_reads(0xFF),
            )
        })
    }

    fn ext_hw_config(&mut self, bus: &mut SpiDriver<T, M>, id: u8) -> Result<()> {
        self.devices.configure(id, |bus_id, info| {
            let polarity = match bus.parameters(bus_id)?.chip_select {
                ChipSelect::Software { polarity, .. } => polarity,
                ChipSelect::Hardware => {
                    return Err(HalError::invalid_parameter(
                        "SD card needs a software chip select",
                    ));
                }
            };
            let select = polarity.active_level();

            // At least 74 clocks with the card deselected before the first command.
            let idle = polarity.idle_level();
            bus.cs_control(bus_id, true, idle)?;
            let clocks = bus.send(bus_id, &[0xFF; 10]);
            bus.cs_control(bus_id, false, idle)?;
            clocks?;
            *info = Session::selected(bus, bus_id, select, |session| power_up(session, select))?;
            debug!(id, high_capacity = info.high_capacity, "SD card ready");
            Ok(())
        })
    }

    fn read_blocks(
        &mut self,
        bus: &mut SpiDriver<T, M>,
        id: u8,
        block: u32,
        buffer: &mut [u8],
    ) -> Result<()> {
        let blocks = block_range(block, buffer.len())?;
        let (bus_id, info) = self.devices.ready(id)?;
        let info = *info;

        for (index, chunk) in blocks.zip(buffer.chunks_mut(SD_BLOCK_SIZE)) {
            let address = address(&info, index)?;
            Session::selected(bus, bus_id, info.select, |session| {
                expect_ready(READ_SINGLE_BLOCK, session.command(READ_SINGLE_BLOCK, address)?)?;
                let token = session.wait_while(0xFF)?;
                if token != DATA_TOKEN {
                    return Err(HalError::hardware_fault(format!(
                        "read of block {index} failed with token 0x{token:02X}"
                    )));
                }
                session.bus.read(session.bus_id, chunk)?;
                // CRC is not checked in SPI mode.
                let mut crc = [0u8; 2];
                session.bus.read(session.bus_id, &mut crc)
            })?;
        }
        trace!(id, block, blocks = buffer.len() / SD_BLOCK_SIZE, "SD read");
        Ok(())
    }

    fn write_blocks(
        &mut self,
        bus: &mut SpiDriver<T, M>,
        id: u8,
        block: u32,
        data: &[u8],
    ) -> Result<()> {
        let blocks = block_range(block, data.len())?;
        let (bus_id, info) = self.devices.ready(id)?;
        let info = *info;

        for (index, chunk) in blocks.zip(data.chunks(SD_BLOCK_SIZE)) {
            let address = address(&info, index)?;
            Session::selected(bus, bus_id, info.select, |session| {
                expect_ready(WRITE_BLOCK, session.command(WRITE_BLOCK, address)?)?;

                let mut packet = Vec::with_capacity(SD_BLOCK_SIZE + 4);
                packet.extend([0xFF, DATA_TOKEN]);
                packet.extend_from_slice(chunk);
                packet.extend([0xFF, 0xFF]);
                session.bus.send(session.bus_id, &packet)?;

                let response = session.wait_while(0xFF)?;
                if response & 0x1F != DATA_ACCEPTED {
                    return Err(HalError::hardware_fault(format!(
                        "write of block {index} rejected (0x{response:02X})"
                    )));
                }
                session.wait_while(0x00).map(drop)
            })?;
        }
        trace!(id, block, blocks = data.len() / SD_BLOCK_SIZE, "SD write");
        Ok(())
    }

    fn read_specs(&self) -> StorageSpecs {
        SPECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idhal_core::ErrorKind;
    use idhal_drivers::gpio::{GpioPin, GpioPort};
    use idhal_drivers::mock::{MockSpi, MockSpiHandle, SimSdCard, SpiEvent};
    use idhal_drivers::spi::{Polarity, SpiClock, SpiPort, SpiPrescaler};

    fn attachment() -> SpiAttachment {
        SpiAttachment::new(
            0,
            SpiPort::Spi3Pc10Pc11Pb5,
            ChipSelect::Software {
                port: GpioPort::D,
                pin: GpioPin::P0,
                polarity: Polarity::ActiveLow,
            },
            SpiClock::Prescaler(SpiPrescaler::Div32),
        )
    }

    fn setup(card: SimSdCard) -> (SdCard, SpiDriver<MockSpi>, MockSpiHandle) {
        let (transport, handle) = MockSpi::new();
        handle.attach(GpioPort::D, GpioPin::P0, Polarity::ActiveLow, card);
        let mut bus = SpiDriver::new(transport);
        let mut storage = SdCard::new();
        storage.int_hw_init(&mut bus, 0, attachment()).unwrap();
        (storage, bus, handle)
    }

    #[test]
    fn test_power_up_sequence() {
        let card = SimSdCard::new();
        let (mut storage, mut bus, handle) = setup(card.clone());

        storage.ext_hw_config(&mut bus, 0).unwrap();

        assert_eq!(card.commands(), vec![0, 8, 55, 41, 55, 41, 55, 41, 58]);
        assert!(!card.is_idle());
        assert!(storage.info(0).unwrap().high_capacity);
        assert_eq!(handle.cs_level(GpioPort::D, GpioPin::P0), Some(Level::High));
    }

    #[test]
    fn test_stuck_card_fails_power_up() {
        let card = SimSdCard::new().with_init_polls(u32::MAX);
        let (mut storage, mut bus, handle) = setup(card);

        let error = storage.ext_hw_config(&mut bus, 0).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::HardwareFault);
        assert_eq!(handle.cs_level(GpioPort::D, GpioPin::P0), Some(Level::High));
        let mut block = [0u8; SD_BLOCK_SIZE];
        let error = storage.read_blocks(&mut bus, 0, 0, &mut block).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotConfigured);
    }

    #[test]
    fn test_write_then_read_blocks() {
        let card = SimSdCard::new();
        let (mut storage, mut bus, _handle) = setup(card.clone());
        storage.ext_hw_config(&mut bus, 0).unwrap();

        let data: Vec<u8> = (0..2 * SD_BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
        storage.write_blocks(&mut bus, 0, 10, &data).unwrap();

        assert_eq!(card.block(10), data[..SD_BLOCK_SIZE]);
        assert_eq!(card.block(11), data[SD_BLOCK_SIZE..]);

        let mut buffer = vec![0u8; 2 * SD_BLOCK_SIZE];
        storage.read_blocks(&mut bus, 0, 10, &mut buffer).unwrap();
        assert_eq!(buffer, data);
    }

    #[test]
    fn test_read_past_end_of_card() {
        let card = SimSdCard::with_capacity(4);
        let (mut storage, mut bus, _handle) = setup(card);
        storage.ext_hw_config(&mut bus, 0).unwrap();

        let mut buffer = [0u8; SD_BLOCK_SIZE];
        let error = storage.read_blocks(&mut bus, 0, 4, &mut buffer).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::HardwareFault);
    }

    #[test]
    fn test_last_block_of_card() {
        let card = SimSdCard::with_capacity(u32::MAX);
        let (mut storage, mut bus, _handle) = setup(card.clone());
        storage.ext_hw_config(&mut bus, 0).unwrap();

        let last = u32::MAX - 1;
        let data = [0x5A; SD_BLOCK_SIZE];
        storage.write_blocks(&mut bus, 0, last, &data).unwrap();
        assert_eq!(card.block(last), data);

        let mut buffer = [0u8; SD_BLOCK_SIZE];
        storage.read_blocks(&mut bus, 0, last, &mut buffer).unwrap();
        assert_eq!(buffer, data);

        // Highest block number: addressable, but past this card's end.
        let error = storage
            .read_blocks(&mut bus, 0, u32::MAX, &mut buffer)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::HardwareFault);
    }

    #[test]
    fn test_range_past_highest_block_rejected() {
        let (mut storage, mut bus, handle) = setup(SimSdCard::with_capacity(u32::MAX));
        storage.ext_hw_config(&mut bus, 0).unwrap();
        handle.clear_events();

        let mut buffer = vec![0u8; 2 * SD_BLOCK_SIZE];
        let error = storage
            .read_blocks(&mut bus, 0, u32::MAX, &mut buffer)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);

        let error = storage
            .write_blocks(&mut bus, 0, u32::MAX - 1, &[0u8; 3 * SD_BLOCK_SIZE])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
        assert!(handle.events().is_empty());
    }

    #[test]
    fn test_power_up_clocks_sent_deselected() {
        let (mut storage, mut bus, handle) = setup(SimSdCard::new());
        handle.clear_events();
        storage.ext_hw_config(&mut bus, 0).unwrap();

        let mut level = Level::High;
        let mut clocks_level = None;
        for event in handle.events() {
            match event {
                SpiEvent::Cs { level: next, .. } => level = next,
                SpiEvent::Write { data, .. } if data == [0xFF; 10] => {
                    clocks_level.get_or_insert(level);
                }
                _ => {}
            }
        }
        assert_eq!(clocks_level, Some(Level::High));
    }

    #[test]
    fn test_partial_block_rejected() {
        let (mut storage, mut bus, handle) = setup(SimSdCard::new());
        storage.ext_hw_config(&mut bus, 0).unwrap();
        handle.clear_events();

        let error = storage
            .write_blocks(&mut bus, 0, 0, &[0u8; 100])
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
        assert!(handle.events().is_empty());
    }

    #[test]
    fn test_chip_select_held_for_whole_command() {
        let card = SimSdCard::new();
        let (mut storage, mut bus, handle) = setup(card);
        storage.ext_hw_config(&mut bus, 0).unwrap();
        handle.clear_events();

        let mut buffer = [0u8; SD_BLOCK_SIZE];
        storage.read_blocks(&mut bus, 0, 0, &mut buffer).unwrap();

        let cs: Vec<Level> = handle
            .events()
            .into_iter()
            .filter_map(|event| match event {
                SpiEvent::Cs { level, .. } => Some(level),
                _ => None,
            })
            .collect();
        assert_eq!(cs, vec![Level::Low, Level::High]);
    }

    #[test]
    fn test_hardware_chip_select_rejected() {
        let (transport, _handle) = MockSpi::new();
        let mut bus: SpiDriver<_> = SpiDriver::new(transport);
        let mut storage: SdCard = SdCard::new();
        let attachment = SpiAttachment {
            chip_select: ChipSelect::Hardware,
            ..attachment()
        };

        let error = storage.int_hw_init(&mut bus, 0, attachment).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
    }
}
