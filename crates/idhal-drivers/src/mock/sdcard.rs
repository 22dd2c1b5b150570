//! Simulated SD card speaking the SPI-mode protocol.
//!
//! Supports the commands a block driver needs: `CMD0`, `CMD8`, `CMD16`,
//! `CMD55`/`ACMD41`, `CMD58`, `CMD17` and `CMD24`. The card is
//! block-addressed (SDHC). Clones share the same card, so a test can keep one
//! to inspect blocks after moving another into a [`MockSpiHandle`](super::MockSpiHandle).

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::lock;
use super::spi::SpiResponder;

/// Size of a data block in bytes.
pub const SD_BLOCK_SIZE: usize = 512;

const R1_READY: u8 = 0x00;
const R1_IDLE: u8 = 0x01;
const R1_ILLEGAL_COMMAND: u8 = 0x04;
const R1_PARAMETER_ERROR: u8 = 0x40;
const DATA_TOKEN: u8 = 0xFE;
const DATA_ACCEPTED: u8 = 0x05;
/// OCR with power-up complete and card capacity status (SDHC) set.
const OCR_SDHC: [u8; 4] = [0xC0, 0xFF, 0x80, 0x00];

#[derive(Debug)]
enum Phase {
    /// Collecting a 6-byte command frame.
    Command(Vec<u8>),
    /// `CMD24` accepted, waiting for the data token.
    AwaitToken { block: u32 },
    /// Collecting block data plus two CRC bytes.
    Data { block: u32, bytes: Vec<u8> },
}

#[derive(Debug)]
struct CardState {
    phase: Phase,
    outgoing: VecDeque<u8>,
    idle: bool,
    app_command: bool,
    /// `ACMD41` calls still answered with "idle".
    init_polls: u32,
    blocks: BTreeMap<u32, Vec<u8>>,
    block_count: u32,
    commands: Vec<u8>,
}

impl CardState {
    fn respond(&mut self, bytes: &[u8]) {
        // One byte of command response time (NCR) before R1.
        self.outgoing.push_back(0xFF);
        self.outgoing.extend(bytes);
    }

    fn r1(&self) -> u8 {
        if self.idle { R1_IDLE } else { R1_READY }
    }

    fn execute(&mut self, frame: &[u8]) {
        let index = frame[0] & 0x3F;
        let argument = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
        let app = std::mem::take(&mut self.app_command);
        self.commands.push(index);

        match (app, index) {
            (_, 0) => {
                self.idle = true;
                self.respond(&[R1_IDLE]);
            }
            (_, 8) => {
                let echo = argument.to_be_bytes();
                self.respond(&[self.r1(), 0x00, 0x00, echo[2], echo[3]]);
            }
            (_, 16) => {
                let r1 = if argument as usize == SD_BLOCK_SIZE {
                    self.r1()
                } else {
                    R1_PARAMETER_ERROR
                };
                self.respond(&[r1]);
            }
            (_, 55) => {
                self.app_command = true;
                self.respond(&[self.r1()]);
            }
            (true, 41) => {
                if self.init_polls == 0 {
                    self.idle = false;
                } else {
                    self.init_polls -= 1;
                }
                self.respond(&[self.r1()]);
            }
            (_, 58) => {
                let mut response = vec![self.r1()];
                response.extend(OCR_SDHC);
                self.respond(&response);
            }
            (_, 17) if !self.idle => {
                if argument >= self.block_count {
                    self.respond(&[R1_PARAMETER_ERROR]);
                    return;
                }
                let data = self
                    .blocks
                    .get(&argument)
                    .cloned()
                    .unwrap_or_else(|| vec![0; SD_BLOCK_SIZE]);
                self.respond(&[R1_READY, 0xFF, DATA_TOKEN]);
                self.outgoing.extend(data);
                self.outgoing.extend([0x00, 0x00]);
            }
            (_, 24) if !self.idle => {
                if argument >= self.block_count {
                    self.respond(&[R1_PARAMETER_ERROR]);
                    return;
                }
                self.respond(&[R1_READY]);
                self.phase = Phase::AwaitToken { block: argument };
            }
            _ => self.respond(&[self.r1() | R1_ILLEGAL_COMMAND]),
        }
    }

    fn receive(&mut self, mosi: u8) {
        match std::mem::replace(&mut self.phase, Phase::Command(Vec::new())) {
            Phase::Command(mut frame) => {
                if frame.is_empty() && mosi & 0xC0 != 0x40 {
                    return;
                }
                frame.push(mosi);
                if frame.len() == 6 {
                    self.execute(&frame);
                } else {
                    self.phase = Phase::Command(frame);
                }
            }
            Phase::AwaitToken { block } => {
                self.phase = if mosi == DATA_TOKEN {
                    Phase::Data {
                        block,
                        bytes: Vec::with_capacity(SD_BLOCK_SIZE + 2),
                    }
                } else {
                    Phase::AwaitToken { block }
                };
            }
            Phase::Data { block, mut bytes } => {
                bytes.push(mosi);
                if bytes.len() == SD_BLOCK_SIZE + 2 {
                    bytes.truncate(SD_BLOCK_SIZE);
                    self.blocks.insert(block, bytes);
                    // Data response, then two busy bytes.
                    self.outgoing.extend([DATA_ACCEPTED, 0x00, 0x00]);
                } else {
                    self.phase = Phase::Data { block, bytes };
                }
            }
        }
    }
}

/// Simulated SD card.
#[derive(Debug, Clone)]
pub struct SimSdCard {
    state: Arc<Mutex<CardState>>,
}

impl SimSdCard {
    /// 16 MiB card that leaves idle on the third `ACMD41`.
    pub fn new() -> Self {
        Self::with_capacity(32_768)
    }

    pub fn with_capacity(block_count: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(CardState {
                phase: Phase::Command(Vec::new()),
                outgoing: VecDeque::new(),
                idle: true,
                app_command: false,
                init_polls: 2,
                blocks: BTreeMap::new(),
                block_count,
                commands: Vec::new(),
            })),
        }
    }

    /// Number of `ACMD41` calls answered "idle" before the card is ready.
    #[must_use]
    pub fn with_init_polls(self, polls: u32) -> Self {
        lock(&self.state).init_polls = polls;
        self
    }

    pub fn block_count(&self) -> u32 {
        lock(&self.state).block_count
    }

    /// Contents of a block (zeros if never written).
    pub fn block(&self, block: u32) -> Vec<u8> {
        lock(&self.state)
            .blocks
            .get(&block)
            .cloned()
            .unwrap_or_else(|| vec![0; SD_BLOCK_SIZE])
    }

    pub fn set_block(&self, block: u32, data: &[u8]) {
        let mut bytes = vec![0; SD_BLOCK_SIZE];
        let len = data.len().min(SD_BLOCK_SIZE);
        bytes[..len].copy_from_slice(&data[..len]);
        lock(&self.state).blocks.insert(block, bytes);
    }

    /// Command indices received so far (`ACMD41` shows as 41).
    pub fn commands(&self) -> Vec<u8> {
        lock(&self.state).commands.clone()
    }

    pub fn is_idle(&self) -> bool {
        lock(&self.state).idle
    }
}

impl Default for SimSdCard {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiResponder for SimSdCard {
    fn exchange(&mut self, mosi: u8) -> u8 {
        let mut state = lock(&self.state);
        let miso = state.outgoing.pop_front().unwrap_or(0xFF);
        state.receive(mosi);
        miso
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(card: &mut SimSdCard, index: u8, argument: u32) -> Vec<u8> {
        let arg = argument.to_be_bytes();
        let frame = [0x40 | index, arg[0], arg[1], arg[2], arg[3], 0x95];
        for byte in frame {
            card.exchange(byte);
        }
        (0..8).map(|_| card.exchange(0xFF)).collect()
    }

    #[test]
    fn test_go_idle() {
        let mut card = SimSdCard::new();
        let response = command(&mut card, 0, 0);
        assert_eq!(response[1], R1_IDLE);
    }

    #[test]
    fn test_interface_condition_echo() {
        let mut card = SimSdCard::new();
        let response = command(&mut card, 8, 0x1AA);
        assert_eq!(&response[1..6], &[R1_IDLE, 0x00, 0x00, 0x01, 0xAA]);
    }

    #[test]
    fn test_leaves_idle_after_polls() {
        let mut card = SimSdCard::new().with_init_polls(1);
        command(&mut card, 55, 0);
        assert_eq!(command(&mut card, 41, 0x4000_0000)[1], R1_IDLE);
        command(&mut card, 55, 0);
        assert_eq!(command(&mut card, 41, 0x4000_0000)[1], R1_READY);
        assert!(!card.is_idle());
    }

    #[test]
    fn test_block_commands_rejected_while_idle() {
        let mut card = SimSdCard::new();
        let response = command(&mut card, 17, 0);
        assert_eq!(response[1] & R1_ILLEGAL_COMMAND, R1_ILLEGAL_COMMAND);
    }
}
