//! The reference board, assembled on simulated transports.
//!
//! [`SimBoard::bring_up`] binds every role of the [`BoardSetup`] and arms the
//! three periodic timers. [`SimBoard::poll`] is one pass of the main loop:
//! each answered timer runs its job and is re-armed.
//!
//! | Timer | Job |
//! |-------|-----|
//! | display | redraw the frame counter and the last acceleration |
//! | ahrs | sample the IMU and the magnetometer |
//! | sdcard | append the last sample to the card, one block per record |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use idhal_core::{HalError, Level};
use idhal_devices::board::{BoardDisplay, BoardImu, BoardStorage};
use idhal_devices::imu::Qmc5883l;
use idhal_devices::{Color, DisplayDevice, ImuData, ImuDevice, StorageDevice};
use idhal_drivers::i2c::RegisterWidth;
use idhal_drivers::mock::{
    MockGpio, MockGpioHandle, MockI2c, MockI2cHandle, MockSpi, MockSpiHandle, MockUart,
    MockUartHandle, SimI2cDevice, SimSdCard,
};
use idhal_drivers::spi::ChipSelect;
use idhal_drivers::{GpioDriver, I2cDriver, PitStatus, PitUnit, SpiDriver, UartDriver};

use crate::setup::{BoardSetup, TimerRole};
use crate::ticker::{SharedPit, lock, shared_pit};

/// Errors of the board's periodic jobs.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("Cannot encode log record: {0}")]
    Record(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BoardError>;

type SensorBus = I2cDriver<MockI2c>;
type StorageBus = SpiDriver<MockSpi>;

/// Counters of the periodic jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardStats {
    pub frames: u64,
    pub samples: u64,
    pub log_blocks: u32,
}

/// One SD card block: a JSON record padded with zeros.
#[derive(Debug, Serialize)]
struct LogRecord<'a> {
    sample: u64,
    data: &'a ImuData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Display,
    Ahrs,
    Log,
}

impl Job {
    const ALL: [Self; 3] = [Self::Display, Self::Ahrs, Self::Log];

    /// Index of the status pin toggled by the job.
    fn status_pin(self) -> usize {
        match self {
            Self::Display => 0,
            Self::Ahrs => 1,
            Self::Log => 2,
        }
    }
}

/// Test-side views of the simulated peripherals.
#[derive(Debug, Clone)]
pub struct SimHandles {
    pub gpio: MockGpioHandle,
    pub i2c: MockI2cHandle,
    pub spi: MockSpiHandle,
    pub uart: MockUartHandle,
    pub card: SimSdCard,
}

/// Register map answering both the MPU6050 and the QMC5883L identification,
/// at rest and level: 1 g on Z, about 35 °C, 0.2 G on X and -0.4 G on Z.
fn sensor_chip() -> SimI2cDevice {
    SimI2cDevice::new(RegisterWidth::Bits8)
        .with_register(0x75, 0x68)
        .with_register(0x0D, 0xFF)
        .with_registers(
            0x3B,
            &[0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0xFD, 0xF7, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        )
        .with_registers(0x00, &[0x58, 0x02, 0x00, 0x00, 0x50, 0xFB])
}

/// Board wired as described by a [`BoardSetup`].
#[derive(Debug)]
pub struct SimBoard {
    setup: BoardSetup,
    gpio: GpioDriver<MockGpio>,
    i2c: SensorBus,
    spi: StorageBus,
    uart: UartDriver<MockUart>,
    display: BoardDisplay,
    imu: BoardImu,
    magnetometer: Qmc5883l,
    storage: BoardStorage,
    pit: SharedPit,
    sensors: ImuData,
    stats: BoardStats,
    handles: SimHandles,
}

impl SimBoard {
    /// Put the simulated chips where `setup` expects them. Nothing is bound yet.
    pub fn new(setup: BoardSetup) -> Self {
        let (gpio, gpio_handle) = MockGpio::new();
        let (i2c, i2c_handle) = MockI2c::new();
        let (spi, spi_handle) = MockSpi::new();
        let (uart, uart_handle) = MockUart::new();

        let display = setup.display.attachment;
        i2c_handle.attach(display.port, display.address, SimI2cDevice::new(RegisterWidth::None));
        let sensors = std::iter::once(setup.imu.attachment)
            .chain(setup.magnetometer.map(|role| role.attachment));
        for attachment in sensors {
            i2c_handle.attach(attachment.port, attachment.address, sensor_chip());
        }

        let card = SimSdCard::new();
        let sdcard = setup.sdcard.attachment;
        match sdcard.chip_select {
            ChipSelect::Software { port, pin, polarity } => {
                spi_handle.attach(port, pin, polarity, card.clone());
            }
            ChipSelect::Hardware => {
                spi_handle.attach_hardware(sdcard.port.peripheral(), card.clone());
            }
        }

        Self {
            setup,
            gpio: GpioDriver::new(gpio),
            i2c: I2cDriver::new(i2c),
            spi: SpiDriver::new(spi),
            uart: UartDriver::new(uart),
            display: BoardDisplay::new(),
            imu: BoardImu::new(),
            magnetometer: Qmc5883l::new(),
            storage: BoardStorage::new(),
            pit: shared_pit(),
            sensors: ImuData::default(),
            stats: BoardStats::default(),
            handles: SimHandles {
                gpio: gpio_handle,
                i2c: i2c_handle,
                spi: spi_handle,
                uart: uart_handle,
                card,
            },
        }
    }

    /// Bind every role, power the devices up and arm the periodic timers.
    ///
    /// # Errors
    ///
    /// The first driver error; roles after it are left unbound.
    pub fn bring_up(&mut self) -> Result<()> {
        for pin in &self.setup.status_pins {
            self.gpio.init(pin.id, pin.parameters)?;
        }

        let console = self.setup.console;
        self.uart.init(console.id, console.parameters)?;
        self.uart.send(console.id, b"IDHAL BOARD UP\r\n")?;

        let display = self.setup.display;
        self.display
            .int_hw_init(&mut self.i2c, display.device_id, display.attachment)?;
        self.display.ext_hw_config(&mut self.i2c, display.device_id)?;
        self.display
            .clear_screen(&mut self.i2c, display.device_id, Color::Normal)?;

        let imu = self.setup.imu;
        self.imu
            .int_hw_init(&mut self.i2c, imu.device_id, imu.attachment)?;
        self.imu.ext_hw_config(&mut self.i2c, imu.device_id)?;

        if let Some(compass) = self.setup.magnetometer {
            self.magnetometer
                .int_hw_init(&mut self.i2c, compass.device_id, compass.attachment)?;
            self.magnetometer
                .ext_hw_config(&mut self.i2c, compass.device_id)?;
        }

        let sdcard = self.setup.sdcard;
        self.storage
            .int_hw_init(&mut self.spi, sdcard.device_id, sdcard.attachment)?;
        self.storage.ext_hw_config(&mut self.spi, sdcard.device_id)?;

        for job in Job::ALL {
            self.arm(self.timer(job))?;
        }
        info!(
            display = ?DisplayDevice::<SensorBus>::read_specs(&self.display),
            imu = ?ImuDevice::<SensorBus>::read_specs(&self.imu),
            "Board up"
        );
        Ok(())
    }

    /// One pass of the main loop: run the job of every answered timer.
    ///
    /// # Errors
    ///
    /// `NotConfigured` before `bring_up`, otherwise the first job error. The
    /// failing job's timer stays disarmed.
    pub fn poll(&mut self) -> Result<()> {
        for job in Job::ALL {
            let timer = self.timer(job);
            let status = lock(&self.pit).get(timer.pit_id)?;
            if status == PitStatus::Running {
                continue;
            }
            self.run(job)?;
            self.arm(timer)?;
        }
        Ok(())
    }

    pub fn pit(&self) -> SharedPit {
        Arc::clone(&self.pit)
    }

    pub fn stats(&self) -> BoardStats {
        self.stats
    }

    /// Latest attitude sample.
    pub fn sensors(&self) -> &ImuData {
        &self.sensors
    }

    pub fn handles(&self) -> &SimHandles {
        &self.handles
    }

    pub fn setup(&self) -> &BoardSetup {
        &self.setup
    }

    fn timer(&self, job: Job) -> TimerRole {
        let timers = &self.setup.timers;
        match job {
            Job::Display => timers.display,
            Job::Ahrs => timers.ahrs,
            Job::Log => timers.sdcard,
        }
    }

    fn arm(&self, timer: TimerRole) -> Result<()> {
        lock(&self.pit).set(timer.pit_id, timer.period_ms, PitUnit::Milliseconds)?;
        Ok(())
    }

    fn run(&mut self, job: Job) -> Result<()> {
        trace!(?job, "Timer answered");
        match job {
            Job::Display => self.refresh_display()?,
            Job::Ahrs => self.sample_attitude()?,
            Job::Log => self.append_log()?,
        }
        if let Some(pin) = self.setup.status_pins.get(job.status_pin()) {
            self.gpio.toggle(pin.id)?;
        }
        Ok(())
    }

    fn refresh_display(&mut self) -> Result<()> {
        let id = self.setup.display.device_id;
        let width = usize::from(DisplayDevice::<SensorBus>::read_specs(&self.display).h_chars);
        self.stats.frames += 1;

        let mut lines = vec![format!("FRAME {:<10}", self.stats.frames)];
        if let Some(acceleration) = self.sensors.accelerometer {
            lines.push(format!("AZ {:<+13.2}", acceleration.z));
        }
        for (row, mut line) in (0u8..).zip(lines) {
            line.truncate(width);
            self.display
                .send_string(&mut self.i2c, id, line.as_bytes(), row, 0, Color::Normal)?;
        }
        Ok(())
    }

    fn sample_attitude(&mut self) -> Result<()> {
        self.imu
            .read(&mut self.i2c, self.setup.imu.device_id, &mut self.sensors)?;
        if let Some(compass) = self.setup.magnetometer {
            self.magnetometer
                .read(&mut self.i2c, compass.device_id, &mut self.sensors)?;
        }
        self.stats.samples += 1;
        Ok(())
    }

    fn append_log(&mut self) -> Result<()> {
        let id = self.setup.sdcard.device_id;
        let block_size = usize::from(StorageDevice::<StorageBus>::read_specs(&self.storage).block_size);

        let mut block = serde_json::to_vec(&LogRecord {
            sample: self.stats.samples,
            data: &self.sensors,
        })?;
        if block.len() > block_size {
            return Err(HalError::invalid_parameter(format!(
                "log record of {} bytes exceeds one block",
                block.len()
            ))
            .into());
        }
        block.resize(block_size, 0);

        let index = self.stats.log_blocks;
        self.storage.write_blocks(&mut self.spi, id, index, &block)?;
        self.stats.log_blocks += 1;
        debug!(block = index, "Sample logged");

        let console = self.setup.console.id;
        self.uart
            .send(console, format!("LOG {index}\r\n").as_bytes())?;
        Ok(())
    }

    /// Level currently driven on the status pin of `index`.
    pub fn status_level(&self, index: usize) -> Option<Level> {
        let pin = self.setup.status_pins.get(index)?;
        self.gpio.output_level(pin.id).ok()
    }
}
