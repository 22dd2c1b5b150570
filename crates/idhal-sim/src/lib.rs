//! Host-side simulator of the reference board.
//!
//! Runs the bus drivers and device classes against simulated transports:
//!
//! - [`setup`]: which IDs, ports and timers each board role uses, loadable
//!   from JSON and checked for conflicts before any driver is touched.
//! - [`ticker`]: the 1 ms tick source driving the software timers.
//! - [`board`]: the assembled board with its periodic display, attitude and
//!   logging jobs.

pub mod board;
pub mod setup;
pub mod ticker;

pub use board::{BoardError, BoardStats, SimBoard, SimHandles};
pub use setup::{BoardSetup, SetupError};
pub use ticker::{SharedPit, TaskTermination, TickHandle, Ticker, shared_pit};
