//! # abcc
//!
//! This library implements the host side message layer of the Anybus CompactCom (ABCC)
//! protocol for no_std environments: a message link layer that multiplexes commands and
//! responses over a single physical channel, and a table-driven dispatch engine that answers
//! incoming attribute requests. All memory is provided by the user; nothing is allocated at
//! run time.
//!
//! ## Architecture
//!
//! ```text
//!   application            ┌────────┐
//!  send_cmd / send_resp ──►│ Driver │◄── Runner (periodic run)
//!                          └───┬────┘
//!              ┌───────────────┼──────────────────┐
//!              ▼               ▼                  ▼
//!        ┌──────────┐    ┌──────────┐      ┌────────────┐
//!        │   Link   │    │ Dispatch │      │  ErrorLog  │
//!        │ queues,  │    │  table,  │      └────────────┘
//!        │ handlers │    │  hosts   │
//!        └────┬─────┘    └──────────┘
//!             ▼
//!       ┌───────────┐         ┌─────────────┐
//!       │ Transport │         │ MessagePool │
//!       └───────────┘         └─────────────┘
//! ```
//! Components:
//! * _Link_ owns the command and response queues, the outstanding command counter, the
//!   response handler table and the write lock of the physical channel.
//! * _Dispatch_ answers incoming commands from a static table of attribute entries and falls
//!   back to host object processors.
//! * _Driver_ ties both to a pool and an error log and tracks the driver state.
//! * _Transport_ is implemented by a physical driver (SPI, UART, parallel). See `abcc-driver`.
//!
//! ## Concurrency model
//!
//! Shared state lives behind `embassy_sync` blocking mutexes. With `CriticalSectionRawMutex`
//! the receive path may run from an interrupt while the application sends from thread mode.
//! Every critical section covers one check-and-mutate step only. The physical write is staged
//! outside the critical section; a write lock keeps a second writer out meanwhile.
//!
//! ## Example
//!
//! ```
//! use abcc::config::{Config, DefaultDriver, DefaultErrorLog, DefaultPool};
//! use abcc::dispatch::{CommandHandler, Entry, Value, lookup};
//! use abcc_driver::testing::MockTransport;
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex as Mutex;
//! use static_cell::StaticCell;
//!
//! static TABLE: [Entry; 1] = [lookup::application::serial_number(Value::Const(42))];
//! static POOL: StaticCell<DefaultPool<Mutex>> = StaticCell::new();
//! static ERRORS: StaticCell<DefaultErrorLog<Mutex>> = StaticCell::new();
//!
//! let pool = POOL.init(DefaultPool::new());
//! let errors = ERRORS.init(DefaultErrorLog::default());
//! let driver: DefaultDriver<Mutex, _> = DefaultDriver::new(
//!     MockTransport::new(256),
//!     pool,
//!     errors,
//!     CommandHandler::new(&TABLE, &[]),
//!     Config::default(),
//! );
//! driver.start().unwrap();
//! assert!(driver.run().is_ok());
//! ```
#![no_std]

pub use abcc_core as core;
pub use abcc_driver::{message, pool, transport};

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod link;
mod utils;

pub mod time {
    pub use embassy_time::Duration;
}
