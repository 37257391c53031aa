//! Default capacities and runtime settings
//!
//! The defaults describe the classic configuration: two outstanding application commands, two
//! outstanding module commands answered through the response queue, and a pool large enough
//! for both.

use crate::driver::{Driver, ProcessDataSizes};
use crate::error::ErrorLog;
use crate::pool::MessagePool;
use crate::time::Duration;

/// Outstanding commands the application may have in flight
pub const MAX_NUM_APPL_CMDS: usize = 2;

/// Outstanding commands the module may have in flight, i.e. pending responses
pub const MAX_NUM_ABCC_CMDS: usize = 2;

pub const MSG_POOL_SIZE: usize = MAX_NUM_APPL_CMDS + MAX_NUM_ABCC_CMDS;

pub const HANDLER_SLOTS: usize = MAX_NUM_APPL_CMDS + 1;

pub const ERROR_LOG_SIZE: usize = 1;

pub type DefaultPool<M> = MessagePool<M, MSG_POOL_SIZE>;

pub type DefaultErrorLog<M> = ErrorLog<M, ERROR_LOG_SIZE>;

pub type DefaultDriver<'a, M, T> =
    Driver<'a, M, T, MAX_NUM_APPL_CMDS, MAX_NUM_ABCC_CMDS, HANDLER_SLOTS>;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// `Runner` period
    pub run_period: Duration,
    /// Called once a remap response has been transmitted and the new sizes are in effect
    pub on_remap_done: Option<fn(ProcessDataSizes)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_period: Duration::from_millis(1),
            on_remap_done: None,
        }
    }
}
