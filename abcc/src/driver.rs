//! Driver front-end
//!
//! `Driver` composes the link layer, the message pool, the error log and the command dispatch
//! engine behind the application facing API: allocate a message, send a command with a response
//! handler, send a response, and pump the driver with `run`. A `Runner` calls `run` on a fixed
//! period for applications that do not poll.
//!
//! ```text
//!          Init ──start──► Running ──fatal error──► Error
//!           ▲                                         │
//!           └──────────────────restart────────────────┘
//! ```

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Ticker;

use crate::config::Config;
use crate::dispatch::{CommandHandler, Responder};
use crate::error::{DynamicErrorLog, ErrorCode, Severity};
use crate::link::{HandlerError, HandlerRef, Link, Notify, WriteError};
use crate::message::Message;
use crate::pool::MessageBuffer;
use crate::transport::Transport;
use abcc_driver::internal::DynamicAlloc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MainState {
    Init,
    Running,
    /// Entered on a fatal error report. Left only through `Driver::restart`.
    Error,
}

/// Process data sizes in octets
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProcessDataSizes {
    pub read: u16,
    pub write: u16,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError<'a> {
    /// The driver is not running. The caller keeps the message.
    IncorrectState(MessageBuffer<'a>),
    /// The response handler could not be registered. The caller keeps the message.
    Handler(HandlerError, MessageBuffer<'a>),
    Write(WriteError<'a>),
}

impl<'a> SendError<'a> {
    pub fn code(&self) -> ErrorCode {
        match self {
            SendError::IncorrectState(_) => ErrorCode::IncorrectState,
            SendError::Handler(err, _) => err.code(),
            SendError::Write(err) => err.code(),
        }
    }

    /// Returns the message if the failure left it with the caller
    pub fn into_message(self) -> Option<MessageBuffer<'a>> {
        match self {
            SendError::IncorrectState(msg) | SendError::Handler(_, msg) => Some(msg),
            SendError::Write(err) => err.into_message(),
        }
    }
}

impl<'a> From<WriteError<'a>> for SendError<'a> {
    fn from(err: WriteError<'a>) -> Self {
        SendError::Write(err)
    }
}

struct DriverState {
    main: MainState,
    last_source_id: u8,
}

impl DriverState {
    fn new() -> Self {
        Self {
            main: MainState::Init,
            last_source_id: 0,
        }
    }
}

#[derive(Default)]
struct RemapState {
    sizes: ProcessDataSizes,
    pending: Option<ProcessDataSizes>,
}

/// Process data sizes and the remap in flight
///
/// Private to the driver, so only the link can fire the notification.
struct Remap<M: RawMutex> {
    state: Mutex<M, RefCell<RemapState>>,
    on_remap_done: Option<fn(ProcessDataSizes)>,
}

impl<M: RawMutex> Remap<M> {
    fn new(on_remap_done: Option<fn(ProcessDataSizes)>) -> Self {
        Self {
            state: Mutex::new(RefCell::new(RemapState::default())),
            on_remap_done,
        }
    }

    /// Returns false if another remap is in flight. Its sizes are left untouched.
    fn stage(&self, sizes: ProcessDataSizes) -> bool {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            if state.pending.is_some() {
                return false;
            }
            state.pending = Some(sizes);
            true
        })
    }

    fn cancel(&self) {
        self.state.lock(|cell| cell.borrow_mut().pending = None);
    }

    fn sizes(&self) -> ProcessDataSizes {
        self.state.lock(|cell| cell.borrow().sizes)
    }

    fn reset(&self) {
        self.state
            .lock(|cell| *cell.borrow_mut() = RemapState::default());
    }
}

impl<M: RawMutex> Notify for Remap<M> {
    fn notify(&self) {
        let sizes = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let sizes = state.pending.take()?;
            state.sizes = sizes;
            Some(sizes)
        });

        if let Some(sizes) = sizes {
            debug!("remap done, read {} write {}", sizes.read, sizes.write);
            if let Some(on_remap_done) = self.on_remap_done {
                on_remap_done(sizes);
            }
        }
    }
}

/// Driver instance
///
/// The pool and the error log are allocated by the user and shared by reference, so that
/// message buffers and error entries outlive the driver borrow that produced them.
pub struct Driver<'a, M, T, const CMDS: usize, const RESPS: usize, const HANDLERS: usize>
where
    M: RawMutex,
    T: Transport<'a>,
{
    link: Link<'a, M, T, CMDS, RESPS, HANDLERS>,
    pool: &'a (dyn DynamicAlloc + Sync),
    errors: &'a (dyn DynamicErrorLog + Sync),
    commands: CommandHandler<'a>,
    config: Config,
    state: Mutex<M, RefCell<DriverState>>,
    remap: Remap<M>,
}

impl<'a, M, T, const CMDS: usize, const RESPS: usize, const HANDLERS: usize>
    Driver<'a, M, T, CMDS, RESPS, HANDLERS>
where
    M: RawMutex,
    T: Transport<'a>,
{
    const _ASSERT: usize = u8::MAX as usize - HANDLERS;

    pub fn new(
        transport: T,
        pool: &'a (dyn DynamicAlloc + Sync),
        errors: &'a (dyn DynamicErrorLog + Sync),
        commands: CommandHandler<'a>,
        config: Config,
    ) -> Self {
        let _ = Self::_ASSERT;
        Self {
            link: Link::new(transport, errors),
            pool,
            errors,
            commands,
            remap: Remap::new(config.on_remap_done),
            config,
            state: Mutex::new(RefCell::new(DriverState::new())),
        }
    }

    pub fn link(&self) -> &Link<'a, M, T, CMDS, RESPS, HANDLERS> {
        &self.link
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn main_state(&self) -> MainState {
        if self.errors.is_faulted() {
            return MainState::Error;
        }
        self.state.lock(|cell| cell.borrow().main)
    }

    /// Enters the running state
    pub fn start(&self) -> Result<(), ErrorCode> {
        let started = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            if state.main != MainState::Init || self.errors.is_faulted() {
                return false;
            }
            state.main = MainState::Running;
            true
        });

        if started {
            info!("driver started");
            Ok(())
        } else {
            self.errors
                .report(Severity::Warning, ErrorCode::IncorrectState, 0);
            Err(ErrorCode::IncorrectState)
        }
    }

    /// Drops queued messages and handler registrations, clears the fault and returns to `Init`
    pub fn restart(&self) {
        self.link.restart();
        self.state.lock(|cell| *cell.borrow_mut() = DriverState::new());
        self.remap.reset();
        self.errors.clear_fault();
        info!("driver restarted");
    }

    fn check_running(&self) -> bool {
        if self.main_state() == MainState::Running {
            return true;
        }
        self.errors
            .report(Severity::Warning, ErrorCode::IncorrectState, 0);
        false
    }

    /// Takes a message buffer from the pool
    pub fn alloc_msg(&self) -> Option<MessageBuffer<'a>> {
        let msg = self.pool.alloc_buffer();
        if msg.is_none() {
            self.errors
                .report(Severity::Warning, ErrorCode::OutOfMsgBuffers, 0);
        }
        msg
    }

    /// Next source id without a live handler registration
    pub fn new_source_id(&self) -> u8 {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            loop {
                state.last_source_id = state.last_source_id.wrapping_add(1);
                if !self.link.is_source_id_used(state.last_source_id) {
                    return state.last_source_id;
                }
            }
        })
    }

    /// Sends a command and routes its response to `handler`
    ///
    /// The handler is registered under the message source id. If the write fails, the
    /// registration is withdrawn.
    pub fn send_cmd_msg(
        &self,
        msg: MessageBuffer<'a>,
        handler: HandlerRef<'a>,
    ) -> Result<(), SendError<'a>> {
        if !self.check_running() {
            return Err(SendError::IncorrectState(msg));
        }

        let source_id = msg.source_id();
        if let Err(err) = self.link.map_msg_handler(source_id, handler) {
            return Err(SendError::Handler(err, msg));
        }

        self.link.write_message(msg).map_err(|err| {
            let _ = self.link.get_msg_handler(source_id);
            SendError::Write(err)
        })
    }

    pub fn send_resp_msg(&self, msg: MessageBuffer<'a>) -> Result<(), SendError<'a>> {
        if !self.check_running() {
            return Err(SendError::IncorrectState(msg));
        }
        Ok(self.link.write_message(msg)?)
    }

    /// Sends the response to a remap command
    ///
    /// The new process data sizes take effect, and `Config::on_remap_done` fires, once the
    /// response has been transmitted. Only one remap may be in flight; a second one is rejected
    /// by the link and leaves the first one in place.
    pub fn send_remap_resp_msg(
        &'a self,
        msg: MessageBuffer<'a>,
        sizes: ProcessDataSizes,
    ) -> Result<(), SendError<'a>>
    where
        M: Sync,
    {
        if !self.check_running() {
            return Err(SendError::IncorrectState(msg));
        }

        let staged = self.remap.stage(sizes);
        self.link
            .write_message_with_notification(msg, &self.remap)
            .map_err(|err| {
                if staged {
                    self.remap.cancel();
                }
                SendError::Write(err)
            })
    }

    pub fn process_data_sizes(&self) -> ProcessDataSizes {
        self.remap.sizes()
    }

    /// Number of further commands that may be sent before a response arrives
    pub fn get_cmd_queue_size(&self) -> usize {
        self.link.num_cmd_queue_entries()
    }

    /// Waits until at least one more command may be sent
    pub async fn wait_cmd_capacity(&self) -> usize {
        core::future::poll_fn(|cx| self.link.poll_cmd_capacity(cx)).await
    }

    /// Routes a received message
    ///
    /// Responses go to the handler registered under their source id, commands go to the
    /// dispatch engine.
    pub fn handle_received(&self, msg: MessageBuffer<'a>) {
        if msg.is_command() {
            self.commands.handle(msg, self);
            return;
        }

        let source_id = msg.source_id();
        match self.link.get_msg_handler(source_id) {
            Some(handler) => handler.on_response(msg),
            None => self.errors.report(
                Severity::Warning,
                ErrorCode::InvalidRespSourceId,
                source_id.into(),
            ),
        }
    }

    /// Checks a response for the error bit
    ///
    /// An error response is reported as a warning carrying its response error code.
    pub fn verify_message(&self, msg: &Message) -> Result<(), ErrorCode> {
        if !msg.is_error_response() {
            return Ok(());
        }
        let error = msg.response_error().map_or(0, |error| error.into_u8());
        self.errors
            .report(Severity::Warning, ErrorCode::RespMsgEBitSet, error.into());
        Err(ErrorCode::RespMsgEBitSet)
    }

    /// Polled driver pump
    ///
    /// Releases completed writes, handles at most one received message, sends the next queued
    /// message and runs the transport transmit pump.
    pub fn run(&self) -> Result<(), ErrorCode> {
        if self.main_state() != MainState::Running {
            return Err(ErrorCode::IncorrectState);
        }

        self.link.run_driver_rx();
        if let Some(msg) = self.link.read_message() {
            trace!("received {:?}", msg);
            self.handle_received(msg);
        }
        self.link.check_send_message();
        self.link.transport().run_tx();
        Ok(())
    }

    pub fn runner(&'a self) -> Runner<'a>
    where
        Self: Sync,
    {
        Runner {
            driver: self,
            period: self.config.run_period,
        }
    }
}

impl<'a, M, T, const CMDS: usize, const RESPS: usize, const HANDLERS: usize> Responder<'a>
    for Driver<'a, M, T, CMDS, RESPS, HANDLERS>
where
    M: RawMutex,
    T: Transport<'a>,
{
    fn max_message_size(&self) -> usize {
        self.link.max_message_size()
    }

    fn send_response(&self, msg: MessageBuffer<'a>) {
        if let Err(err) = self.send_resp_msg(msg) {
            debug!("response dropped: {:?}", err.code());
        }
    }

    fn report(&self, severity: Severity, code: ErrorCode, add_info: u32) {
        self.errors.report(severity, code, add_info);
    }
}

trait DynamicDriver {
    fn run(&self) -> Result<(), ErrorCode>;
}

impl<'a, M, T, const CMDS: usize, const RESPS: usize, const HANDLERS: usize> DynamicDriver
    for Driver<'a, M, T, CMDS, RESPS, HANDLERS>
where
    M: RawMutex,
    T: Transport<'a>,
{
    fn run(&self) -> Result<(), ErrorCode> {
        Driver::run(self)
    }
}

/// Driver background task runner
///
/// Calls `Driver::run` every `Config::run_period`.
pub struct Runner<'a> {
    driver: &'a (dyn DynamicDriver + Sync),
    period: embassy_time::Duration,
}

impl Runner<'_> {
    pub async fn run(&mut self) {
        let mut ticker = Ticker::every(self.period);
        loop {
            ticker.next().await;
            if let Err(code) = self.driver.run() {
                trace!("driver idle: {:?}", code);
            }
        }
    }
}
