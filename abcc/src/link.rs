//! Message link layer
//!
//! The link sits between the upper layers (driver, command dispatch, host objects) and a
//! physical `Transport`. It owns:
//! * a command queue and a response queue of messages waiting for the transport,
//! * the outstanding command counter,
//! * the response handler table keyed by source id,
//! * the write lock guarding the physical write channel,
//! * at most one pending "message sent" notification.
//!
//! ```text
//!                write_message
//!                      │
//!          ┌───────────┴───────────┐
//!          │ lock free, queues     │ otherwise
//!          │ empty, transport ready│
//!          ▼                       ▼
//!   ┌────────────┐      ┌──────────────────────┐
//!   │ take lock  │      │ response │ command   │
//!   └─────┬──────┘      │  queue   │  queue    │
//!         │             └────┬─────┴─────┬─────┘
//!         │   check_send_message (responses first)
//!         ▼                  ▼           ▼
//!   prepare_write ─► write_message ─► release lock ─► free + notify on completion
//! ```
//!
//! ## Concurrency
//!
//! The link is shared between the interrupt context (receive path, `check_send_message`) and
//! the main loop (send path). All state lives behind one blocking mutex; each check-and-mutate
//! step is a separate short critical section. The lock flag carries write ownership across the
//! gap between taking the lock and issuing the physical write, so `prepare_write` runs outside
//! the critical section. The physical write and the lock release share one critical section.
//!
//! ## Outstanding commands
//!
//! A command counts as outstanding from the moment it is sent or queued until a response is
//! read. The protocol bounds outstanding commands, not queued ones, so the remaining command
//! capacity is `CMDS - outstanding` and a command beyond it is rejected as `CmdQueueFull`.

use core::cell::RefCell;
use core::task::{Context, Poll};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::waitqueue::WakerRegistration;

use crate::error::{DynamicErrorLog, ErrorCode, Severity};
use crate::pool::MessageBuffer;
use crate::transport::{Transport, WriteStatus};
use crate::utils::{CircularQueue, Underflow};

mod handler_table;

pub use handler_table::HandlerRef;
use handler_table::HandlerTable;

/// Receiver of a response to a previously sent command
///
/// Takes the response buffer. Dropping it returns the buffer to the pool.
pub trait ResponseHandler<'a> {
    fn on_response(&self, msg: MessageBuffer<'a>);
}

impl<'a, F: Fn(MessageBuffer<'a>)> ResponseHandler<'a> for F {
    fn on_response(&self, msg: MessageBuffer<'a>) {
        self(msg)
    }
}

/// One-shot callback fired when a specific message has been transmitted
pub trait Notify {
    fn notify(&self);
}

impl<F: Fn()> Notify for F {
    fn notify(&self) {
        self()
    }
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteError<'a> {
    /// Payload exceeds the transport limit. The caller keeps the message.
    SizeError(MessageBuffer<'a>),
    /// Another notification is pending. The caller keeps the message.
    NotificationPending(MessageBuffer<'a>),
    /// `CMDS` commands are outstanding or the command queue is full. The message has been
    /// released.
    CmdQueueFull,
    /// The message has been released
    RespQueueFull,
}

impl<'a> WriteError<'a> {
    pub fn code(&self) -> ErrorCode {
        match self {
            WriteError::SizeError(_) => ErrorCode::WrMsgSizeError,
            WriteError::NotificationPending(_) => ErrorCode::AssertFailed,
            WriteError::CmdQueueFull => ErrorCode::CmdQueueFull,
            WriteError::RespQueueFull => ErrorCode::RespQueueFull,
        }
    }

    /// Returns the message if the failure left it with the caller
    pub fn into_message(self) -> Option<MessageBuffer<'a>> {
        match self {
            WriteError::SizeError(msg) | WriteError::NotificationPending(msg) => Some(msg),
            WriteError::CmdQueueFull | WriteError::RespQueueFull => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandlerError {
    NoResources,
    SourceIdInUse,
}

impl HandlerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            HandlerError::NoResources => ErrorCode::NoResources,
            HandlerError::SourceIdInUse => ErrorCode::SourceIdInUse,
        }
    }
}

struct PendingNotification<'a> {
    index: u8,
    notify: &'a (dyn Notify + Sync),
}

/// Outcome of the locked part of a write
enum Route<'a> {
    Transmit(MessageBuffer<'a>),
    Queued,
    QueueFull(MessageBuffer<'a>, WriteError<'a>),
    Rejected(WriteError<'a>),
}

struct State<'a, const CMDS: usize, const RESPS: usize, const HANDLERS: usize> {
    cmd_queue: CircularQueue<MessageBuffer<'a>, CMDS>,
    resp_queue: CircularQueue<MessageBuffer<'a>, RESPS>,
    outstanding: usize,
    write_lock: bool,
    handlers: HandlerTable<'a, HANDLERS>,
    notification: Option<PendingNotification<'a>>,
    capacity_waker: WakerRegistration,
}

impl<const CMDS: usize, const RESPS: usize, const HANDLERS: usize> State<'_, CMDS, RESPS, HANDLERS> {
    fn new() -> Self {
        Self {
            cmd_queue: CircularQueue::new(),
            resp_queue: CircularQueue::new(),
            outstanding: 0,
            write_lock: false,
            handlers: HandlerTable::new(),
            notification: None,
            capacity_waker: WakerRegistration::new(),
        }
    }
}

/// Link layer context
///
/// * `CMDS` bounds outstanding application commands and sizes the command queue.
/// * `RESPS` sizes the response queue.
/// * `HANDLERS` sizes the handler table and must exceed `CMDS`.
pub struct Link<'a, M, T, const CMDS: usize, const RESPS: usize, const HANDLERS: usize>
where
    M: RawMutex,
    T: Transport<'a>,
{
    transport: T,
    errors: &'a (dyn DynamicErrorLog + Sync),
    max_message_size: usize,
    state: Mutex<M, RefCell<State<'a, CMDS, RESPS, HANDLERS>>>,
}

impl<'a, M, T, const CMDS: usize, const RESPS: usize, const HANDLERS: usize>
    Link<'a, M, T, CMDS, RESPS, HANDLERS>
where
    M: RawMutex,
    T: Transport<'a>,
{
    const _ASSERT: usize = HANDLERS - CMDS - 1;

    pub fn new(transport: T, errors: &'a (dyn DynamicErrorLog + Sync)) -> Self {
        let _ = Self::_ASSERT;
        let max_message_size = transport.max_message_size();
        Self {
            transport,
            errors,
            max_message_size,
            state: Mutex::new(RefCell::new(State::new())),
        }
    }

    /// Returns the link to its initial state
    ///
    /// Queued messages are released, handler registrations and the pending notification are
    /// dropped. Must not be called while a write is in progress.
    pub fn restart(&self) {
        let mut previous = self.state.lock(|cell| cell.replace(State::new()));
        debug!(
            "link restarted, dropping {} commands and {} responses",
            previous.cmd_queue.len(),
            previous.resp_queue.len()
        );
        previous.capacity_waker.wake();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Sends or queues a message
    ///
    /// Ownership passes to the link unless the message is rejected with `SizeError`.
    /// A message rejected because its queue is full is released.
    pub fn write_message(&self, msg: MessageBuffer<'a>) -> Result<(), WriteError<'a>> {
        self.write(msg, None)
    }

    /// Sends or queues a message and fires `notify` once it has been transmitted
    ///
    /// Only one notification may be pending at a time. A second registration is a fatal error
    /// and leaves the message with the caller.
    pub fn write_message_with_notification(
        &self,
        msg: MessageBuffer<'a>,
        notify: &'a (dyn Notify + Sync),
    ) -> Result<(), WriteError<'a>> {
        self.write(msg, Some(notify))
    }

    fn write(
        &self,
        msg: MessageBuffer<'a>,
        notify: Option<&'a (dyn Notify + Sync)>,
    ) -> Result<(), WriteError<'a>> {
        if usize::from(msg.data_size()) > self.max_message_size {
            self.errors.report(
                Severity::Warning,
                ErrorCode::WrMsgSizeError,
                msg.data_size().into(),
            );
            return Err(WriteError::SizeError(msg));
        }

        let route = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();

            if msg.is_command() && state.outstanding >= CMDS {
                return Route::QueueFull(msg, WriteError::CmdQueueFull);
            }

            if let Some(notify) = notify {
                if state.notification.is_some() {
                    return Route::Rejected(WriteError::NotificationPending(msg));
                }
                state.notification = Some(PendingNotification {
                    index: msg.index(),
                    notify,
                });
            }

            let is_command = msg.is_command();
            let ready = if is_command {
                state.cmd_queue.is_empty()
                    && state.resp_queue.is_empty()
                    && self.transport.is_ready_for_command()
            } else {
                state.resp_queue.is_empty() && self.transport.is_ready_for_write()
            };

            if !state.write_lock && ready {
                msg.mark_sent();
                state.write_lock = true;
                if is_command {
                    state.outstanding += 1;
                }
                return Route::Transmit(msg);
            }

            let full = if is_command {
                state.cmd_queue.is_full()
            } else {
                state.resp_queue.is_full()
            };
            if full {
                if notify.is_some() {
                    state.notification = None;
                }
                let err = if is_command {
                    WriteError::CmdQueueFull
                } else {
                    WriteError::RespQueueFull
                };
                return Route::QueueFull(msg, err);
            }

            msg.mark_sent();
            if is_command {
                unwrap!(state.cmd_queue.enqueue(msg));
                state.outstanding += 1;
            } else {
                unwrap!(state.resp_queue.enqueue(msg));
            }
            Route::Queued
        });

        match route {
            Route::Transmit(msg) => {
                self.transmit(msg);
                Ok(())
            }
            Route::Queued => Ok(()),
            Route::QueueFull(msg, err) => {
                self.errors
                    .report(Severity::Warning, err.code(), msg.source_id().into());
                drop(msg);
                Err(err)
            }
            Route::Rejected(err) => {
                self.errors.report(Severity::Fatal, err.code(), 0);
                Err(err)
            }
        }
    }

    /// Sends the next queued message if the write channel is free
    ///
    /// Responses take precedence over commands.
    pub fn check_send_message(&self) {
        let res = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            if state.write_lock {
                return Ok(None);
            }

            let msg = if !state.resp_queue.is_empty() && self.transport.is_ready_for_write() {
                state.resp_queue.dequeue()?
            } else if !state.cmd_queue.is_empty() && self.transport.is_ready_for_command() {
                state.cmd_queue.dequeue()?
            } else {
                return Ok(None);
            };
            state.write_lock = true;
            Ok(Some(msg))
        });

        match res {
            Ok(Some(msg)) => self.transmit(msg),
            Ok(None) => {}
            Err(Underflow) => self
                .errors
                .report(Severity::Fatal, ErrorCode::InternalError, 0),
        }
    }

    /// Physical write of a message owning the write lock
    fn transmit(&self, msg: MessageBuffer<'a>) {
        trace!("transmitting {:?}", msg);
        self.transport.prepare_write(&msg);

        let status = self.state.lock(|cell| {
            let status = self.transport.write_message(msg);
            cell.borrow_mut().write_lock = false;
            status
        });

        if let WriteStatus::Complete(msg) = status {
            self.release_sent(msg);
        }
    }

    /// Fires the notification registered for the message, then releases it
    fn release_sent(&self, msg: MessageBuffer<'a>) {
        let notify = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            match &state.notification {
                Some(pending) if pending.index == msg.index() => {
                    state.notification.take().map(|pending| pending.notify)
                }
                _ => None,
            }
        });

        if let Some(notify) = notify {
            notify.notify();
        }
        drop(msg);
    }

    /// Takes a received message from the transport
    ///
    /// A response settles one outstanding command.
    pub fn read_message(&self) -> Option<MessageBuffer<'a>> {
        let msg = self.transport.read_message()?;
        if !msg.is_command() {
            let settled = self.state.lock(|cell| {
                let mut state = cell.borrow_mut();
                let settled = state.outstanding.checked_sub(1);
                if let Some(outstanding) = settled {
                    state.outstanding = outstanding;
                    state.capacity_waker.wake();
                }
                settled.is_some()
            });
            if !settled {
                self.errors.report(
                    Severity::Fatal,
                    ErrorCode::InternalError,
                    msg.source_id().into(),
                );
            }
        }
        Some(msg)
    }

    /// Releases a message whose transmission the transport completed asynchronously
    pub fn run_driver_rx(&self) {
        if let Some(msg) = self.transport.run_rx() {
            self.release_sent(msg);
        }
    }

    /// Remaining command capacity, `CMDS` minus outstanding commands
    pub fn num_cmd_queue_entries(&self) -> usize {
        self.state
            .lock(|cell| CMDS.saturating_sub(cell.borrow().outstanding))
    }

    /// Resolves with the remaining command capacity once it is non-zero
    pub fn poll_cmd_capacity(&self, cx: &mut Context<'_>) -> Poll<usize> {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let free = CMDS.saturating_sub(state.outstanding);
            if free > 0 {
                Poll::Ready(free)
            } else {
                state.capacity_waker.register(cx.waker());
                Poll::Pending
            }
        })
    }

    /// Registers the handler for the response carrying `source_id`
    pub fn map_msg_handler(
        &self,
        source_id: u8,
        handler: HandlerRef<'a>,
    ) -> Result<(), HandlerError> {
        let res = self
            .state
            .lock(|cell| cell.borrow_mut().handlers.insert(source_id, handler));
        if let Err(err) = res {
            self.errors
                .report(Severity::Warning, err.code(), source_id.into());
        }
        res
    }

    /// Takes the handler registered for `source_id`, consuming the registration
    pub fn get_msg_handler(&self, source_id: u8) -> Option<HandlerRef<'a>> {
        self.state
            .lock(|cell| cell.borrow_mut().handlers.take(source_id))
    }

    pub fn is_source_id_used(&self, source_id: u8) -> bool {
        self.state
            .lock(|cell| cell.borrow().handlers.contains(source_id))
    }

    /// Releases a message. A missing message is reported as a warning.
    pub fn free(&self, msg: Option<MessageBuffer<'a>>) {
        if msg.is_none() {
            self.errors
                .report(Severity::Warning, ErrorCode::TryingToFreeNullPointer, 0);
        }
        drop(msg);
    }

    pub fn outstanding_commands(&self) -> usize {
        self.state.lock(|cell| cell.borrow().outstanding)
    }

    pub fn is_write_in_progress(&self) -> bool {
        self.state.lock(|cell| cell.borrow().write_lock)
    }

    /// Number of queued (command, response) messages
    pub fn queued(&self) -> (usize, usize) {
        self.state.lock(|cell| {
            let state = cell.borrow();
            (state.cmd_queue.len(), state.resp_queue.len())
        })
    }

    pub fn registered_handlers(&self) -> usize {
        self.state.lock(|cell| cell.borrow().handlers.len())
    }
}
