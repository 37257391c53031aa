//! Scriptable in-memory transport for test suites

use abcc_core::{ObjectNumber, header};
use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::{Deque, Vec};

use crate::message::Message;
use crate::pool::MessageBuffer;
use crate::transport::{Transport, WriteStatus};

pub const RECORD_DATA_SIZE: usize = 64;
pub const RECORD_CAPACITY: usize = 32;
const QUEUE_CAPACITY: usize = 8;

/// Snapshot of a written message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub index: u8,
    pub source_id: u8,
    pub object: ObjectNumber,
    pub instance: u16,
    pub cmd: u8,
    pub cmd_ext0: u8,
    pub cmd_ext1: u8,
    pub data_size: u16,
    pub data: Vec<u8, RECORD_DATA_SIZE>,
}

impl Record {
    fn new(index: u8, msg: &Message) -> Self {
        let data = msg.data();
        let len = data.len().min(RECORD_DATA_SIZE);
        Self {
            index,
            source_id: msg.source_id(),
            object: msg.dest_obj(),
            instance: msg.instance(),
            cmd: msg.cmd_byte(),
            cmd_ext0: msg.cmd_ext0(),
            cmd_ext1: msg.cmd_ext1(),
            data_size: msg.data_size(),
            data: unwrap!(Vec::from_slice(&data[..len])),
        }
    }

    pub fn is_command(&self) -> bool {
        self.cmd & header::C_BIT != 0
    }
}

/// In-memory transport
///
/// By default the transport is ready for both message classes and completes writes
/// synchronously. With asynchronous completion, written buffers stay in flight until
/// `complete_write` moves the oldest one to the `run_rx` output. With `busy_after_write`, a
/// write clears both readiness flags until the test restores them.
pub struct MockTransport<'a>(Mutex<CriticalSectionRawMutex, RefCell<State<'a>>>);

struct State<'a> {
    max_message_size: usize,
    ready_for_command: bool,
    ready_for_write: bool,
    synchronous: bool,
    busy_after_write: bool,
    prepared: usize,
    tx_runs: usize,
    written: Vec<Record, RECORD_CAPACITY>,
    in_flight: Deque<MessageBuffer<'a>, QUEUE_CAPACITY>,
    completed: Deque<MessageBuffer<'a>, QUEUE_CAPACITY>,
    rx: Deque<MessageBuffer<'a>, QUEUE_CAPACITY>,
}

impl<'a> MockTransport<'a> {
    pub fn new(max_message_size: usize) -> Self {
        Self(Mutex::new(RefCell::new(State {
            max_message_size,
            ready_for_command: true,
            ready_for_write: true,
            synchronous: true,
            busy_after_write: false,
            prepared: 0,
            tx_runs: 0,
            written: Vec::new(),
            in_flight: Deque::new(),
            completed: Deque::new(),
            rx: Deque::new(),
        })))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<'a>) -> R) -> R {
        self.0.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn set_ready(&self, command: bool, write: bool) {
        self.with_state(|state| {
            state.ready_for_command = command;
            state.ready_for_write = write;
        });
    }

    pub fn set_synchronous(&self, synchronous: bool) {
        self.with_state(|state| state.synchronous = synchronous);
    }

    pub fn set_busy_after_write(&self, busy: bool) {
        self.with_state(|state| state.busy_after_write = busy);
    }

    /// Queues a message for `read_message`
    pub fn push_rx(&self, msg: MessageBuffer<'a>) {
        self.with_state(|state| unwrap!(state.rx.push_back(msg)));
    }

    /// Finishes the oldest asynchronous write. Returns false if nothing is in flight.
    pub fn complete_write(&self) -> bool {
        self.with_state(|state| match state.in_flight.pop_front() {
            Some(msg) => {
                unwrap!(state.completed.push_back(msg));
                true
            }
            None => false,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.with_state(|state| state.in_flight.len())
    }

    pub fn prepared(&self) -> usize {
        self.with_state(|state| state.prepared)
    }

    pub fn tx_runs(&self) -> usize {
        self.with_state(|state| state.tx_runs)
    }

    pub fn written(&self) -> Vec<Record, RECORD_CAPACITY> {
        self.with_state(|state| state.written.clone())
    }

    pub fn take_written(&self) -> Vec<Record, RECORD_CAPACITY> {
        self.with_state(|state| core::mem::take(&mut state.written))
    }
}

impl<'a> Transport<'a> for MockTransport<'a> {
    fn max_message_size(&self) -> usize {
        self.with_state(|state| state.max_message_size)
    }

    fn is_ready_for_command(&self) -> bool {
        self.with_state(|state| state.ready_for_command)
    }

    fn is_ready_for_write(&self) -> bool {
        self.with_state(|state| state.ready_for_write)
    }

    fn prepare_write(&self, _msg: &Message) {
        self.with_state(|state| state.prepared += 1);
    }

    fn write_message(&self, msg: MessageBuffer<'a>) -> WriteStatus<'a> {
        self.with_state(|state| {
            unwrap!(state.written.push(Record::new(msg.index(), &msg)));
            if state.busy_after_write {
                state.ready_for_command = false;
                state.ready_for_write = false;
            }
            if state.synchronous {
                WriteStatus::Complete(msg)
            } else {
                unwrap!(state.in_flight.push_back(msg));
                WriteStatus::Pending
            }
        })
    }

    fn read_message(&self) -> Option<MessageBuffer<'a>> {
        self.with_state(|state| state.rx.pop_front())
    }

    fn run_rx(&self) -> Option<MessageBuffer<'a>> {
        self.with_state(|state| state.completed.pop_front())
    }

    fn run_tx(&self) {
        self.with_state(|state| state.tx_runs += 1);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::pool::MessagePool;

    #[test]
    fn test_asynchronous_completion() {
        let pool = MessagePool::<CriticalSectionRawMutex, 2>::new();
        let transport = MockTransport::new(256);
        transport.set_synchronous(false);

        let msg = pool.alloc().unwrap();
        let index = msg.index();
        assert!(matches!(transport.write_message(msg), WriteStatus::Pending));
        assert_eq!(transport.in_flight(), 1);
        assert!(transport.run_rx().is_none());

        assert!(transport.complete_write());
        let done = transport.run_rx().unwrap();
        assert_eq!(done.index(), index);
        assert_eq!(transport.written().len(), 1);
    }

    #[test]
    fn test_busy_after_write() {
        let pool = MessagePool::<CriticalSectionRawMutex, 1>::new();
        let transport = MockTransport::new(256);
        transport.set_busy_after_write(true);

        let msg = pool.alloc().unwrap();
        assert!(matches!(transport.write_message(msg), WriteStatus::Complete(_)));
        assert!(!transport.is_ready_for_write());
        assert!(!transport.is_ready_for_command());
        assert_eq!(pool.free_count(), 1);
    }
}
