//! Physical transport interface

use crate::message::Message;
use crate::pool::MessageBuffer;

/// Outcome of a physical write
#[derive(Debug)]
pub enum WriteStatus<'a> {
    /// Transmission completed within the call. The buffer is handed back for release.
    Complete(MessageBuffer<'a>),
    /// The transport keeps the buffer until `Transport::run_rx` reports completion
    Pending,
}

/// Capability set of a physical transport (SPI, UART, parallel)
///
/// The link layer calls the readiness predicates and `write_message` inside a critical section,
/// so they must be short and must not call back into the link layer. `prepare_write` runs
/// outside the critical section and may take longer.
///
/// Buffers handed to `write_message` are owned by the transport until it returns them either
/// synchronously or through `run_rx`.
pub trait Transport<'a> {
    /// Largest payload the transport can carry. Must be constant for the driver lifetime.
    fn max_message_size(&self) -> usize;

    /// Whether the peer can accept another command
    fn is_ready_for_command(&self) -> bool;

    /// Whether the write channel is free for any message
    fn is_ready_for_write(&self) -> bool;

    /// Stages the message without transmitting it
    fn prepare_write(&self, _msg: &Message) {}

    fn write_message(&self, msg: MessageBuffer<'a>) -> WriteStatus<'a>;

    /// Takes the next received message
    fn read_message(&self) -> Option<MessageBuffer<'a>>;

    /// Reports a message whose transmission completed asynchronously
    fn run_rx(&self) -> Option<MessageBuffer<'a>>;

    /// Periodic transmit pump
    fn run_tx(&self) {}
}
