//! abcc driver interface
//!
//! The crate provides an interface between an Anybus CompactCom transport driver and the abcc
//! stack. Limited scope facilitates compatibility across versions.
//! Transport crates should depend on this crate. Stack users should depend on the `abcc` crate
//! instead.
//!
//! The interface consists of:
//! * `Message`, the fixed wire layout of requests and responses with field accessors
//! * `MessagePool`, a fixed-capacity allocator of message buffers
//! * `Transport`, the capability set a physical medium implements
//!
//! Message buffers move by value. A buffer handed to the transport belongs to it until the
//! transport reports the transmission complete, either directly from `write_message` or later
//! from `run_rx`. Dropping a buffer returns it to its pool.
//!
//! The `testing` feature enables `testing::MockTransport`, a scriptable in-memory transport.

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod internal;
pub mod message;
pub mod pool;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
