//! Driver error reporting
//!
//! Failing operations return typed errors to the caller and, at the same time, report an
//! `ErrorInfo` to the driver-wide `ErrorLog`. A `Fatal` report latches the log into the faulted
//! state, which stops normal driver operation until an explicit restart.

use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCode {
    InternalError,
    CmdQueueFull,
    RespQueueFull,
    OutOfMsgBuffers,
    TryingToFreeNullPointer,
    IncorrectState,
    /// Outgoing message exceeds the transport limit
    WrMsgSizeError,
    /// Response without a registered handler
    InvalidRespSourceId,
    /// Handler table is full
    NoResources,
    /// Handler already registered for the source id
    SourceIdInUse,
    /// Dispatch table entry does not fit the command
    UnsupportedDataType,
    AssertFailed,
    /// Response carries the error bit
    RespMsgEBitSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Severity {
    Information,
    Warning,
    /// Terminal until the driver is restarted
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub severity: Severity,
    /// Code specific detail, e.g. the offending source id
    pub add_info: u32,
}

/// Error sink used by the link layer and the driver
pub trait DynamicErrorLog {
    fn report(&self, severity: Severity, code: ErrorCode, add_info: u32);
    fn is_faulted(&self) -> bool;
    fn clear_fault(&self);
}

/// Bounded log of the last `N` reported errors
///
/// When the log is full, a new entry replaces the newest one, so the oldest entries describing
/// the initial failure are kept.
pub struct ErrorLog<M: RawMutex, const N: usize>(Mutex<M, RefCell<Inner<N>>>);

struct Inner<const N: usize> {
    entries: Vec<ErrorInfo, N>,
    faulted: bool,
    on_error: Option<fn(&ErrorInfo)>,
}

impl<M: RawMutex, const N: usize> ErrorLog<M, N> {
    const _ASSERT: usize = N - 1;

    /// `on_error` is called after each report, outside the critical section
    pub fn new(on_error: Option<fn(&ErrorInfo)>) -> Self {
        let _ = Self::_ASSERT;
        Self(Mutex::new(RefCell::new(Inner {
            entries: Vec::new(),
            faulted: false,
            on_error,
        })))
    }

    pub fn last(&self) -> Option<ErrorInfo> {
        self.0.lock(|cell| cell.borrow().entries.last().copied())
    }

    pub fn entries(&self) -> Vec<ErrorInfo, N> {
        self.0.lock(|cell| cell.borrow().entries.clone())
    }

    pub fn clear(&self) {
        self.0.lock(|cell| {
            let mut inner = cell.borrow_mut();
            inner.entries.clear();
            inner.faulted = false;
        });
    }
}

impl<M: RawMutex, const N: usize> Default for ErrorLog<M, N> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<M: RawMutex, const N: usize> DynamicErrorLog for ErrorLog<M, N> {
    fn report(&self, severity: Severity, code: ErrorCode, add_info: u32) {
        match severity {
            Severity::Information => info!("driver info {:?} ({})", code, add_info),
            Severity::Warning => warn!("driver warning {:?} ({})", code, add_info),
            Severity::Fatal => error!("driver fatal error {:?} ({})", code, add_info),
        }

        let info = ErrorInfo {
            code,
            severity,
            add_info,
        };
        let on_error = self.0.lock(|cell| {
            let mut inner = cell.borrow_mut();
            if inner.entries.is_full() {
                inner.entries.pop();
            }
            unwrap!(inner.entries.push(info));
            if severity == Severity::Fatal {
                inner.faulted = true;
            }
            inner.on_error
        });

        if let Some(on_error) = on_error {
            on_error(&info);
        }

        #[cfg(feature = "halt-on-fatal")]
        if severity == Severity::Fatal {
            panic!("halted on fatal driver error {:?}", code);
        }
    }

    fn is_faulted(&self) -> bool {
        self.0.lock(|cell| cell.borrow().faulted)
    }

    fn clear_fault(&self) {
        self.0.lock(|cell| cell.borrow_mut().faulted = false);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_last_slot_overwritten() {
        let log = ErrorLog::<CriticalSectionRawMutex, 2>::default();
        log.report(Severity::Warning, ErrorCode::CmdQueueFull, 1);
        log.report(Severity::Warning, ErrorCode::RespQueueFull, 2);
        log.report(Severity::Information, ErrorCode::InvalidRespSourceId, 3);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, ErrorCode::CmdQueueFull);
        assert_eq!(entries[1].code, ErrorCode::InvalidRespSourceId);
        assert_eq!(log.last().unwrap().add_info, 3);
        assert!(!log.is_faulted());
    }

    #[test]
    fn test_fatal_latches_fault() {
        let log = ErrorLog::<CriticalSectionRawMutex, 1>::default();
        log.report(Severity::Fatal, ErrorCode::AssertFailed, 0);
        assert!(log.is_faulted());

        log.report(Severity::Warning, ErrorCode::NoResources, 0);
        assert!(log.is_faulted());

        log.clear();
        assert!(!log.is_faulted());
        assert!(log.last().is_none());
    }

    #[test]
    fn test_callback_invoked() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn on_error(info: &ErrorInfo) {
            assert_eq!(info.code, ErrorCode::OutOfMsgBuffers);
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let log = ErrorLog::<CriticalSectionRawMutex, 1>::new(Some(on_error));
        log.report(Severity::Warning, ErrorCode::OutOfMsgBuffers, 0);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
