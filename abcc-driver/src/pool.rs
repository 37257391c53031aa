//! Fixed-capacity message buffer pool

use core::cell::{RefCell, UnsafeCell};
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::internal::{DynamicAlloc, DynamicPool};
use crate::message::Message;

/// Buffer life-cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferStatus {
    Free,
    Allocated,
    /// Handed to the link layer for transmission
    Sent,
}

/// Pool of `N` message buffers
///
/// Buffers are handed out as owning `MessageBuffer` handles. Dropping a handle returns the
/// buffer to the pool, so a buffer can not leak or be freed twice.
pub struct MessagePool<M: RawMutex, const N: usize> {
    buffers: [UnsafeCell<Message>; N],
    state: Mutex<M, RefCell<PoolState<N>>>,
}

struct PoolState<const N: usize> {
    status: [BufferStatus; N],
    free: Vec<u8, N>,
}

impl<M: RawMutex + Sync, const N: usize> MessagePool<M, N> {
    const _ASSERT: usize = u8::MAX as usize + 1 - N;

    pub fn new() -> Self {
        let _ = Self::_ASSERT;
        let mut free = Vec::new();
        for idx in (0..N).rev() {
            unwrap!(free.push(unwrap!(u8::try_from(idx))));
        }

        Self {
            buffers: core::array::from_fn(|_| UnsafeCell::new(Message::new())),
            state: Mutex::new(RefCell::new(PoolState {
                status: [BufferStatus::Free; N],
                free,
            })),
        }
    }

    /// Takes a buffer with a cleared header
    pub fn alloc(&self) -> Option<MessageBuffer<'_>> {
        let index = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let index = state.free.pop()?;
            state.status[usize::from(index)] = BufferStatus::Allocated;
            Some(index)
        })?;

        let ptr = self.buffers[usize::from(index)].get();
        // Safety: UnsafeCell::get never returns null
        let msg = unsafe { NonNull::new_unchecked(ptr) };
        let mut buffer = MessageBuffer {
            pool: self,
            index,
            msg,
        };
        buffer.clear_header();
        Some(buffer)
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn free_count(&self) -> usize {
        self.state.lock(|cell| cell.borrow().free.len())
    }

    /// Number of buffers in `status`
    pub fn count(&self, status: BufferStatus) -> usize {
        self.state.lock(|cell| {
            cell.borrow()
                .status
                .iter()
                .filter(|&&current| current == status)
                .count()
        })
    }
}

impl<M: RawMutex + Sync, const N: usize> Default for MessagePool<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const N: usize> DynamicPool for MessagePool<M, N> {
    fn release(&self, index: u8) {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let status = &mut state.status[usize::from(index)];
            assert!(*status != BufferStatus::Free);
            *status = BufferStatus::Free;
            unwrap!(state.free.push(index));
        });
    }

    fn set_status(&self, index: u8, status: BufferStatus) {
        self.state
            .lock(|cell| cell.borrow_mut().status[usize::from(index)] = status);
    }

    fn status(&self, index: u8) -> BufferStatus {
        self.state.lock(|cell| cell.borrow().status[usize::from(index)])
    }
}

impl<M: RawMutex + Sync, const N: usize> DynamicAlloc for MessagePool<M, N> {
    fn alloc_buffer(&self) -> Option<MessageBuffer<'_>> {
        self.alloc()
    }

    fn free_count(&self) -> usize {
        MessagePool::free_count(self)
    }
}

// Safety: a buffer is only reachable through the unique handle that allocated it
unsafe impl<M: RawMutex + Sync, const N: usize> Sync for MessagePool<M, N> {}

/// Owning handle to a pool buffer
pub struct MessageBuffer<'a> {
    pool: &'a (dyn DynamicPool + Sync),
    index: u8,
    msg: NonNull<Message>,
}

impl<'a> MessageBuffer<'a> {
    /// Buffer identity within its pool
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn status(&self) -> BufferStatus {
        self.pool.status(self.index)
    }

    pub fn mark_sent(&self) {
        self.pool.set_status(self.index, BufferStatus::Sent);
    }
}

impl Deref for MessageBuffer<'_> {
    type Target = Message;

    fn deref(&self) -> &Message {
        // Safety: the handle is the only reference to the buffer
        unsafe { self.msg.as_ref() }
    }
}

impl DerefMut for MessageBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Message {
        // Safety: the handle is the only reference to the buffer
        unsafe { self.msg.as_mut() }
    }
}

impl Drop for MessageBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl core::fmt::Debug for MessageBuffer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("index", &self.index)
            .field("msg", self.deref())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MessageBuffer<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "#{} {}", self.index, self.deref())
    }
}

// Safety: the handle owns the buffer exclusively, the pool is Sync
unsafe impl Send for MessageBuffer<'_> {}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Pool = MessagePool<CriticalSectionRawMutex, 3>;

    #[test]
    fn test_alloc_until_exhausted() {
        let pool = Pool::new();
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        let c = pool.alloc().unwrap();
        assert!(pool.alloc().is_none());
        assert_eq!(pool.free_count(), 0);
        assert_ne!(a.index(), b.index());
        assert_ne!(b.index(), c.index());

        drop(b);
        assert_eq!(pool.free_count(), 1);
        assert!(pool.alloc().is_some());
    }

    #[test]
    fn test_status_tracking() {
        let pool = Pool::new();
        let buffer = pool.alloc().unwrap();
        assert_eq!(buffer.status(), BufferStatus::Allocated);
        buffer.mark_sent();
        assert_eq!(buffer.status(), BufferStatus::Sent);

        let index = buffer.index();
        drop(buffer);
        assert_eq!(pool.status(index), BufferStatus::Free);
    }

    #[test]
    fn test_alloc_clears_header() {
        let pool = MessagePool::<CriticalSectionRawMutex, 1>::new();
        let mut buffer = pool.alloc().unwrap();
        buffer.set_source_id(9);
        buffer.set_data_size(5);
        drop(buffer);

        let buffer = pool.alloc().unwrap();
        assert_eq!(buffer.source_id(), 0);
        assert_eq!(buffer.data_size(), 0);
    }
}
