/// Private interfaces between pool, buffer handles and the stack
///
/// Drivers should not use this module.
/// Backward-incompatible changes can be made without major version bump.
use crate::pool::{BufferStatus, MessageBuffer};

pub trait DynamicPool {
    fn release(&self, index: u8);
    fn set_status(&self, index: u8, status: BufferStatus);
    fn status(&self, index: u8) -> BufferStatus;
}

/// Type-erased allocation side of a pool
pub trait DynamicAlloc {
    fn alloc_buffer(&self) -> Option<MessageBuffer<'_>>;
    fn free_count(&self) -> usize;
}
