mod circular_queue;

pub use circular_queue::{CircularQueue, Underflow};
