//! Queue module: the bounded FIFO that sits between producers and the worker.

mod bounded;

pub use bounded::{MAX_CAPACITY, WorkQueue};
