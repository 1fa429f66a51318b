//! Concurrency primitives: a blocking bounded MPMC queue, a fixed-size
//! worker pool built on it, a concurrent cuckoo k-mer counter, and a
//! parallel MSB radix sort.

pub mod backyard_hash;
pub mod blended_sort;
pub mod bounded_queue;
pub mod work_queue;

pub use backyard_hash::BackyardHash;
pub use bounded_queue::BoundedQueue;
pub use work_queue::WorkQueue;
