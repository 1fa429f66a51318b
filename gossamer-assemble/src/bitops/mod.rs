//! Succinct rank/select bitmap and its supporting packed-storage and
//! checksum primitives.

pub mod crc;
pub mod packed;
pub mod sparse_array;
pub mod varint;

pub use sparse_array::{Builder as SparseArrayBuilder, SparseArray};
