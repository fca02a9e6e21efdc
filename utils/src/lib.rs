//! Shared infrastructure utilities for switchwatch.
//!
//! - **`atomic_write`**: crash-safe whole-file replacement (temp + rename)

pub mod atomic_write;

pub use atomic_write::{
    AtomicWriteOptions, atomic_write, atomic_write_and_open, atomic_write_with,
};
