//! Sprig benchmarking suite
//!
//! Benchmarks for graph walking, archive hashing and package installs, with
//! the fixtures they share.

pub mod common;

pub use common::*;
