//! CrissCross Guard - Exactly-once command admission
//!
//! Clients retry over an at-least-once transport. Each actor numbers its
//! commands per scope, and the guard admits a command only if its number
//! is above the last one accepted in that scope.

pub mod table;

pub use table::*;
