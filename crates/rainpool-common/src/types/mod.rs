//! Core types for Rainpool

pub mod capital;
pub mod fees;
pub mod ids;

/// Token amount in the smallest unit of the single settlement token
pub type Amount = u64;
