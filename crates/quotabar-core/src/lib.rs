//! Core library for quotabar.
//!
//! Captures the terminal transcript of `claude /usage` through a PTY and
//! turns it into structured quota records.

pub mod config;
pub mod usage;
