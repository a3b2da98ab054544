//! This library crate turns a publish/subscribe message broker into a request/reply transport.
//!
//! A caller publishes a request carrying a fresh correlation id and suspends until the correlated
//! response arrives on a private reply queue or the configured timeout elapses. The low-level
//! building blocks live in the [`library`] module while [`constants`] and [`options`] hold the
//! defaults and command line options shared with the `correlate` binary.

#![deny(missing_docs)]

pub mod constants;
pub mod library;
pub mod options;
