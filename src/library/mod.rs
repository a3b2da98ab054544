//! Independent and project agnostic libraries
//!
//! Ideally, any of the submodules in this module can be extracted into their own crate
//! at any given time. Broker specifics are hidden behind the traits in
//! [`communication::broker`] so that everything above it works with any backend.

pub mod communication;
pub mod helpers;

/// Generic error type
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result with no value and a [`BoxedError`]
pub type EmptyResult = Result<(), BoxedError>;
