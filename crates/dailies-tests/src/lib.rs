//! Integration test crate for Dailies.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives a live scheduler task with scripted playheads and
//! collaborators to verify the presentation pipeline end to end.

#[cfg(test)]
mod harness;

#[cfg(test)]
mod scheduler;
