//! Srot: session and task gating for the screen recorder
//!
//! A user logs in, enters a task id, both are checked against the remote
//! authority, and only then does a countdown run and the recorder start.

mod session;

pub use session::*;

pub mod config;
pub mod console;
pub mod controller;
pub mod countdown;
pub mod launcher;
pub mod remote;
pub mod store;
