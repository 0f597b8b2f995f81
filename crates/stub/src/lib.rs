// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal WebSocket agent speaking the tether wire format.
//!
//! Answers `system.ping`, `session.watch`, `session.unwatch` and `echo`,
//! pushes periodic heartbeats, and routes session events to the sockets
//! watching them. [`TestServer`] runs it in-process for integration tests.

pub mod server;
pub mod state;
pub mod test_server;

pub use server::{run, serve, ServeOptions};
pub use state::StubState;
pub use test_server::TestServer;
