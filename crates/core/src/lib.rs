// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-core: Shared protocol types for the tether connection manager
//!
//! This crate provides the wire records, newline-delimited framing and the
//! connection state model shared by the client library, the CLI and the
//! stub agent.

pub mod error;
pub mod jsonl;
pub mod protocol;
pub mod state;

pub use error::{Error, Result};
pub use protocol::{ClientRequest, InboundRecord, RpcErrorBody, RpcResponse, ServerEvent};
pub use state::{ConnectionState, Endpoint};
