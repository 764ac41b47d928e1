// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # loopmon-bin
//!
//! Command line front end for the loopmon OPC UA connection manager.
//!
//! - CLI argument parsing with clap
//! - Monitor runtime orchestration
//! - Graceful shutdown handling
//! - Logging initialization
//! - Command implementations (run, validate, browse, search, read, version)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                              │
//! │              (config load, logging, dispatch)                │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │    cli.rs   │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └────┬─────┘ └────┬─────┘ └──────────┘
//!             │            │
//!             │     ┌──────▼──────┐
//!             │     │  shutdown   │
//!             │     └─────────────┘
//!             │
//!      ┌──────┴────────────────────┐
//!      │ loopmon-opcua / -config   │
//!      └───────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Monitor every configured server (default command)
//! loopmon
//!
//! # Custom config, two servers only
//! loopmon -c /etc/loopmon/plant.yaml run -s plc-1 -s plc-2
//!
//! # Validate configuration
//! loopmon validate --show-config
//!
//! # Explore a server
//! loopmon browse opc.tcp://plc-1:4840 -n "ns=2;s=Line1"
//! loopmon search opc.tcp://plc-1:4840 Temperature
//! loopmon read opc.tcp://plc-1:4840 "ns=2;s=Line1.Temperature"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{MonitorRuntime, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
