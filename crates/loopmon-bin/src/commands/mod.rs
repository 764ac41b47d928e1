// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Connect the configured servers and monitor their tags
//! - `validate`: Validate configuration file
//! - `version`: Show version information
//! - `browse`, `search`, `read`: One-shot queries against a live server

mod explore;
mod run;
mod validate;
mod version;

pub use explore::{browse, read, search};
pub use run::run;
pub use validate::validate;
pub use version::version;

use loopmon_config::{ConfigError, ConfigResult, LoopmonConfig};

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the appropriate command based on CLI arguments.
///
/// `config` is the outcome of loading `cli.config`. `run` and `validate`
/// need it; the one-shot queries fall back to defaults when the file is
/// missing.
pub async fn execute(cli: Cli, config: ConfigResult<LoopmonConfig>) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, config?, args).await,
        Commands::Validate(args) => validate::validate(&cli, config, args),
        Commands::Version => version::version(&cli),
        Commands::Browse(args) => explore::browse(&cli, optional(config)?, args).await,
        Commands::Search(args) => explore::search(&cli, optional(config)?, args).await,
        Commands::Read(args) => explore::read(&cli, optional(config)?, args).await,
    }
}

/// A missing file is not an error for commands that can run on defaults.
fn optional(config: ConfigResult<LoopmonConfig>) -> ConfigResult<Option<LoopmonConfig>> {
    match config {
        Ok(config) => Ok(Some(config)),
        Err(ConfigError::FileNotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
