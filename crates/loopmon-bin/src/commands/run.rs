// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use loopmon_config::LoopmonConfig;
use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Executes the `run` command.
pub async fn run(cli: &Cli, config: LoopmonConfig, args: RunArgs) -> BinResult<()> {
    info!(config = %cli.config.display(), "Starting loopmon...");

    let runtime = RuntimeBuilder::new()
        .config(config)
        .servers(args.servers)
        .build()?;

    runtime.run().await
}
