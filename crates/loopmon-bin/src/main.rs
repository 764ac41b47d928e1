// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! loopmon - OPC UA connection and subscription manager.

use loopmon_bin::error::report_error_and_exit;
use loopmon_bin::{commands, init_logging, Cli};
use loopmon_config::{ConfigLoader, LoggingConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    // Logging settings may come from the file, so load it before anything logs.
    let config = ConfigLoader::new().load(&cli.config);
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_else(|_| LoggingConfig::default());

    init_logging(
        &cli.effective_log_level(logging.level),
        cli.effective_log_format(logging.format),
    );

    if let Err(e) = commands::execute(cli, config).await {
        report_error_and_exit(e);
    }
}
