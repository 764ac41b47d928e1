// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use loopmon_config::{ConfigResult, LoopmonConfig};
use loopmon_opcua::SecurityMode;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command.
///
/// Loading already validated the file; this reports the outcome and a few
/// non-fatal warnings.
pub fn validate(cli: &Cli, config: ConfigResult<LoopmonConfig>, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;
    let config = config
        .map_err(|e| BinError::from(e).with_context("Configuration validation failed"))?;

    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Servers: {}", config.servers.len());
            println!("  Tags: {}", config.tag_count());
            println!("  Sink: {:?}", config.sink.kind);
            println!(
                "  Reconnect: base {:?}, max {:?}, attempts {}",
                config.opcua.reconnect.base_delay,
                config.opcua.reconnect.max_delay,
                match config.opcua.reconnect.max_retry_attempts {
                    0 => "unlimited".to_string(),
                    n => n.to_string(),
                }
            );
            for server in &config.servers {
                println!(
                    "  - {} {} ({}/{}, {} tags)",
                    server.name,
                    server.endpoint_url,
                    server.security_mode,
                    server.security_policy,
                    server.tags.len()
                );
            }

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "server_count": config.servers.len(),
                    "tag_count": config.tag_count(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn collect_warnings(config: &LoopmonConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.servers.is_empty() {
        warnings.push("No servers configured".to_string());
    }
    for server in &config.servers {
        if server.tags.is_empty() {
            warnings.push(format!("Server '{}' has no tags", server.name));
        }
        if server.security_mode == SecurityMode::None {
            warnings.push(format!("Server '{}' uses no message security", server.name));
        }
    }
    if config.opcua.reconnect.max_retry_attempts == 0 {
        warnings.push("Reconnection retries forever (max_retry_attempts = 0)".to_string());
    }

    warnings
}
