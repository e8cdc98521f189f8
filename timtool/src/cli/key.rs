/*
 * SPDX-FileCopyrightText: 2025 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tracing::info;

use crate::crypto;

pub fn key_main(cli: &KeyCli) -> Result<()> {
    match &cli.command {
        KeyCommand::GenerateEc521(c) => {
            let private_key = crypto::generate_ec521_private_key(&mut OsRng)
                .context("Failed to generate P-521 private key")?;

            if let Some(path) = &c.output {
                crypto::write_ec521_private_key_file(path, &private_key)
                    .with_context(|| format!("Failed to write private key: {path:?}"))?;

                info!("Wrote private key: {path:?}");
            } else {
                println!("{private_key}");
            }
        }
    }

    Ok(())
}

/// Generate a P-521 ECDSA private key for signing trusted flash images.
///
/// The key is printed as a decimal integer. When writing to a file, the file
/// is created with permissions that only allow access by the current user.
#[derive(Debug, Parser)]
struct GenerateEc521Cli {
    /// Path to output private key. Prints to stdout if unset.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum KeyCommand {
    #[command(name = "generate-ec521")]
    GenerateEc521(GenerateEc521Cli),
}

/// Generate signing keys.
#[derive(Debug, Parser)]
pub struct KeyCli {
    #[command(subcommand)]
    command: KeyCommand,
}
