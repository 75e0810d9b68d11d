// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Policy command - show who may act on which resource

use miette::Result;
use std::path::PathBuf;

use super::{load_definition, report, OutputFormat};
use crate::config::Settings;
use crate::utils::dimmed;

/// Run the policy command
pub async fn run(pipeline_path: PathBuf, format: OutputFormat, settings: &Settings) -> Result<()> {
    let definition = load_definition(&pipeline_path, settings).map_err(report)?;
    let policy = definition.access_policy();

    match format {
        OutputFormat::Json => {
            let doc = serde_json::to_string_pretty(&policy)
                .map_err(|e| miette::miette!("Failed to serialize policy: {}", e))?;
            println!("{}", doc);
        }
        OutputFormat::Yaml => {
            let doc = serde_yaml::to_string(&policy)
                .map_err(|e| miette::miette!("Failed to serialize policy: {}", e))?;
            print!("{}", doc);
        }
        OutputFormat::Text => {
            if definition.access.is_none() {
                println!("{}", dimmed("# derived from stage declarations"));
            }
            print!("{}", policy.to_table());
        }
    }

    Ok(())
}
