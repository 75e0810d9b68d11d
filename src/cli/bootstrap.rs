// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Bootstrap command - drive search index lifecycle events

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{load_definition, report, search_index, BootstrapAction};
use crate::bootstrap::{BootstrapEvent, BootstrapHandler, BootstrapOutcome};
use crate::config::Settings;
use crate::errors::CuraflowError;
use crate::pipeline::PipelineDefinition;
use crate::utils::{create_spinner, print_error, print_info, print_success, resource_state};

/// Run the bootstrap command
pub async fn run(pipeline_path: PathBuf, action: BootstrapAction, settings: &Settings) -> Result<()> {
    let definition = load_definition(&pipeline_path, settings).map_err(report)?;

    if definition.resources.is_empty() {
        print_info("Pipeline declares no bootstrap resources");
        return Ok(());
    }

    let handler = BootstrapHandler::new(search_index(settings).map_err(report)?, &definition.resources);
    handler.refresh().await.map_err(report)?;

    let (event, resource) = match action {
        BootstrapAction::Status => return print_statuses(&handler).await,
        BootstrapAction::Create { resource } => (BootstrapEvent::Create, resource),
        BootstrapAction::Update { resource } => (BootstrapEvent::Update, resource),
        BootstrapAction::Delete { resource } => (BootstrapEvent::Delete, resource),
    };

    let targets = select_resources(&definition, resource)?;
    let mut failure = None;

    for name in &targets {
        let verb = match event {
            BootstrapEvent::Create => "Creating",
            BootstrapEvent::Update => "Updating",
            BootstrapEvent::Delete => "Deleting",
        };
        let spinner = create_spinner(&format!("{} {}", verb, name));
        let outcome = handler.apply(name, event).await?;
        spinner.finish_and_clear();

        match outcome {
            BootstrapOutcome::Success => {
                let state = handler.state(name).await?;
                print_success(&format!("{} is {}", name, state));
            }
            BootstrapOutcome::Failure { message } => {
                print_error(&format!("{}: {}", name, message));
                failure = Some(CuraflowError::BootstrapFailed {
                    resource: name.clone(),
                    message,
                });
            }
            BootstrapOutcome::InProgress => print_info(&format!("{} is busy", name)),
        }
    }

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn select_resources(
    definition: &PipelineDefinition,
    resource: Option<String>,
) -> Result<Vec<String>, CuraflowError> {
    match resource {
        Some(name) if definition.resource(&name).is_some() => Ok(vec![name]),
        Some(name) => Err(CuraflowError::UnknownResource { resource: name }),
        None => Ok(definition.resources.iter().map(|r| r.name.clone()).collect()),
    }
}

async fn print_statuses(handler: &BootstrapHandler) -> Result<()> {
    for status in handler.statuses().await {
        println!(
            "  {:<16} {:<24} {}",
            status.name.bold(),
            status.index,
            resource_state(status.state)
        );
        if let Some(error) = status.last_error {
            println!("  {:<16} {}", "", error.red());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::curation;

    #[test]
    fn test_select_resources() {
        let definition = curation::definition();

        assert_eq!(
            select_resources(&definition, None).unwrap(),
            vec![curation::SEARCH_INDEX.to_string()]
        );
        assert!(matches!(
            select_resources(&definition, Some("nope".into())),
            Err(CuraflowError::UnknownResource { .. })
        ));
    }
}
