// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Declarative access policy
//!
//! Records which principal may perform which action on which resource. The
//! engine never enforces it; it is handed to whatever provisions the real
//! permissions, and checked for consistency against the declared stages.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::pipeline::PipelineDefinition;

/// Principal prefix used for stage task roles
pub const STAGE_PRINCIPAL_PREFIX: &str = "stage:";

/// Principal of the bootstrap handler
pub const BOOTSTRAP_PRINCIPAL: &str = "bootstrap";

/// Resource standing for the object store holding datasets and artifacts
pub const DATA_BUCKET: &str = "data-bucket";

/// Action matching every action on a resource
pub const ANY_ACTION: &str = "*";

/// principal -> resource -> actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessPolicy {
    grants: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `actions` on `resource` to `principal`
    #[must_use]
    pub fn grant<I, S>(mut self, principal: &str, resource: &str, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(principal.to_string())
            .or_default()
            .entry(resource.to_string())
            .or_default()
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Whether `principal` may perform `action` on `resource`
    pub fn permits(&self, principal: &str, resource: &str, action: &str) -> bool {
        self.grants
            .get(principal)
            .and_then(|resources| resources.get(resource))
            .map(|actions| actions.contains(action) || actions.contains(ANY_ACTION))
            .unwrap_or(false)
    }

    pub fn principals(&self) -> Vec<&str> {
        self.grants.keys().map(String::as_str).collect()
    }

    /// Resources and actions granted to one principal
    pub fn grants_for(&self, principal: &str) -> Option<&BTreeMap<String, BTreeSet<String>>> {
        self.grants.get(principal)
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Stage principals naming a stage that doesn't exist
    pub fn unknown_stage_principals<'a, I>(&self, stages: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let known: BTreeSet<&str> = stages.into_iter().collect();
        self.grants
            .keys()
            .filter_map(|p| p.strip_prefix(STAGE_PRINCIPAL_PREFIX))
            .filter(|stage| !known.contains(stage))
            .map(String::from)
            .collect()
    }

    /// Policy implied by the stage and resource declarations
    ///
    /// Every stage reads and writes the data bucket, stages requiring a
    /// resource read and write it, and the bootstrap handler may create,
    /// delete and describe every resource.
    pub fn derived_from(definition: &PipelineDefinition) -> Self {
        let mut policy = Self::new();

        for stage in &definition.stages {
            let principal = format!("{}{}", STAGE_PRINCIPAL_PREFIX, stage.name);
            policy = policy.grant(&principal, DATA_BUCKET, ["read", "write"]);
            for resource in &stage.requires {
                policy = policy.grant(&principal, resource, ["read", "write"]);
            }
        }

        for resource in &definition.resources {
            policy = policy.grant(
                BOOTSTRAP_PRINCIPAL,
                &resource.name,
                ["create", "delete", "describe"],
            );
        }

        policy
    }

    /// Render as an aligned text table
    pub fn to_table(&self) -> String {
        let width = self.grants.keys().map(String::len).max().unwrap_or(0);
        let mut out = String::new();

        for (principal, resources) in &self.grants {
            for (resource, actions) in resources {
                let actions: Vec<&str> = actions.iter().map(String::as_str).collect();
                out.push_str(&format!(
                    "{:width$}  {}  [{}]\n",
                    principal,
                    resource,
                    actions.join(", "),
                    width = width
                ));
            }
        }

        out
    }
}
