// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Validated execution plans

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::StageDefinition;

/// An ordered, validated sequence of stages with a global deadline
///
/// Plans are only built by [`crate::pipeline::ChainCompiler`], so holding one
/// means every stage's inputs are available when it is reached.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    workflow: String,
    stages: Vec<Arc<StageDefinition>>,
    deadline: Duration,
    resources: BTreeSet<String>,
    fingerprint: String,
}

impl ExecutionPlan {
    pub(crate) fn new(
        workflow: impl Into<String>,
        stages: Vec<Arc<StageDefinition>>,
        deadline: Duration,
    ) -> Self {
        let resources = stages
            .iter()
            .flat_map(|s| s.requires.iter().cloned())
            .collect();
        let fingerprint = fingerprint(&stages, deadline);

        Self {
            workflow: workflow.into(),
            stages,
            deadline,
            resources,
            fingerprint,
        }
    }

    /// Name of the workflow this plan was compiled from
    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn stages(&self) -> &[Arc<StageDefinition>] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Bootstrap resources any stage of the plan requires
    pub fn required_resources(&self) -> &BTreeSet<String> {
        &self.resources
    }

    /// BLAKE3 digest of the stage definitions and deadline
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    stages: Vec<&'a StageDefinition>,
    deadline_secs: u64,
}

fn fingerprint(stages: &[Arc<StageDefinition>], deadline: Duration) -> String {
    let input = FingerprintInput {
        stages: stages.iter().map(AsRef::as_ref).collect(),
        deadline_secs: deadline.as_secs(),
    };

    let mut hasher = blake3::Hasher::new();
    // Serialization of plain maps and strings cannot fail
    if let Ok(json) = serde_json::to_vec(&input) {
        hasher.update(&json);
    }
    hasher.finalize().to_hex().to_string()
}
