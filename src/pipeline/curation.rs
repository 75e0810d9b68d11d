// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! Built-in data-curation chain
//!
//! Five stages: two independent subsamples of the input table, a schema
//! inspection comparing them, duplicate detection against the search index,
//! and curation, which registers the table and writes data quality rules.

use std::collections::BTreeMap;

use crate::pipeline::{
    ComputeProfile, Context, PipelineDefinition, ResourceDefinition, StageDefinition, Workflow,
    DEFAULT_DEADLINE_SECS,
};

/// Name of the workflow running the full chain
pub const WORKFLOW: &str = "curation";

/// Name of the search index resource
pub const SEARCH_INDEX: &str = "search-index";

/// Stage names in execution order
pub const STAGES: [&str; 5] = [
    "subsample-first",
    "subsample-second",
    "inspect",
    "detect-duplicates",
    "curate",
];

/// Keys the caller must supply to run the chain
pub const REQUIRED_INPUTS: [&str; 3] = ["S3Input", "S3InputDQDL", "TableName"];

/// Output keys the chain fills in
pub const OUTPUT_KEYS: [&str; 7] = [
    "S3OutputFirst",
    "S3OutputSecond",
    "S3OutputSchema1",
    "S3OutputSchema2",
    "S3OutputDupRank",
    "S3OutputTableDesc",
    "S3OutputDQDL",
];

/// Launch parameters shared by the built-in stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurationOptions {
    pub num_rows: u32,
    pub glue_catalog: String,
    pub search_endpoint: String,
    pub index_name: String,
    pub image_prefix: String,
}

impl Default for CurationOptions {
    fn default() -> Self {
        Self {
            num_rows: 100,
            glue_catalog: "curated".into(),
            search_endpoint: "https://localhost:9200".into(),
            index_name: "table-descriptions".into(),
            image_prefix: "curaflow".into(),
        }
    }
}

/// The chain with default options
pub fn definition() -> PipelineDefinition {
    definition_with(&CurationOptions::default())
}

/// The chain with explicit options
pub fn definition_with(options: &CurationOptions) -> PipelineDefinition {
    let image = |name: &str| format!("{}/{}:latest", options.image_prefix, name);
    let num_rows = options.num_rows.to_string();

    let heavy = ComputeProfile {
        cpu: 2048,
        memory_mib: 8192,
        ephemeral_storage_gib: 50,
    };

    let stages = vec![
        StageDefinition::new("subsample-first", image("subsampler"))
            .with_description("Draw a first random sample of the input table")
            .input("S3Input", "S3_INPUT")
            .output("S3OutputFirst", "S3_OUTPUT")
            .param("NUM_ROWS", num_rows.clone()),
        StageDefinition::new("subsample-second", image("subsampler"))
            .with_description("Draw a second, independent sample")
            .input("S3Input", "S3_INPUT")
            .output("S3OutputSecond", "S3_OUTPUT")
            .param("NUM_ROWS", num_rows.clone()),
        StageDefinition::new("inspect", image("inspector"))
            .with_description("Infer a schema from each sample and reconcile them")
            .input("S3OutputFirst", "S3_INPUT_1")
            .input("S3OutputSecond", "S3_INPUT_2")
            .output("S3OutputSchema1", "S3_OUTPUT_1")
            .output("S3OutputSchema2", "S3_OUTPUT_2"),
        StageDefinition::new("detect-duplicates", image("dupdetector"))
            .with_description("Describe the table and rank similar tables in the index")
            .input("S3OutputSchema2", "S3_INPUT")
            .output("S3OutputDupRank", "S3_OUTPUT")
            .output("S3OutputTableDesc", "S3_OUTPUT_DESC")
            .param("OSS_DOMAIN_ENDPOINT", options.search_endpoint.clone())
            .param("OSS_INDEX_NAME", options.index_name.clone())
            .requires(SEARCH_INDEX),
        StageDefinition::new("curate", image("curator"))
            .with_description("Register the table, index its description and write quality rules")
            .with_compute(heavy)
            .input("S3Input", "S3_INPUT_DATA")
            .input("S3OutputSchema2", "S3_INPUT_SCHEMA")
            .input("S3OutputTableDesc", "S3_INPUT_DESC")
            .input("S3InputDQDL", "S3_INPUT_DQDL")
            .input("TableName", "TABLE_NAME")
            .output("S3OutputDQDL", "S3_OUTPUT_DQDL")
            .param("GLUE_CATALOG", options.glue_catalog.clone())
            .param("NUM_ROWS", num_rows)
            .param("OSS_DOMAIN_ENDPOINT", options.search_endpoint.clone())
            .param("OSS_INDEX_NAME", options.index_name.clone())
            .requires(SEARCH_INDEX),
    ];

    let mut workflows = BTreeMap::new();
    workflows.insert(
        WORKFLOW.to_string(),
        Workflow {
            description: Some("Full curation chain".into()),
            stages: STAGES.iter().map(|s| s.to_string()).collect(),
            inputs: REQUIRED_INPUTS.iter().map(|s| s.to_string()).collect(),
            deadline_secs: None,
        },
    );
    workflows.insert(
        "inspect-only".to_string(),
        Workflow {
            description: Some("Sample and inspect without touching the search index".into()),
            stages: STAGES[..3].iter().map(|s| s.to_string()).collect(),
            inputs: vec!["S3Input".into()],
            deadline_secs: Some(15 * 60),
        },
    );

    PipelineDefinition {
        version: "1".into(),
        name: "data-curation".into(),
        description: Some("Subsample, inspect, deduplicate and curate a tabular dataset".into()),
        deadline_secs: DEFAULT_DEADLINE_SECS,
        stages,
        workflows,
        resources: vec![ResourceDefinition {
            name: SEARCH_INDEX.into(),
            index: options.index_name.clone(),
            dimension: 1536,
        }],
        access: None,
    }
}

/// Initial context for one table: inputs plus empty output placeholders
pub fn initial_context(input: &str, dqdl: &str, table: &str) -> Context {
    OUTPUT_KEYS
        .iter()
        .map(|k| (*k, ""))
        .chain([("S3Input", input), ("S3InputDQDL", dqdl), ("TableName", table)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ChainCompiler, StageRegistry};

    #[test]
    fn test_definition_registers_cleanly() {
        let registry = StageRegistry::from_definition(&definition()).unwrap();
        assert_eq!(registry.len(), 5);
        assert!(registry.lookup("curate").unwrap().requires.contains(&SEARCH_INDEX.to_string()));
    }

    #[test]
    fn test_full_chain_compiles() {
        let definition = definition();
        let registry = StageRegistry::from_definition(&definition).unwrap();
        let context = initial_context("s3://in/data.csv", "s3://in/dqdl.txt", "mytable");

        let plan = ChainCompiler::new(&registry)
            .compile_workflow(&definition, WORKFLOW, &context.keys())
            .unwrap();

        assert_eq!(plan.stage_names(), STAGES.to_vec());
        assert_eq!(plan.required_resources().len(), 1);
        assert_eq!(plan.deadline().as_secs(), DEFAULT_DEADLINE_SECS);
    }

    #[test]
    fn test_inspect_only_needs_no_index() {
        let definition = definition();
        let registry = StageRegistry::from_definition(&definition).unwrap();
        let context = Context::new().with("S3Input", "s3://in/data.csv");

        let plan = ChainCompiler::new(&registry)
            .compile_workflow(&definition, "inspect-only", &context.keys())
            .unwrap();

        assert!(plan.required_resources().is_empty());
        assert_eq!(plan.deadline().as_secs(), 900);
    }

    #[test]
    fn test_curation_without_table_name_is_rejected() {
        let definition = definition();
        let registry = StageRegistry::from_definition(&definition).unwrap();
        let context = initial_context("a", "x", "mytable");
        let mut keys = context.keys();
        keys.remove("TableName");

        let result = ChainCompiler::new(&registry).compile_workflow(&definition, WORKFLOW, &keys);
        assert!(matches!(
            result,
            Err(crate::errors::CuraflowError::MissingInput { ref stage, ref key })
                if stage == "curate" && key == "TableName"
        ));
    }

    #[test]
    fn test_options_flow_into_params() {
        let options = CurationOptions {
            search_endpoint: "https://search.internal".into(),
            index_name: "tables-v2".into(),
            ..Default::default()
        };
        let definition = definition_with(&options);

        let curate = definition.get_stage("curate").unwrap();
        assert_eq!(curate.params["OSS_DOMAIN_ENDPOINT"], "https://search.internal");
        assert_eq!(definition.resource(SEARCH_INDEX).unwrap().index, "tables-v2");
    }

    #[test]
    fn test_yaml_round_trip_keeps_chain() {
        let yaml = definition().to_yaml().unwrap();
        let parsed = PipelineDefinition::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.stages, definition().stages);
        assert_eq!(parsed.workflow(WORKFLOW).unwrap().stages, STAGES.to_vec());
    }
}
