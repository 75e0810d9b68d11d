// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 curaflow contributors

//! DAG (Directed Acyclic Graph) builder for stage dependencies
//!
//! Edges come from explicit `depends_on` entries and from context keys. A
//! stage that reads a key depends on the producer whose value it sees: the
//! last producer declared before it, or the original producer when none is.
//! A stage that overwrites a key runs after the previous producer and after
//! every stage that read the previous value.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::CuraflowError;
use crate::pipeline::StageDefinition;

/// Builder for stage dependency DAGs
pub struct DagBuilder {
    graph: DiGraph<usize, ()>,
    stages: Vec<Arc<StageDefinition>>,
    name_to_index: HashMap<String, NodeIndex>,
    index_to_name: HashMap<NodeIndex, String>,
}

impl DagBuilder {
    /// Create a new DAG builder
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            stages: Vec::new(),
            name_to_index: HashMap::new(),
            index_to_name: HashMap::new(),
        }
    }

    /// Build a DAG over a set of stages
    pub fn build(stages: &[Arc<StageDefinition>]) -> Result<Self, CuraflowError> {
        let mut builder = Self::new();
        builder.stages = stages.to_vec();

        // Add all stages as nodes
        for (idx, stage) in stages.iter().enumerate() {
            let node = builder.graph.add_node(idx);
            builder.name_to_index.insert(stage.name.clone(), node);
            builder.index_to_name.insert(node, stage.name.clone());
        }

        // Producers of each context key: the original first, then the
        // overwriting stages in declaration order
        let mut producers: HashMap<&str, Vec<(usize, NodeIndex)>> = HashMap::new();
        for (pos, stage) in stages.iter().enumerate() {
            let node = builder.name_to_index[&stage.name];
            for key in stage.outputs.keys() {
                producers.entry(key.as_str()).or_default().push((pos, node));
            }
        }
        for (key, chain) in producers.iter_mut() {
            chain.sort_by_key(|(pos, _)| stages[*pos].overwrites.iter().any(|k| k.as_str() == *key));
        }

        // Readers of the value written by each producer of a key
        let mut readers: HashMap<(&str, NodeIndex), Vec<NodeIndex>> = HashMap::new();

        for (pos, stage) in stages.iter().enumerate() {
            let stage_node = builder.name_to_index[&stage.name];

            // Explicit dependencies from depends_on
            for dep_name in &stage.depends_on {
                let dep_node = builder.name_to_index.get(dep_name).ok_or_else(|| {
                    CuraflowError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dep_name.clone(),
                    }
                })?;

                builder.add_edge_once(*dep_node, stage_node);
            }

            // Implicit dependencies from consumed keys
            for key in stage.inputs.keys() {
                let Some(chain) = producers.get(key.as_str()) else {
                    continue;
                };
                let candidates: Vec<&(usize, NodeIndex)> =
                    chain.iter().filter(|(_, node)| *node != stage_node).collect();
                let source = candidates
                    .iter()
                    .rev()
                    .find(|(p, _)| *p < pos)
                    .or_else(|| candidates.first());

                if let Some((_, producer)) = source {
                    builder.add_edge_once(*producer, stage_node);
                    readers
                        .entry((key.as_str(), *producer))
                        .or_default()
                        .push(stage_node);
                }
            }
        }

        // Overwrites follow the previous writer and its readers
        for (key, chain) in &producers {
            for pair in chain.windows(2) {
                let (previous, next) = (pair[0].1, pair[1].1);
                builder.add_edge_once(previous, next);
                for reader in readers.get(&(*key, previous)).into_iter().flatten() {
                    if *reader != next {
                        builder.add_edge_once(*reader, next);
                    }
                }
            }
        }

        // Validate no cycles
        builder.validate_acyclic()?;

        Ok(builder)
    }

    fn add_edge_once(&mut self, from: NodeIndex, to: NodeIndex) {
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Validate that the graph is acyclic
    fn validate_acyclic(&self) -> Result<(), CuraflowError> {
        toposort(&self.graph, None).map(|_| ()).map_err(|cycle| {
            CuraflowError::CircularDependency {
                stages: self.find_cycle_members(cycle.node_id()),
            }
        })
    }

    /// Find the stages on a cycle through `start`
    fn find_cycle_members(&self, start: NodeIndex) -> Vec<String> {
        // Follow successors that can still reach the start node
        let mut path = vec![start];
        let mut visited = std::collections::HashSet::new();
        let mut current = start;

        while visited.insert(current) {
            let next = self
                .graph
                .neighbors_directed(current, petgraph::Direction::Outgoing)
                .find(|n| petgraph::algo::has_path_connecting(&self.graph, *n, start, None));

            match next {
                Some(n) if n == start => break,
                Some(n) => {
                    path.push(n);
                    current = n;
                }
                None => break,
            }
        }

        let mut names: Vec<String> = path.iter().map(|n| self.index_to_name[n].clone()).collect();
        names.push(self.index_to_name[&start].clone());
        names
    }

    /// Get stages in a valid execution order
    pub fn topological_order(&self) -> Result<Vec<Arc<StageDefinition>>, CuraflowError> {
        toposort(&self.graph, None)
            .map(|nodes| {
                nodes
                    .into_iter()
                    .map(|n| Arc::clone(&self.stages[self.graph[n]]))
                    .collect()
            })
            .map_err(|cycle| CuraflowError::CircularDependency {
                stages: self.find_cycle_members(cycle.node_id()),
            })
    }

    /// Get topologically sorted stage names
    pub fn topological_order_names(&self) -> Result<Vec<String>, CuraflowError> {
        Ok(self
            .topological_order()?
            .iter()
            .map(|s| s.name.clone())
            .collect())
    }

    /// Get dependencies for a stage (stages that must run before it)
    pub fn dependencies(&self, stage_name: &str) -> Option<Vec<String>> {
        let node = self.name_to_index.get(stage_name)?;
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(*node, petgraph::Direction::Incoming)
            .map(|n| self.index_to_name[&n].clone())
            .collect();
        deps.sort();
        Some(deps)
    }

    /// Get dependents for a stage (stages that depend on it)
    pub fn dependents(&self, stage_name: &str) -> Option<Vec<String>> {
        let node = self.name_to_index.get(stage_name)?;
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(*node, petgraph::Direction::Outgoing)
            .map(|n| self.index_to_name[&n].clone())
            .collect();
        deps.sort();
        Some(deps)
    }

    /// Check if stage A depends (directly or transitively) on stage B
    pub fn depends_on(&self, stage_a: &str, stage_b: &str) -> bool {
        let Some(node_a) = self.name_to_index.get(stage_a) else {
            return false;
        };
        let Some(node_b) = self.name_to_index.get(stage_b) else {
            return false;
        };

        petgraph::algo::has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    /// Edges as (from, to) name pairs, in insertion order
    fn edge_names(&self) -> Vec<(&str, &str)> {
        self.graph
            .edge_indices()
            .filter_map(|edge| self.graph.edge_endpoints(edge))
            .map(|(from, to)| {
                (
                    self.index_to_name[&from].as_str(),
                    self.index_to_name[&to].as_str(),
                )
            })
            .collect()
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for stage in &self.stages {
            out.push_str(&format!("    {}[{}]\n", mermaid_id(&stage.name), stage.name));
        }

        for (from, to) in self.edge_names() {
            out.push_str(&format!("    {} --> {}\n", mermaid_id(from), mermaid_id(to)));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for (from, to) in self.edge_names() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        // Isolated nodes have no edge to make them appear
        for stage in &self.stages {
            let node = self.name_to_index[&stage.name];
            if self.graph.neighbors_undirected(node).count() == 0 {
                out.push_str(&format!("    \"{}\";\n", stage.name));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self) -> Result<String, CuraflowError> {
        let order = self.topological_order()?;
        let mut out = String::new();

        for (i, stage) in order.iter().enumerate() {
            let deps = self.dependencies(&stage.name).unwrap_or_default();

            out.push_str(&format!("{}. {} ({})", i + 1, stage.name, stage.container));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            if !stage.requires.is_empty() {
                out.push_str(&format!(" [requires: {}]", stage.requires.join(", ")));
            }

            out.push('\n');
        }

        Ok(out)
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn mermaid_id(name: &str) -> String {
    name.replace(|c: char| !c.is_ascii_alphanumeric(), "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, inputs: &[&str], outputs: &[&str], deps: &[&str]) -> Arc<StageDefinition> {
        let mut def = StageDefinition::new(name, format!("{}:latest", name));
        for (i, key) in inputs.iter().enumerate() {
            def = def.input(*key, format!("IN_{}", i));
        }
        for (i, key) in outputs.iter().enumerate() {
            def = def.output(*key, format!("OUT_{}", i));
        }
        def.depends_on = deps.iter().map(|d| d.to_string()).collect();
        Arc::new(def)
    }

    #[test]
    fn test_linear_dag_from_keys() {
        let stages = vec![
            stage("c", &["y"], &["z"], &[]),
            stage("a", &["in"], &["x"], &[]),
            stage("b", &["x"], &["y"], &[]),
        ];

        let dag = DagBuilder::build(&stages).unwrap();
        let order = dag.topological_order_names().unwrap();

        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond_dag() {
        let stages = vec![
            stage("a", &[], &["x"], &[]),
            stage("b", &["x"], &["y1"], &[]),
            stage("c", &["x"], &["y2"], &[]),
            stage("d", &["y1", "y2"], &["z"], &[]),
        ];

        let dag = DagBuilder::build(&stages).unwrap();
        let order = dag.topological_order_names().unwrap();

        assert_eq!(order[0], "a");
        assert_eq!(order[3], "d");
        assert_eq!(dag.dependencies("d").unwrap(), vec!["b", "c"]);
        assert_eq!(dag.dependents("a").unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_circular_dependency_detection() {
        let stages = vec![
            stage("a", &["y"], &["x"], &[]),
            stage("b", &["x"], &["y"], &[]),
        ];

        let result = DagBuilder::build(&stages);
        match result {
            Err(CuraflowError::CircularDependency { stages }) => {
                assert!(stages.contains(&"a".to_string()));
                assert!(stages.contains(&"b".to_string()));
            }
            _ => panic!("Expected CircularDependency"),
        }
    }

    #[test]
    fn test_overwrite_chain_is_not_a_cycle() {
        let rewrite = StageDefinition::new("rewrite", "rewrite:latest")
            .input("B", "IN_0")
            .output("A", "OUT_0")
            .overwrites("A");
        let stages = vec![
            stage("first", &["In"], &["A"], &[]),
            stage("second", &["A"], &["B"], &[]),
            Arc::new(rewrite),
        ];

        let dag = DagBuilder::build(&stages).unwrap();

        assert_eq!(
            dag.topological_order_names().unwrap(),
            vec!["first", "second", "rewrite"]
        );
        assert_eq!(dag.dependencies("second").unwrap(), vec!["first"]);
        assert_eq!(dag.dependencies("rewrite").unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_reader_of_overwritten_value_runs_before_overwrite() {
        let rewrite = StageDefinition::new("rewrite", "rewrite:latest")
            .output("A", "OUT_0")
            .overwrites("A");
        let stages = vec![
            stage("first", &[], &["A"], &[]),
            stage("reader", &["A"], &["R"], &[]),
            Arc::new(rewrite),
            stage("after", &["A"], &[], &[]),
        ];

        let dag = DagBuilder::build(&stages).unwrap();

        assert!(dag.depends_on("rewrite", "reader"));
        assert!(dag.depends_on("after", "rewrite"));
        assert!(!dag.depends_on("reader", "rewrite"));
        assert_eq!(dag.dependencies("after").unwrap(), vec!["rewrite"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let stages = vec![stage("a", &[], &[], &["nonexistent"])];

        let result = DagBuilder::build(&stages);
        assert!(matches!(result, Err(CuraflowError::UnknownDependency { .. })));
    }

    #[test]
    fn test_explicit_and_transitive_dependencies() {
        let stages = vec![
            stage("a", &[], &[], &[]),
            stage("b", &[], &[], &["a"]),
            stage("c", &[], &[], &["b"]),
        ];

        let dag = DagBuilder::build(&stages).unwrap();

        assert!(dag.depends_on("c", "a"));
        assert!(dag.depends_on("c", "b"));
        assert!(!dag.depends_on("a", "c"));
    }

    #[test]
    fn test_mermaid_output() {
        let stages = vec![
            stage("subsample-first", &[], &["x"], &[]),
            stage("inspect", &["x"], &[], &[]),
        ];

        let dag = DagBuilder::build(&stages).unwrap();
        let mermaid = dag.to_mermaid();

        assert!(mermaid.starts_with("graph TD\n"));
        assert!(mermaid.contains("subsample_first[subsample-first]"));
        assert!(mermaid.contains("subsample_first --> inspect"));
    }

    #[test]
    fn test_dot_output_includes_isolated_nodes() {
        let stages = vec![
            stage("a", &[], &["x"], &[]),
            stage("b", &["x"], &[], &[]),
            stage("lonely", &[], &[], &[]),
        ];

        let dot = DagBuilder::build(&stages).unwrap().to_dot();
        assert!(dot.contains("\"a\" -> \"b\";"));
        assert!(dot.contains("    \"lonely\";\n"));
    }
}
