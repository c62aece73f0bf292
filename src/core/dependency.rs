// src/core/dependency.rs

//! # Pipeline dependency graph
//!
//! Built from the dependency materials of every pipeline. Upstream edges point from a pipeline to
//! the `(pipeline, stage)` pairs it consumes; downstream edges point from a pipeline to the
//! pipelines consuming it. Cycle detection walks downstream edges with an explicit stack.

use crate::models::{Name, Pipeline};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// One upstream reference: a pipeline and the stage whose completion triggers the consumer.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyNode {
    /// The upstream pipeline.
    pub pipeline: Name,
    /// The stage of `pipeline` the consumer waits for.
    pub stage: Name,
}

/// A dependency material pointing at a pipeline that is not declared anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingUpstream {
    /// The pipeline that does not exist.
    pub referenced: Name,
    /// The pipeline whose material refers to it.
    pub referencing: Name,
}

impl MissingUpstream {
    /// The error reported on the referencing pipeline.
    pub fn message(&self) -> String {
        format!(
            "Pipeline \"{}\" does not exist. It is used from pipeline \"{}\".",
            self.referenced, self.referencing
        )
    }
}

/// Unique upstream nodes of one pipeline, in material order.
pub fn upstream_nodes(pipeline: &Pipeline) -> Vec<DependencyNode> {
    let mut nodes: Vec<DependencyNode> = Vec::new();
    for (upstream, stage) in pipeline.dependency_targets() {
        let node = DependencyNode {
            pipeline: upstream.clone(),
            stage: stage.clone(),
        };
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }
    nodes
}

/// Upstream and downstream edges between pipelines, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<Name>,
    upstream: HashMap<Name, Vec<DependencyNode>>,
    downstream: HashMap<Name, Vec<Name>>,
}

impl DependencyGraph {
    /// Builds the graph from pipeline declarations. A name declared twice contributes the union of
    /// both declarations' upstreams.
    pub fn from_pipelines<'p>(pipelines: impl IntoIterator<Item = &'p Pipeline>) -> Self {
        let mut graph = Self::default();
        for pipeline in pipelines {
            if !graph.upstream.contains_key(&pipeline.name) {
                graph.order.push(pipeline.name.clone());
            }
            let upstream = graph.upstream.entry(pipeline.name.clone()).or_default();
            for node in upstream_nodes(pipeline) {
                if !upstream.contains(&node) {
                    upstream.push(node);
                }
            }
        }

        for name in &graph.order {
            graph.downstream.entry(name.clone()).or_default();
        }
        for name in &graph.order {
            for node in graph.upstream.get(name).map(Vec::as_slice).unwrap_or_default() {
                if let Some(consumers) = graph.downstream.get_mut(&node.pipeline)
                    && !consumers.contains(name)
                {
                    consumers.push(name.clone());
                }
            }
        }
        graph
    }

    /// Whether `pipeline` is declared.
    pub fn contains(&self, pipeline: &Name) -> bool {
        self.upstream.contains_key(pipeline)
    }

    /// Pipelines in first-declaration order.
    pub fn pipelines(&self) -> &[Name] {
        &self.order
    }

    /// The `(pipeline, stage)` pairs `pipeline` consumes, in material order.
    pub fn upstream_of(&self, pipeline: &Name) -> &[DependencyNode] {
        self.upstream
            .get(pipeline)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Pipelines consuming `pipeline`, in declaration order.
    pub fn downstream_of(&self, pipeline: &Name) -> &[Name] {
        self.downstream
            .get(pipeline)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every known pipeline with the pipelines consuming it, in declaration order.
    pub fn downstream_map(&self) -> Vec<(&Name, &[Name])> {
        self.order
            .iter()
            .map(|name| (name, self.downstream_of(name)))
            .collect()
    }

    /// Whether one of `pipeline`'s own dependency materials points at `candidate`.
    pub fn is_direct_upstream(&self, pipeline: &Name, candidate: &Name) -> bool {
        self.upstream_of(pipeline)
            .iter()
            .any(|node| node.pipeline == *candidate)
    }

    /// Whether `candidate` can be reached by following upstream edges from `pipeline`.
    pub fn is_upstream(&self, pipeline: &Name, candidate: &Name) -> bool {
        let mut seen: HashSet<&Name> = HashSet::new();
        let mut stack: Vec<&Name> = vec![pipeline];
        while let Some(current) = stack.pop() {
            for node in self.upstream_of(current) {
                if node.pipeline == *candidate {
                    return true;
                }
                if seen.insert(&node.pipeline) {
                    stack.push(&node.pipeline);
                }
            }
        }
        false
    }

    /// Finds dependency cycles. Every pipeline on a cycle is paired with one cycle through it,
    /// rendered as `a <- b <- c <- a` where each name is consumed by the next. Pipelines are tried
    /// in declaration order and a cycle found from one start is reported on all of its members.
    pub fn find_cycles(&self) -> Vec<(Name, String)> {
        let mut reported: Vec<(Name, String)> = Vec::new();
        let mut on_cycle: HashSet<&Name> = HashSet::new();

        for start in &self.order {
            if on_cycle.contains(start) {
                continue;
            }
            let Some(members) = self.cycle_through(start) else {
                continue;
            };
            let rendered: Vec<String> = members
                .iter()
                .chain(std::iter::once(&start))
                .map(|name| name.to_string())
                .collect();
            let message = format!("Circular dependency: {}", rendered.join(" <- "));
            for member in members {
                if on_cycle.insert(member) {
                    reported.push((member.clone(), message.clone()));
                }
            }
        }
        reported
    }

    /// A downstream path leading from `start` back to itself, starting with `start`.
    fn cycle_through<'g>(&'g self, start: &'g Name) -> Option<Vec<&'g Name>> {
        let mut visited: HashSet<&Name> = HashSet::from([start]);
        let mut path: Vec<&Name> = vec![start];
        let mut cursors: Vec<usize> = vec![0];

        while let (Some(&node), Some(cursor)) = (path.last(), cursors.last_mut()) {
            let Some(child) = self.downstream_of(node).get(*cursor) else {
                path.pop();
                cursors.pop();
                continue;
            };
            *cursor += 1;

            if child == start {
                return Some(path);
            }
            if visited.insert(child) {
                path.push(child);
                cursors.push(0);
            }
        }
        None
    }

    /// Dependency references to undeclared pipelines, one per (referenced, referencing) pair.
    pub fn missing_upstreams(&self) -> Vec<MissingUpstream> {
        let mut missing: Vec<MissingUpstream> = Vec::new();
        for name in &self.order {
            for node in self.upstream_of(name) {
                if self.contains(&node.pipeline) {
                    continue;
                }
                let entry = MissingUpstream {
                    referenced: node.pipeline.clone(),
                    referencing: name.clone(),
                };
                if !missing.contains(&entry) {
                    missing.push(entry);
                }
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_dependency, dependent_pipeline, simple_pipeline};

    #[test]
    fn test_three_pipeline_cycle() {
        // --- Setup ---
        let p1 = dependent_pipeline("p1", "p3", "stage");
        let p2 = dependent_pipeline("p2", "p1", "stage");
        let p3 = dependent_pipeline("p3", "p2", "stage");

        // --- Execute ---
        let cycles = DependencyGraph::from_pipelines([&p1, &p2, &p3]).find_cycles();

        // --- Assert ---
        assert_eq!(cycles.len(), 3);
        for (_, message) in &cycles {
            assert_eq!(message, "Circular dependency: p1 <- p2 <- p3 <- p1");
        }
    }

    #[test]
    fn test_cycle_reached_through_finished_pipeline_is_reported() {
        // --- Setup ---
        let a = dependent_pipeline("A", "C", "stage");
        let b = dependent_pipeline("B", "A", "stage");
        let mut c = dependent_pipeline("C", "B", "stage");
        add_dependency(&mut c, "D", "stage");
        let d = dependent_pipeline("D", "A", "stage");

        // --- Execute ---
        let cycles = DependencyGraph::from_pipelines([&a, &b, &c, &d]).find_cycles();

        // --- Assert ---
        let names: Vec<&str> = cycles.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
        assert_eq!(cycles[0].1, "Circular dependency: A <- B <- C <- A");
        assert_eq!(cycles[3].1, "Circular dependency: D <- C <- A <- D");
    }

    #[test]
    fn test_downstream_map_follows_declaration_order() {
        // --- Setup ---
        let top = simple_pipeline("top");
        let late = dependent_pipeline("late", "top", "stage");
        let early = dependent_pipeline("early", "top", "stage");
        let leaf = dependent_pipeline("leaf", "early", "stage");

        // --- Execute ---
        let graph = DependencyGraph::from_pipelines([&top, &late, &early, &leaf]);
        let map = graph.downstream_map();

        // --- Assert ---
        let keys: Vec<&str> = map.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(keys, vec!["top", "late", "early", "leaf"]);
        assert_eq!(map[0].1, &[Name::from("late"), Name::from("early")]);
        assert!(map[1].1.is_empty());
        assert_eq!(map[2].1, &[Name::from("leaf")]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let pipeline = dependent_pipeline("pipeline1", "pipeline1", "stage");
        let cycles = DependencyGraph::from_pipelines([&pipeline]).find_cycles();
        assert_eq!(
            cycles,
            vec![(
                Name::from("pipeline1"),
                "Circular dependency: pipeline1 <- pipeline1".to_string()
            )]
        );
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // --- Setup ---
        let top = simple_pipeline("top");
        let left = dependent_pipeline("left", "top", "stage");
        let right = dependent_pipeline("right", "top", "stage");
        let mut bottom = dependent_pipeline("bottom", "left", "stage");
        add_dependency(&mut bottom, "right", "stage");

        // --- Execute ---
        let graph = DependencyGraph::from_pipelines([&top, &left, &right, &bottom]);

        // --- Assert ---
        assert!(graph.find_cycles().is_empty());
        assert_eq!(graph.downstream_of(&Name::from("top")), &[Name::from("left"), Name::from("right")]);
        assert!(graph.is_upstream(&Name::from("bottom"), &Name::from("top")));
        assert!(!graph.is_direct_upstream(&Name::from("bottom"), &Name::from("top")));
    }

    #[test]
    fn test_missing_upstreams_are_deduplicated() {
        // --- Setup ---
        let mut consumer = dependent_pipeline("consumer", "ghost", "build");
        add_dependency(&mut consumer, "ghost", "test");

        // --- Execute ---
        let missing = DependencyGraph::from_pipelines([&consumer]).missing_upstreams();

        // --- Assert ---
        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing[0].message(),
            "Pipeline \"ghost\" does not exist. It is used from pipeline \"consumer\"."
        );
    }

    #[test]
    fn test_upstream_nodes_are_unique() {
        let mut pipeline = dependent_pipeline("p", "up", "build");
        add_dependency(&mut pipeline, "UP", "Build");
        assert_eq!(upstream_nodes(&pipeline).len(), 1);
    }
}
