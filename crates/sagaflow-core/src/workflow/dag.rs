//! Dependency graph builder and cycle detection.
//!
//! Uses `petgraph` to model `dependsOn` edges (step -> dependency) across every
//! scope of a workflow. Registering a step ID twice replaces its dependency
//! list instead of merging it, so IDs reused across branches or cases keep only
//! the last registration's edges. Workflow authors should keep step IDs unique
//! across the whole document.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde_json::Value;

/// stepId -> dependency-list graph.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    graph: StableDiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
    /// Dependency order per node as last registered.
    deps: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from an untyped document.
    ///
    /// Tolerates malformed input: entries without a string `stepId` are
    /// ignored and non-string dependencies are dropped.
    pub fn from_document(document: &Value) -> Self {
        let mut graph = Self::new();
        if let Some(steps) = document.get("steps").and_then(Value::as_array) {
            graph.insert_document_steps(steps);
        }
        graph
    }

    fn insert_document_steps(&mut self, steps: &[Value]) {
        for step in steps {
            if let Some(id) = step.get("stepId").and_then(Value::as_str) {
                let deps = step
                    .get("dependsOn")
                    .and_then(Value::as_array)
                    .map(|d| d.iter().filter_map(Value::as_str).collect::<Vec<_>>())
                    .unwrap_or_default();
                self.insert(id, deps);
            }
            for (_, nested) in document_nested_lists(step) {
                self.insert_document_steps(nested);
            }
        }
    }

    /// Register `step_id` with its dependencies, replacing any earlier list.
    pub fn insert<'a>(&mut self, step_id: &str, depends_on: impl IntoIterator<Item = &'a str>) {
        let node = self.node(step_id);

        let stale: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }

        let mut ordered = Vec::new();
        for dep in depends_on {
            let dep_node = self.node(dep);
            self.graph.add_edge(node, dep_node, ());
            ordered.push(dep_node);
        }
        self.deps.insert(node, ordered);
    }

    fn node(&mut self, id: &str) -> NodeIndex {
        if let Some(idx) = self.nodes.get(id) {
            return *idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.nodes.insert(id.to_string(), idx);
        idx
    }

    /// Find the first cycle reachable by an iterative depth-first search.
    ///
    /// Roots are visited in registration order and dependencies in declaration
    /// order. The returned path starts and ends with the same step ID, e.g.
    /// `["a", "b", "c", "a"]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        if !petgraph::algo::is_cyclic_directed(&self.graph) {
            return None;
        }

        let mut visited: HashSet<NodeIndex> = HashSet::new();

        for root in self.graph.node_indices() {
            if visited.contains(&root) {
                continue;
            }

            // (node, index of next dependency to explore)
            let mut stack: Vec<(NodeIndex, usize)> = vec![(root, 0)];
            let mut on_stack: HashSet<NodeIndex> = HashSet::from([root]);
            visited.insert(root);

            while let Some((node, next)) = stack.last_mut() {
                let node = *node;
                let deps = self.deps.get(&node).map(Vec::as_slice).unwrap_or(&[]);
                if *next >= deps.len() {
                    on_stack.remove(&node);
                    stack.pop();
                    continue;
                }
                let dep = deps[*next];
                *next += 1;

                if on_stack.contains(&dep) {
                    let start = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..]
                        .iter()
                        .map(|(n, _)| self.graph[*n].clone())
                        .collect();
                    path.push(self.graph[dep].clone());
                    return Some(path);
                }
                if visited.insert(dep) {
                    on_stack.insert(dep);
                    stack.push((dep, 0));
                }
            }
        }

        None
    }
}

/// Nested step arrays of an untyped step: branches, cases, then `default`.
///
/// Each list comes with its path relative to the step, e.g.
/// `branches/1/steps`.
pub(crate) fn document_nested_lists(step: &Value) -> Vec<(String, &[Value])> {
    let mut lists = Vec::new();
    if let Some(branches) = step.get("branches").and_then(Value::as_array) {
        for (i, branch) in branches.iter().enumerate() {
            if let Some(steps) = branch.get("steps").and_then(Value::as_array) {
                lists.push((format!("branches/{i}/steps"), steps.as_slice()));
            }
        }
    }
    if let Some(cases) = step.get("cases").and_then(Value::as_array) {
        for (i, case) in cases.iter().enumerate() {
            if let Some(steps) = case.get("steps").and_then(Value::as_array) {
                lists.push((format!("cases/{i}/steps"), steps.as_slice()));
            }
        }
    }
    if let Some(default) = step.get("default").and_then(Value::as_array) {
        lists.push(("default".to_string(), default.as_slice()));
    }
    lists
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (id, deps) in edges {
            g.insert(id, deps.iter().copied());
        }
        g
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn test_two_node_cycle_path() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(g.find_cycle().unwrap(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_three_node_cycle_path() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        assert_eq!(g.find_cycle().unwrap(), vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);
        assert_eq!(g.find_cycle().unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        // root -> x -> y -> x
        let g = graph(&[("root", &["x"]), ("x", &["y"]), ("y", &["x"])]);
        assert_eq!(g.find_cycle().unwrap(), vec!["x", "y", "x"]);
    }

    #[test]
    fn test_last_registration_wins() {
        // The first registration of "dup" would close a cycle; the second
        // replaces its dependency list and removes it.
        let g = graph(&[("a", &["dup"]), ("dup", &["a"]), ("dup", &[])]);
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn test_from_document_walks_nested_scopes() {
        let doc = json!({
            "steps": [
                { "stepId": "p", "type": "parallel", "branches": [
                    { "branchId": "b1", "steps": [
                        { "stepId": "x", "type": "task", "dependsOn": ["y"] }
                    ]}
                ]},
                { "stepId": "c", "type": "conditional", "cases": [
                    { "condition": true, "steps": [
                        { "stepId": "y", "type": "task", "dependsOn": ["x"] }
                    ]}
                ], "default": [ { "stepId": "z", "type": "task" } ]}
            ]
        });
        let g = DependencyGraph::from_document(&doc);
        assert_eq!(g.find_cycle().unwrap(), vec!["x", "y", "x"]);
    }

    #[test]
    fn test_from_document_ignores_malformed_entries() {
        let doc = json!({ "steps": [
            42,
            { "type": "task", "dependsOn": ["a"] },
            { "stepId": "a", "dependsOn": [1, "b"] },
            { "stepId": "b", "dependsOn": ["a"] }
        ] });
        let g = DependencyGraph::from_document(&doc);
        assert_eq!(g.find_cycle().unwrap(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_nested_lists_carry_relative_paths() {
        let step = json!({
            "branches": [ { "steps": [] }, { "branchId": "no-steps" }, { "steps": [ {} ] } ],
            "cases": [ { "condition": true, "steps": [] } ],
            "default": []
        });
        let paths: Vec<String> = document_nested_lists(&step).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["branches/0/steps", "branches/2/steps", "cases/0/steps", "default"]);
    }
}
