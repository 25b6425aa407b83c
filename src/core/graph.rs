//! # Dependency graph of task keys.
//!
//! Orders task start-up so that the most depended-upon keys start first, and
//! rejects dependency cycles before anything starts.
//!
//! ```text
//! add_node("page", ["user", "cart"])      page ──► user
//! add_node("cart", ["user"])                │        ▲
//!                                           └► cart ─┘
//!
//! transitive dependents: user=2, cart=1, page=0
//! start_order():          [user, cart, page]
//! ```
//!
//! ## Rules
//! - Referencing an unknown key auto-creates it with no dependencies.
//! - Priority = number of transitive dependents (distinct keys that reach the node).
//! - Equal priorities keep insertion order (first time a key was seen).
//! - The graph is built per discovery pass and thrown away afterwards.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::CycleError;
use crate::tasks::TaskKey;

/// Directed graph `task → depends-on`.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Keys in insertion order.
    order: Vec<TaskKey>,
    /// key → dependencies.
    edges: HashMap<TaskKey, Vec<TaskKey>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` with its dependencies, replacing any previous list.
    pub fn add_node(&mut self, key: TaskKey, dependencies: Vec<TaskKey>) {
        self.ensure(&key);
        for dep in &dependencies {
            self.ensure(dep);
        }
        self.edges.insert(key, dependencies);
    }

    fn ensure(&mut self, key: &TaskKey) {
        if !self.edges.contains_key(key) {
            self.order.push(key.clone());
            self.edges.insert(key.clone(), Vec::new());
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.edges.contains_key(key)
    }

    /// Direct dependencies of `key`.
    pub fn dependencies(&self, key: &str) -> &[TaskKey] {
        self.edges.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keys ordered by descending transitive-dependent count.
    pub fn start_order(&self) -> Vec<TaskKey> {
        if self.order.is_empty() {
            return Vec::new();
        }

        let reverse = self.reverse_edges();
        let counts: HashMap<&TaskKey, usize> = self
            .order
            .iter()
            .map(|k| (k, count_reachable(k, &reverse)))
            .collect();

        let mut nodes = self.order.clone();
        // stable: equal counts keep insertion order
        nodes.sort_by(|a, b| counts[b].cmp(&counts[a]));
        nodes
    }

    /// Number of distinct keys that depend on `key`, directly or not.
    pub fn transitive_dependents(&self, key: &str) -> usize {
        let Some((key, _)) = self.edges.get_key_value(key) else {
            return 0;
        };
        count_reachable(key, &self.reverse_edges())
    }

    /// Fails with the offending path if the graph contains a cycle.
    pub fn detect_cycle(&self) -> Result<(), CycleError> {
        let mut visited: HashSet<&TaskKey> = HashSet::new();
        let mut stack: Vec<&TaskKey> = Vec::new();

        for node in &self.order {
            if self.has_cycle(node, &mut visited, &mut stack) {
                return Err(CycleError {
                    path: stack.into_iter().cloned().collect(),
                });
            }
        }
        Ok(())
    }

    fn has_cycle<'a>(
        &'a self,
        node: &'a TaskKey,
        visited: &mut HashSet<&'a TaskKey>,
        stack: &mut Vec<&'a TaskKey>,
    ) -> bool {
        if stack.contains(&node) {
            stack.push(node);
            return true;
        }
        if !visited.insert(node) {
            return false;
        }

        stack.push(node);
        for dep in self.dependencies(node) {
            if self.has_cycle(dep, visited, stack) {
                return true;
            }
        }
        stack.pop();
        false
    }

    /// key → keys that directly depend on it.
    fn reverse_edges(&self) -> HashMap<&TaskKey, Vec<&TaskKey>> {
        let mut reverse: HashMap<&TaskKey, Vec<&TaskKey>> =
            self.order.iter().map(|k| (k, Vec::new())).collect();
        for node in &self.order {
            for dep in self.dependencies(node) {
                if let Some(list) = reverse.get_mut(dep) {
                    list.push(node);
                }
            }
        }
        reverse
    }
}

/// Breadth-first count of nodes reachable over reverse edges.
fn count_reachable(start: &TaskKey, reverse: &HashMap<&TaskKey, Vec<&TaskKey>>) -> usize {
    let mut visited: HashSet<&TaskKey> = HashSet::new();
    let mut queue: VecDeque<&TaskKey> = reverse
        .get(start)
        .map(|v| v.iter().copied().collect())
        .unwrap_or_default();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = reverse.get(current) {
            queue.extend(next.iter().copied().filter(|n| !visited.contains(n)));
        }
    }
    visited.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn k(s: &str) -> TaskKey {
        Arc::from(s)
    }

    fn keys(list: &[&str]) -> Vec<TaskKey> {
        list.iter().map(|s| k(s)).collect()
    }

    #[test]
    fn empty_graph_has_empty_order() {
        let graph = DependencyGraph::new();
        assert!(graph.start_order().is_empty());
        assert!(graph.detect_cycle().is_ok());
    }

    #[test]
    fn most_depended_upon_starts_first() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("page"), keys(&["user", "cart"]));
        graph.add_node(k("cart"), keys(&["user"]));

        assert_eq!(graph.start_order(), keys(&["user", "cart", "page"]));
        assert_eq!(graph.transitive_dependents("user"), 2);
        assert_eq!(graph.transitive_dependents("page"), 0);
    }

    #[test]
    fn counts_are_transitive_not_direct() {
        // chain: d -> c -> b -> a, plus x -> b
        let mut graph = DependencyGraph::new();
        graph.add_node(k("x"), keys(&["b"]));
        graph.add_node(k("d"), keys(&["c"]));
        graph.add_node(k("c"), keys(&["b"]));
        graph.add_node(k("b"), keys(&["a"]));

        assert_eq!(graph.transitive_dependents("a"), 4);
        assert_eq!(graph.transitive_dependents("b"), 3);
        assert_eq!(graph.start_order()[..2], keys(&["a", "b"])[..]);
    }

    #[test]
    fn diamond_counts_shared_dependents_once() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("top"), keys(&["left", "right"]));
        graph.add_node(k("left"), keys(&["base"]));
        graph.add_node(k("right"), keys(&["base"]));

        assert_eq!(graph.transitive_dependents("base"), 3);
        assert!(graph.detect_cycle().is_ok());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("c"), Vec::new());
        graph.add_node(k("a"), Vec::new());
        graph.add_node(k("b"), Vec::new());

        assert_eq!(graph.start_order(), keys(&["c", "a", "b"]));
    }

    #[test]
    fn zero_dependents_never_outrank_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("leaf1"), Vec::new());
        graph.add_node(k("leaf2"), keys(&["shared"]));

        let order = graph.start_order();
        assert_eq!(order[0], k("shared"));
    }

    #[test]
    fn unknown_dependencies_are_auto_created() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("page"), keys(&["user"]));

        assert!(graph.contains("user"));
        assert!(graph.dependencies("user").is_empty());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn add_node_overwrites_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("page"), keys(&["user"]));
        graph.add_node(k("page"), keys(&["cart"]));

        assert_eq!(graph.dependencies("page"), &keys(&["cart"])[..]);
        assert_eq!(graph.transitive_dependents("user"), 0);
    }

    #[test]
    fn detects_self_loop() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("a"), keys(&["a"]));

        let err = graph.detect_cycle().unwrap_err();
        assert_eq!(err.path, keys(&["a", "a"]));
    }

    #[test]
    fn detects_long_cycle_with_path() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("a"), keys(&["b"]));
        graph.add_node(k("b"), keys(&["c"]));
        graph.add_node(k("c"), keys(&["a"]));

        let err = graph.detect_cycle().unwrap_err();
        assert_eq!(err.path, keys(&["a", "b", "c", "a"]));
        assert!(err.to_string().contains("a -> b -> c -> a"));
    }

    #[test]
    fn cycle_behind_acyclic_prefix() {
        let mut graph = DependencyGraph::new();
        graph.add_node(k("root"), keys(&["x"]));
        graph.add_node(k("x"), keys(&["y"]));
        graph.add_node(k("y"), keys(&["x"]));

        let err = graph.detect_cycle().unwrap_err();
        assert_eq!(err.path, keys(&["root", "x", "y", "x"]));
    }
}
