// graph.rs — Dependency graphs over definitions and units
//
// One small directed graph type serves three uses: record field
// dependencies, the function call graph, and the unit import graph. An edge
// `a -> b` means "a depends on b", so the topological order lists
// dependencies first.
//
// Preconditions: none.
// Postconditions: `sorted()` is deterministic (ties broken by key order);
//   `cycle_nodes()` lists every node lying on at least one cycle, once.
// Failure modes: none (cycles are reported as data, not errors).
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepGraph<K: Ord + Copy> {
    adj: BTreeMap<K, BTreeSet<K>>,
}

impl<K: Ord + Copy> Default for DepGraph<K> {
    fn default() -> Self {
        Self {
            adj: BTreeMap::new(),
        }
    }
}

/// Outcome of a topological sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sorted<K> {
    /// Nodes whose dependencies are all acyclic, dependencies first.
    pub order: Vec<K>,
    /// Nodes on a cycle, in key order.
    pub cycles: Vec<K>,
}

impl<K: Ord + Copy> DepGraph<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: K) {
        self.adj.entry(node).or_default();
    }

    pub fn add_edge(&mut self, from: K, to: K) {
        self.adj.entry(from).or_default().insert(to);
        self.adj.entry(to).or_default();
    }

    pub fn contains(&self, node: K) -> bool {
        self.adj.contains_key(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = K> + '_ {
        self.adj.keys().copied()
    }

    pub fn deps(&self, node: K) -> impl Iterator<Item = K> + '_ {
        self.adj.get(&node).into_iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    /// Union with another graph (used to fold in imported units' graphs).
    pub fn merge(&mut self, other: &DepGraph<K>) {
        for (node, deps) in &other.adj {
            self.add_node(*node);
            for dep in deps {
                self.add_edge(*node, *dep);
            }
        }
    }

    /// Every node that lies on a cycle, including self-loops.
    pub fn cycle_nodes(&self) -> Vec<K> {
        let mut state: BTreeMap<K, u8> = BTreeMap::new(); // 0 = unvisited, 1 = in progress, 2 = done
        let mut path = Vec::new();
        let mut on_cycle = BTreeSet::new();
        for node in self.adj.keys() {
            if state.get(node).copied().unwrap_or(0) == 0 {
                self.dfs_cycle(*node, &mut state, &mut path, &mut on_cycle);
            }
        }
        on_cycle.into_iter().collect()
    }

    fn dfs_cycle(
        &self,
        node: K,
        state: &mut BTreeMap<K, u8>,
        path: &mut Vec<K>,
        on_cycle: &mut BTreeSet<K>,
    ) {
        state.insert(node, 1);
        path.push(node);
        for next in self.deps(node) {
            match state.get(&next).copied().unwrap_or(0) {
                0 => self.dfs_cycle(next, state, path, on_cycle),
                1 => {
                    if let Some(pos) = path.iter().position(|n| *n == next) {
                        on_cycle.extend(path[pos..].iter().copied());
                    }
                }
                _ => {}
            }
        }
        path.pop();
        state.insert(node, 2);
    }

    /// Kahn's algorithm over reversed edges, so dependencies come first.
    /// Nodes on a cycle, or depending on one, are left out of `order`.
    pub fn sorted(&self) -> Sorted<K> {
        let mut pending: BTreeMap<K, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<K, Vec<K>> = BTreeMap::new();
        for (node, deps) in &self.adj {
            pending.insert(*node, deps.len());
            for dep in deps {
                dependents.entry(*dep).or_default().push(*node);
            }
        }
        let mut queue: VecDeque<K> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(k, _)| *k)
            .collect();
        let mut order = Vec::with_capacity(self.adj.len());
        while let Some(node) = queue.pop_front() {
            order.push(node);
            let mut ready = Vec::new();
            for dependent in dependents.get(&node).into_iter().flatten() {
                if let Some(n) = pending.get_mut(dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push(*dependent);
                    }
                }
            }
            ready.sort();
            queue.extend(ready);
        }
        Sorted {
            order,
            cycles: self.cycle_nodes(),
        }
    }
}

impl<K: Ord + Copy + fmt::Display> fmt::Display for DepGraph<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (node, deps) in &self.adj {
            write!(f, "{} ->", node)?;
            for dep in deps {
                write!(f, " {}", dep)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_come_first() {
        let mut g = DepGraph::new();
        g.add_edge(3, 1);
        g.add_edge(3, 2);
        g.add_edge(2, 1);
        g.add_node(0);
        let sorted = g.sorted();
        assert_eq!(sorted.order, vec![0, 1, 2, 3]);
        assert!(sorted.cycles.is_empty());
    }

    #[test]
    fn mutual_cycle_reports_both_nodes() {
        let mut g = DepGraph::new();
        g.add_edge(1, 2);
        g.add_edge(2, 1);
        g.add_edge(3, 1);
        g.add_edge(4, 4);
        let sorted = g.sorted();
        assert_eq!(sorted.cycles, vec![1, 2, 4]);
        assert!(sorted.order.is_empty());
    }

    #[test]
    fn merge_unions_edges() {
        let mut a = DepGraph::new();
        a.add_edge(1, 2);
        let mut b = DepGraph::new();
        b.add_edge(2, 1);
        a.merge(&b);
        assert_eq!(a.cycle_nodes(), vec![1, 2]);
        insta::assert_snapshot!(a.to_string(), @r"
        1 -> 2
        2 -> 1
        ");
    }
}
