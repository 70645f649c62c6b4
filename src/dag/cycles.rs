// src/dag/cycles.rs

//! Depth-first cycle detection over the step -> step adjacency.

use std::collections::{BTreeMap, BTreeSet, HashSet, btree_set};

use crate::types::StepId;

type Adjacency = BTreeMap<StepId, BTreeSet<StepId>>;

/// Every node that sits on a cycle.
///
/// Keeps a recursion set plus an explicit path stack; on a back-edge to a
/// node still on the stack, every node from that node's position to the top
/// of the path is a cycle member. The search is restarted from every
/// unvisited node so disjoint cycles are all reported.
pub fn cycle_members(adjacency: &Adjacency) -> BTreeSet<StepId> {
    let mut search = CycleSearch::new(adjacency, false);
    for root in adjacency.keys() {
        if !search.visited.contains(root.as_str()) {
            search.visit(root);
        }
    }
    search.members
}

/// Returns on the first back-edge found.
pub fn has_cycle(adjacency: &Adjacency) -> bool {
    let mut search = CycleSearch::new(adjacency, true);
    for root in adjacency.keys() {
        if !search.visited.contains(root.as_str()) && search.visit(root) {
            return true;
        }
    }
    false
}

struct CycleSearch<'a> {
    adjacency: &'a Adjacency,
    stop_at_first: bool,
    visited: HashSet<&'a str>,
    on_stack: HashSet<&'a str>,
    members: BTreeSet<StepId>,
}

/// One frame of the explicit DFS stack: a node on the current path and the
/// neighbours it has yet to explore.
type Frame<'a> = (&'a str, btree_set::Iter<'a, StepId>);

impl<'a> CycleSearch<'a> {
    fn new(adjacency: &'a Adjacency, stop_at_first: bool) -> Self {
        Self {
            adjacency,
            stop_at_first,
            visited: HashSet::new(),
            on_stack: HashSet::new(),
            members: BTreeSet::new(),
        }
    }

    fn neighbours(&self, node: &str) -> btree_set::Iter<'a, StepId> {
        let adjacency = self.adjacency;
        match adjacency.get(node) {
            Some(next) => next.iter(),
            None => EMPTY.iter(),
        }
    }

    /// Iterative DFS from `root`; the frame stack doubles as the path stack.
    /// Returns `true` if a cycle was found and the search should stop.
    fn visit(&mut self, root: &'a str) -> bool {
        self.visited.insert(root);
        self.on_stack.insert(root);
        let mut path: Vec<Frame<'a>> = vec![(root, self.neighbours(root))];

        while let Some((_, pending)) = path.last_mut() {
            let Some(neighbour) = pending.next() else {
                if let Some((node, _)) = path.pop() {
                    self.on_stack.remove(node);
                }
                continue;
            };
            let neighbour = neighbour.as_str();

            if self.on_stack.contains(neighbour) {
                if self.stop_at_first {
                    return true;
                }
                if let Some(pos) = path.iter().position(|(n, _)| *n == neighbour) {
                    self.members
                        .extend(path[pos..].iter().map(|(n, _)| n.to_string()));
                }
            } else if self.visited.insert(neighbour) {
                self.on_stack.insert(neighbour);
                path.push((neighbour, self.neighbours(neighbour)));
            }
        }
        false
    }
}

static EMPTY: BTreeSet<StepId> = BTreeSet::new();
