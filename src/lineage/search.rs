use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashSet},
};

use crate::{arena::ArenaIndex, lineage::graph::LineageGraph};

/// A step of a lineage path: a field node or one of the two pseudo nodes
/// a field's bindings expand to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathNode {
    Field(ArenaIndex),
    Handle(String),
    Assign(String),
}

impl PathNode {
    pub fn label(&self, graph: &LineageGraph) -> String {
        match self {
            PathNode::Field(idx) => graph.node(*idx).name.clone(),
            PathNode::Handle(handle) => format!("HANDLE:{handle}"),
            PathNode::Assign(literal) => format!("ASSIGN:{literal}"),
        }
    }
}

/// Ordered nodes from a start field back towards its origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineagePath {
    pub nodes: Vec<PathNode>,
}

impl LineagePath {
    pub fn new(start: ArenaIndex) -> Self {
        Self {
            nodes: vec![PathNode::Field(start)],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn terminal(&self) -> Option<&PathNode> {
        self.nodes.last()
    }

    /// 0 when the path ends at an assignment, 1 at a handle, 2 otherwise.
    pub fn terminal_class(&self) -> u8 {
        match self.terminal() {
            Some(PathNode::Assign(_)) => 0,
            Some(PathNode::Handle(_)) => 1,
            _ => 2,
        }
    }

    pub fn rank(&self) -> (u8, usize) {
        (self.terminal_class(), self.len())
    }

    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|node| match node {
            PathNode::Handle(handle) => Some(handle.as_str()),
            _ => None,
        })
    }

    pub fn assignments(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|node| match node {
            PathNode::Assign(literal) => Some(literal.as_str()),
            _ => None,
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = ArenaIndex> + '_ {
        self.nodes.iter().filter_map(|node| match node {
            PathNode::Field(idx) => Some(*idx),
            _ => None,
        })
    }

    /// `ACCOUNT-NO <- ACCT-REC <- HANDLE:ACCTFILE <- ASSIGN:ACCTDD`
    pub fn render(&self, graph: &LineageGraph) -> String {
        self.nodes
            .iter()
            .map(|node| node.label(graph))
            .collect::<Vec<_>>()
            .join(" <- ")
    }

    fn extended(&self, next: PathNode) -> Self {
        let mut nodes = Vec::with_capacity(self.nodes.len() + 1);
        nodes.extend(self.nodes.iter().cloned());
        nodes.push(next);
        Self { nodes }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    pub max_depth: usize,
    pub max_paths: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_depth: 2000,
            max_paths: 50,
        }
    }
}

/// Outgoing steps of a path node, in expansion order: parent, data-flow
/// sources, handles, assignments.
pub fn successors(graph: &LineageGraph, node: &PathNode) -> Vec<PathNode> {
    match node {
        PathNode::Field(idx) => {
            let field = graph.node(*idx);
            field
                .parent
                .into_iter()
                .chain(field.sources.iter().copied())
                .map(PathNode::Field)
                .chain(field.handles.iter().cloned().map(PathNode::Handle))
                .chain(field.assignments.iter().cloned().map(PathNode::Assign))
                .collect()
        }
        PathNode::Handle(handle) => {
            let mut seen = HashSet::new();
            graph
                .bound_to_handle(handle)
                .iter()
                .flat_map(|idx| graph.node(*idx).assignments.iter())
                .filter(|literal| seen.insert(literal.as_str()))
                .cloned()
                .map(PathNode::Assign)
                .collect()
        }
        PathNode::Assign(_) => vec![],
    }
}

struct Candidate {
    rank: (u8, usize),
    seq: usize,
    path: LineagePath,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.seq == other.seq
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed: the heap pops the lowest rank, ties in insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.rank, other.seq).cmp(&(self.rank, self.seq))
    }
}

/// Best-first search from `starts`, returning leaf paths ordered by
/// (terminal class, length).
///
/// An edge is traversed at most once per call, so the number of expansions
/// is bounded by the number of edges even on cyclic graphs. A path whose
/// next step would revisit one of its own nodes, or whose every outgoing
/// edge was already taken by another path, is emitted as a leaf.
pub fn ranked_leaf_paths(
    graph: &LineageGraph,
    starts: &[ArenaIndex],
    limits: SearchLimits,
) -> Vec<LineagePath> {
    let mut frontier = BinaryHeap::new();
    let mut seq = 0;
    for start in starts {
        let path = LineagePath::new(*start);
        frontier.push(Candidate {
            rank: path.rank(),
            seq,
            path,
        });
        seq += 1;
    }

    let mut seen_edges: HashSet<(PathNode, PathNode)> = HashSet::new();
    let mut emitted: HashSet<LineagePath> = HashSet::new();
    let mut leaves = vec![];
    let mut emit = |path: LineagePath, leaves: &mut Vec<LineagePath>| {
        if emitted.insert(path.clone()) {
            leaves.push(path);
        }
    };

    while let Some(Candidate { path, .. }) = frontier.pop() {
        if leaves.len() >= limits.max_paths {
            break;
        }
        let Some(current) = path.terminal().cloned() else {
            continue;
        };

        let next = successors(graph, &current);
        if next.is_empty() || path.len() > limits.max_depth {
            emit(path, &mut leaves);
            continue;
        }

        let mut expanded = false;
        for step in next {
            if !seen_edges.insert((current.clone(), step.clone())) {
                continue;
            }
            expanded = true;
            if path.nodes.contains(&step) {
                emit(path.clone(), &mut leaves);
                continue;
            }
            let extended = path.extended(step);
            frontier.push(Candidate {
                rank: extended.rank(),
                seq,
                path: extended,
            });
            seq += 1;
        }
        if !expanded {
            emit(path, &mut leaves);
        }
    }

    leaves.sort_by_key(LineagePath::rank);
    leaves.truncate(limits.max_paths);
    log::debug!(
        "Search from {} start nodes: {} leaf paths, {} edges traversed",
        starts.len(),
        leaves.len(),
        seen_edges.len()
    );
    leaves
}
