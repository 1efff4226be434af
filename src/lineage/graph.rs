use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::{
    arena::{Arena, ArenaIndex},
    scanner::FieldRow,
};

/// The hierarchy a field belongs to: the row its parent chain ends at,
/// within one origin file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    pub root: usize,
    pub origin_file: String,
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub name: String,
    pub scope: ScopeKey,
    pub root_name: String,
    pub parent: Option<ArenaIndex>,
    pub sources: IndexSet<ArenaIndex>,
    pub handles: BTreeSet<String>,
    pub assignments: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOptions {
    pub allow_cross_scope_if_unique: bool,
}

/// Parent row and root row of every raw field row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scopes {
    pub parent_row: Vec<Option<usize>>,
    pub roots: Vec<usize>,
}

impl Scopes {
    pub fn resolve(rows: &[FieldRow]) -> Self {
        let mut by_file_name: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            by_file_name
                .entry((row.origin_file.as_str(), row.name.as_str()))
                .or_default()
                .push(idx);
        }

        // Several rows may carry the parent's name; take the nearest one
        // declared before the child, else the first.
        let parent_row: Vec<Option<usize>> = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let parent = row.parent_field.as_deref()?;
                let candidates = by_file_name.get(&(row.origin_file.as_str(), parent))?;
                candidates
                    .iter()
                    .copied()
                    .filter(|&c| c < idx)
                    .max()
                    .or_else(|| candidates.iter().copied().find(|&c| c != idx))
            })
            .collect();

        // memo[row] = (root, walk hit a cycle)
        let mut memo: Vec<Option<(usize, bool)>> = vec![None; rows.len()];
        for start in 0..rows.len() {
            let mut seen = HashSet::new();
            let mut current = start;
            let resolved = loop {
                if !seen.insert(current) {
                    break (current, true);
                }
                if current != start {
                    if let Some((root, false)) = memo[current] {
                        break (root, false);
                    }
                }
                match parent_row[current] {
                    Some(parent) => current = parent,
                    None => break (current, false),
                }
            };
            memo[start] = Some(resolved);
        }

        let roots = memo
            .into_iter()
            .enumerate()
            .map(|(idx, resolved)| resolved.map_or(idx, |(root, _)| root))
            .collect();
        Self { parent_row, roots }
    }
}

/// Field nodes keyed by (root, origin file, name). Built once, read-only
/// afterwards.
#[derive(Debug, Default)]
pub struct LineageGraph {
    nodes: Arena<FieldNode>,
    scoped: HashMap<(usize, String, String), ArenaIndex>,
    by_name: IndexMap<String, Vec<ArenaIndex>>,
    by_handle: IndexMap<String, Vec<ArenaIndex>>,
}

impl LineageGraph {
    pub fn build(rows: &[FieldRow], options: GraphOptions) -> Self {
        let scopes = Scopes::resolve(rows);
        let mut graph = LineageGraph::default();

        let row_nodes: Vec<ArenaIndex> = rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let root = scopes.roots[idx];
                let key = (root, row.origin_file.clone(), row.name.clone());
                let node_idx = match graph.scoped.get(&key) {
                    Some(existing) => *existing,
                    None => {
                        let node_idx = graph.nodes.allocate(FieldNode {
                            name: row.name.clone(),
                            scope: ScopeKey {
                                root,
                                origin_file: row.origin_file.clone(),
                            },
                            root_name: rows[root].name.clone(),
                            parent: None,
                            sources: IndexSet::new(),
                            handles: BTreeSet::new(),
                            assignments: BTreeSet::new(),
                        });
                        graph.scoped.insert(key, node_idx);
                        graph.by_name.entry(row.name.clone()).or_default().push(node_idx);
                        node_idx
                    }
                };
                let node = &mut graph.nodes[node_idx];
                node.handles.extend(row.handles.iter().cloned());
                node.assignments.extend(row.assignments.iter().cloned());
                node_idx
            })
            .collect();

        for (idx, row) in rows.iter().enumerate() {
            let node_idx = row_nodes[idx];
            let root = scopes.roots[idx];

            if let Some(parent) = scopes.parent_row[idx] {
                let parent_node = row_nodes[parent];
                if scopes.roots[parent] == root
                    && parent_node != node_idx
                    && graph.nodes[node_idx].parent.is_none()
                {
                    graph.nodes[node_idx].parent = Some(parent_node);
                }
            }

            for source in &row.data_flow_sources {
                let key = (root, row.origin_file.clone(), source.clone());
                let resolved = graph.scoped.get(&key).copied().or_else(|| {
                    if !options.allow_cross_scope_if_unique {
                        return None;
                    }
                    match graph.by_name.get(source).map(Vec::as_slice) {
                        Some([only]) => Some(*only),
                        _ => None,
                    }
                });
                if let Some(source_node) = resolved.filter(|s| *s != node_idx) {
                    graph.nodes[node_idx].sources.insert(source_node);
                }
            }
        }

        for (node_idx, node) in graph.nodes.iter() {
            for handle in &node.handles {
                graph.by_handle.entry(handle.clone()).or_default().push(node_idx);
            }
        }

        log::debug!(
            "Lineage graph: {} nodes from {} rows, {} handles",
            graph.nodes.len(),
            rows.len(),
            graph.by_handle.len()
        );
        graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, idx: ArenaIndex) -> &FieldNode {
        &self.nodes[idx]
    }

    pub fn nodes_named(&self, name: &str) -> &[ArenaIndex] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.by_name.keys()
    }

    /// Every field node bound to `handle`, across all scopes.
    pub fn bound_to_handle(&self, handle: &str) -> &[ArenaIndex] {
        self.by_handle.get(handle).map_or(&[], Vec::as_slice)
    }
}
