pub mod graph;
pub mod producer;
pub mod search;

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};

use crate::{
    arena::ArenaIndex,
    config::{ProducerConfig, SearchConfig},
    ident::sanitize_token,
    lineage::{
        graph::{GraphOptions, LineageGraph},
        producer::{EnrichedRow, JobIndex},
        search::{SearchLimits, ranked_leaf_paths},
    },
    scanner::FieldRow,
};

/// Field names to trace, each with every scoped node carrying that name,
/// in name order.
///
/// An empty allow-list does not filter. A query restricts tracing to the
/// single (sanitized) field it names.
pub fn start_nodes(
    graph: &LineageGraph,
    allow_list: Option<&IndexSet<String>>,
    query: Option<&str>,
) -> IndexMap<String, Vec<ArenaIndex>> {
    let query = query.map(sanitize_token).filter(|q| !q.is_empty());
    let mut names: Vec<&String> = graph
        .names()
        .filter(|name| match allow_list {
            Some(allowed) if !allowed.is_empty() => allowed.contains(*name),
            _ => true,
        })
        .filter(|name| query.as_ref().is_none_or(|q| q == *name))
        .collect();
    names.sort();

    names
        .into_iter()
        .map(|name| (name.clone(), graph.nodes_named(name).to_vec()))
        .collect()
}

/// Builds the scoped graph from `fields`, searches from every start field
/// and enriches each leaf path with its job-control context.
pub fn extract_lineage(
    fields: &[FieldRow],
    jobs: &JobIndex,
    allow_list: Option<&IndexSet<String>>,
    search: &SearchConfig,
    producer: &ProducerConfig,
) -> Vec<EnrichedRow> {
    let graph = LineageGraph::build(
        fields,
        GraphOptions {
            allow_cross_scope_if_unique: search.allow_cross_scope_if_unique,
        },
    );
    let limits = SearchLimits {
        max_depth: search.max_depth,
        max_paths: search.max_paths_per_start,
    };
    let allow_list = allow_list.filter(|_| search.include_only_copybook);
    let starts = start_nodes(&graph, allow_list, search.query.as_deref());
    log::info!(
        "Tracing {} fields over {} nodes",
        starts.len(),
        graph.node_count()
    );

    let mut seen = HashSet::new();
    let mut rows = vec![];
    for (name, nodes) in &starts {
        let paths = ranked_leaf_paths(&graph, nodes, limits);
        log::debug!("{}: {} paths", name, paths.len());
        for path in &paths {
            let row = jobs.enrich(&graph, path, producer);
            if seen.insert(row.dedup_key()) {
                rows.push(row);
            }
        }
    }
    rows
}
