use copytrace::{
    lineage::{
        graph::{GraphOptions, LineageGraph, Scopes},
        search::{LineagePath, PathNode, SearchLimits, ranked_leaf_paths, successors},
    },
    scanner::{FieldRow, scan_field_source},
};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
struct LineageTest {
    description: String,
    start: String,
    rows: Vec<TestRow>,
    expected_paths: Vec<String>,
    max_depth: Option<usize>,
    max_paths: Option<usize>,
    #[serde(default)]
    allow_cross_scope_if_unique: bool,
}

#[derive(Deserialize, Debug)]
struct TestRow {
    name: String,
    #[serde(default = "default_file")]
    file: String,
    parent: Option<String>,
    #[serde(default)]
    handles: Vec<String>,
    #[serde(default)]
    assignments: Vec<String>,
    #[serde(default)]
    sources: Vec<String>,
}

fn default_file() -> String {
    "PAYCALC.cbl".to_owned()
}

#[derive(Deserialize, Debug)]
struct LineageTestData {
    tests: Vec<LineageTest>,
}

const LINEAGE_TESTS_FILE: &str = "tests/lineage_tests.toml";

impl From<&TestRow> for FieldRow {
    fn from(row: &TestRow) -> Self {
        FieldRow {
            name: row.name.clone(),
            origin_file: row.file.clone(),
            parent_field: row.parent.clone(),
            handles: row.handles.iter().cloned().collect(),
            assignments: row.assignments.iter().cloned().collect(),
            data_flow_sources: row.sources.iter().cloned().collect(),
            ..Default::default()
        }
    }
}

fn row(name: &str, parent: Option<&str>) -> FieldRow {
    FieldRow {
        name: name.to_owned(),
        origin_file: "PAYCALC.cbl".to_owned(),
        parent_field: parent.map(str::to_owned),
        ..Default::default()
    }
}

#[test]
fn test_lineage() {
    let lineage_data_file =
        std::fs::read_to_string(LINEAGE_TESTS_FILE).expect("Cannot open lineage test cases");
    let test_lineage_data: LineageTestData =
        toml::from_str(&lineage_data_file).expect("Cannot parse test cases defined in toml");

    for test in test_lineage_data.tests {
        println!("Testing lineage: {}", &test.description);

        let rows: Vec<FieldRow> = test.rows.iter().map(FieldRow::from).collect();
        let graph = LineageGraph::build(
            &rows,
            GraphOptions {
                allow_cross_scope_if_unique: test.allow_cross_scope_if_unique,
            },
        );
        let defaults = SearchLimits::default();
        let limits = SearchLimits {
            max_depth: test.max_depth.unwrap_or(defaults.max_depth),
            max_paths: test.max_paths.unwrap_or(defaults.max_paths),
        };

        let paths = ranked_leaf_paths(&graph, graph.nodes_named(&test.start), limits);
        let rendered: Vec<String> = paths.iter().map(|path| path.render(&graph)).collect();
        assert_eq!(rendered, test.expected_paths, "{}", test.description);
    }
}

#[test]
fn test_rows_in_one_scope_merge_into_one_node() {
    let mut first = row("PAY-AMT", Some("PAY-REC"));
    first.handles.insert("PAYFILE".to_owned());
    let mut second = row("PAY-AMT", Some("PAY-REC"));
    second.handles.insert("PAYBKUP".to_owned());
    second.data_flow_sources.insert("PAY-RATE".to_owned());
    let rows = vec![
        row("PAY-REC", None),
        first,
        second,
        row("PAY-RATE", Some("PAY-REC")),
    ];

    let graph = LineageGraph::build(&rows, GraphOptions::default());
    assert_eq!(graph.node_count(), 3);

    let nodes = graph.nodes_named("PAY-AMT");
    assert_eq!(nodes.len(), 1);
    let node = graph.node(nodes[0]);
    assert_eq!(node.root_name, "PAY-REC");
    assert_eq!(
        node.handles.iter().collect::<Vec<_>>(),
        vec!["PAYBKUP", "PAYFILE"]
    );
    assert_eq!(node.parent, graph.nodes_named("PAY-REC").first().copied());
    assert_eq!(node.sources.len(), 1);
}

#[test]
fn test_same_name_in_other_file_is_other_scope() {
    let mut other = row("PAY-REC", None);
    other.origin_file = "PAYPOST.cbl".to_owned();
    let rows = vec![row("PAY-REC", None), other];

    let graph = LineageGraph::build(&rows, GraphOptions::default());
    let nodes = graph.nodes_named("PAY-REC");
    assert_eq!(nodes.len(), 2);
    assert_ne!(graph.node(nodes[0]).scope, graph.node(nodes[1]).scope);
}

#[test]
fn test_data_flow_resolves_within_own_record() {
    let source = [
        "       DATA DIVISION.",
        "       WORKING-STORAGE SECTION.",
        "       01  IN-REC.",
        "           05  AMT             PIC 9(5).",
        "           05  TOTAL           PIC 9(6).",
        "       01  WS-REC.",
        "           05  AMT             PIC 9(5).",
        "           05  TOTAL           PIC 9(6).",
        "       PROCEDURE DIVISION.",
        "           COMPUTE TOTAL = AMT + 1.",
    ]
    .join("\n");
    let rows = scan_field_source("TOTALS.cbl", &source);
    let graph = LineageGraph::build(&rows, GraphOptions::default());

    let totals = graph.nodes_named("TOTAL");
    assert_eq!(totals.len(), 2);
    assert_eq!(graph.nodes_named("AMT").len(), 2);
    for &total in totals {
        let node = graph.node(total);
        let sources: Vec<(&str, &str)> = node
            .sources
            .iter()
            .map(|&source| {
                let source = graph.node(source);
                (source.name.as_str(), source.root_name.as_str())
            })
            .collect();
        assert_eq!(sources, vec![("AMT", node.root_name.as_str())]);
    }
    let roots: Vec<&str> = totals
        .iter()
        .map(|&total| graph.node(total).root_name.as_str())
        .collect();
    assert_eq!(roots, vec!["IN-REC", "WS-REC"]);
}

#[test]
fn test_parent_cycle_resolves_roots() {
    let rows = vec![row("LOOP-A", Some("LOOP-B")), row("LOOP-B", Some("LOOP-A"))];

    let scopes = Scopes::resolve(&rows);
    assert_eq!(scopes.parent_row, vec![Some(1), Some(0)]);
    assert_eq!(scopes.roots, vec![0, 1]);

    let graph = LineageGraph::build(&rows, GraphOptions::default());
    assert_eq!(graph.node_count(), 2);
    let paths = ranked_leaf_paths(&graph, graph.nodes_named("LOOP-A"), SearchLimits::default());
    let rendered: Vec<String> = paths.iter().map(|path| path.render(&graph)).collect();
    assert_eq!(rendered, vec!["LOOP-A"]);
}

#[test]
fn test_parent_is_nearest_preceding_row() {
    let rows = vec![
        row("GRP", None),
        row("ITEM", Some("GRP")),
        row("GRP", None),
        row("ITEM", Some("GRP")),
    ];

    let scopes = Scopes::resolve(&rows);
    assert_eq!(scopes.parent_row, vec![None, Some(0), None, Some(2)]);
    assert_eq!(scopes.roots, vec![0, 0, 2, 2]);
}

#[test]
fn test_handle_expands_to_assignments_of_every_bound_field() {
    let mut buffer = row("IN-BUF", None);
    buffer.handles.insert("INFILE".to_owned());
    buffer.assignments.insert("INDD".to_owned());
    let mut record = row("IN-REC", None);
    record.handles.insert("INFILE".to_owned());
    record.assignments.insert("INDD".to_owned());
    let rows = vec![buffer, record];

    let graph = LineageGraph::build(&rows, GraphOptions::default());
    assert_eq!(graph.bound_to_handle("INFILE").len(), 2);
    assert_eq!(
        successors(&graph, &PathNode::Handle("INFILE".to_owned())),
        vec![PathNode::Assign("INDD".to_owned())]
    );
    assert!(successors(&graph, &PathNode::Assign("INDD".to_owned())).is_empty());
}

#[test]
fn test_path_rank() {
    let graph = LineageGraph::build(&[row("X", None)], GraphOptions::default());
    let start = graph.nodes_named("X")[0];
    let mut path = LineagePath::new(start);
    assert_eq!(path.rank(), (2, 1));
    path.nodes.push(PathNode::Handle("XFILE".to_owned()));
    assert_eq!(path.rank(), (1, 2));
    path.nodes.push(PathNode::Assign("XDD".to_owned()));
    assert_eq!(path.rank(), (0, 3));
    assert_eq!(path.render(&graph), "X <- HANDLE:XFILE <- ASSIGN:XDD");
}
