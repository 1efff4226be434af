use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    path::Path,
    str::FromStr,
    sync::LazyLock,
};

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::{
    ident::{IDENT, identifiers_in, normalize, sanitize_token},
    sources::{collect_files, read_source, scan_files},
};

static DIVISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(IDENTIFICATION|ID|ENVIRONMENT|DATA|PROCEDURE)\s+DIVISION\b")
        .expect("valid division regex")
});

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\s*({IDENT})\s+SECTION\s*\.")).expect("valid section regex")
});

static FILE_DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\s*(?:FD|SD)\s+({IDENT})")).expect("valid fd regex")
});

static LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\s*(\d{{1,2}})\s+({IDENT})")).expect("valid level regex")
});

static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\bSELECT\s+(?:OPTIONAL\s+)?({IDENT})")).expect("valid select regex")
});

static ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bASSIGN\s+(?:TO\s+)?").expect("valid assign regex")
});

static READ_INTO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\bREAD\s+({IDENT})\b.*?\bINTO\s+({IDENT})"))
        .expect("valid read-into regex")
});

static MOVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\bMOVE\s+({IDENT})\s+TO\s+({IDENT})")).expect("valid move regex")
});

static COMPUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\bCOMPUTE\s+({IDENT})(?:\s+ROUNDED)?\s*="))
        .expect("valid compute regex")
});

/// Clause keywords that may follow the assignment literal of a SELECT entry.
const ASSIGN_STOP_WORDS: &[&str] = &[
    "FILE",
    "ORGANIZATION",
    "ORGANISATION",
    "ACCESS",
    "STATUS",
    "RECORD",
    "LOCK",
    "RESERVE",
    "ALTERNATE",
    "PADDING",
    "SELECT",
];

/// Verbs that end the expression of a COMPUTE statement.
const STATEMENT_VERBS: &[&str] = &[
    "ACCEPT", "ADD", "CALL", "COMPUTE", "DISPLAY", "DIVIDE", "ELSE", "END-COMPUTE", "END-IF",
    "EVALUATE", "EXIT", "GO", "GOBACK", "IF", "INITIALIZE", "MOVE", "MULTIPLY", "ON", "PERFORM",
    "READ", "SET", "STOP", "STRING", "SUBTRACT", "UNSTRING", "WHEN", "WRITE",
];

/// Words that look like identifiers but never name a field.
const RESERVED_WORDS: &[&str] = &[
    "ALL", "AND", "FUNCTION", "HIGH-VALUE", "HIGH-VALUES", "IN", "LOW-VALUE", "LOW-VALUES",
    "NOT", "NULL", "NULLS", "OF", "OR", "QUOTE", "QUOTES", "ROUNDED", "SPACE", "SPACES", "ZERO",
    "ZEROES", "ZEROS",
];

fn is_field_reference(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().all(|c| c.is_ascii_digit())
        && !RESERVED_WORDS.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Division {
    #[strum(serialize = "IDENTIFICATION", serialize = "ID")]
    Identification,
    Environment,
    Data,
    Procedure,
}

/// A recognized source construct. Declaration-pass lines yield the first
/// five kinds, procedural sentences the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Construct {
    Division(Division),
    Section(String),
    FileDescription(String),
    Declaration { level: u8, name: String },
    AssignClause { file: String, literal: String },
    ReadInto { handle: String, buffer: String },
    Move { source: String, target: String },
    Compute { target: String, sources: Vec<String> },
}

/// One declaration occurrence (or implicitly referenced field) and its bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldRow {
    pub name: String,
    pub origin_file: String,
    pub declared_at: Option<usize>,
    pub parent_field: Option<String>,
    pub handles: BTreeSet<String>,
    pub assignments: BTreeSet<String>,
    pub data_flow_sources: BTreeSet<String>,
    pub summary_trace: String,
}

/// Strips sequence/indicator areas and comments. Returns `None` for lines
/// with no code.
pub fn code_text(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.trim_start().starts_with('*') {
        return None;
    }
    if matches!(line.as_bytes().get(6), Some(b'*') | Some(b'/')) {
        return None;
    }

    let mut code = line;
    let has_sequence_area = line
        .get(..6)
        .is_some_and(|seq| seq.chars().all(|c| c.is_ascii_digit()));
    if has_sequence_area {
        code = line.get(7..).unwrap_or_default();
        if line.len() > 72 {
            code = line.get(7..72).unwrap_or(code);
        }
    }
    if let Some(pos) = code.find("*>") {
        code = &code[..pos];
    }
    let code = code.trim_end();
    (!code.trim().is_empty()).then_some(code)
}

/// Classifies one physical line for the declaration pass.
pub fn classify_declaration_line(line: &str) -> Option<Construct> {
    if let Some(caps) = DIVISION_RE.captures(line) {
        return Division::from_str(&caps[1]).ok().map(Construct::Division);
    }
    if let Some(caps) = FILE_DESCRIPTION_RE.captures(line) {
        return Some(Construct::FileDescription(normalize(&caps[1])));
    }
    if let Some(caps) = SECTION_RE.captures(line) {
        return Some(Construct::Section(normalize(&caps[1])));
    }
    if let Some(caps) = LEVEL_RE.captures(line) {
        let level = caps[1].parse::<u8>().ok()?;
        return Some(Construct::Declaration {
            level,
            name: normalize(&caps[2]),
        });
    }
    None
}

fn assign_literal(after_assign: &str) -> String {
    let clause = after_assign.split('.').next().unwrap_or_default();
    clause
        .split_whitespace()
        .take_while(|word| !ASSIGN_STOP_WORDS.contains(&word.to_uppercase().as_str()))
        .map(sanitize_token)
        .find(|token| !token.is_empty())
        .unwrap_or_default()
}

fn compute_sources(expression: &str, target: &str) -> Vec<String> {
    identifiers_in(expression)
        .into_iter()
        .take_while(|ident| !STATEMENT_VERBS.contains(&ident.as_str()))
        .filter(|ident| is_field_reference(ident) && ident != target)
        .collect()
}

/// Classifies one period-terminated sentence for the procedural pass.
pub fn classify_sentence(sentence: &str) -> Vec<Construct> {
    let mut constructs = vec![];

    if let Some(select) = SELECT_RE.captures(sentence) {
        let rest = &sentence[select.get(0).map_or(0, |m| m.end())..];
        if let Some(assign) = ASSIGN_RE.find(rest) {
            let literal = assign_literal(&rest[assign.end()..]);
            if !literal.is_empty() {
                constructs.push(Construct::AssignClause {
                    file: normalize(&select[1]),
                    literal,
                });
            }
        }
    }

    for caps in READ_INTO_RE.captures_iter(sentence) {
        let handle = sanitize_token(&caps[1]);
        if !handle.is_empty() {
            constructs.push(Construct::ReadInto {
                handle,
                buffer: normalize(&caps[2]),
            });
        }
    }

    for caps in MOVE_RE.captures_iter(sentence) {
        let (source, target) = (normalize(&caps[1]), normalize(&caps[2]));
        if is_field_reference(&source) && is_field_reference(&target) && source != target {
            constructs.push(Construct::Move { source, target });
        }
    }

    let computes: Vec<_> = COMPUTE_RE.captures_iter(sentence).collect();
    for (idx, caps) in computes.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        let end = computes
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(sentence.len(), |m| m.start());
        let target = normalize(&caps[1]);
        let sources = compute_sources(&sentence[whole.end()..end], &target);
        constructs.push(Construct::Compute { target, sources });
    }

    constructs
}

/// Joins code lines into period-terminated sentences.
pub fn sentences(text: &str) -> Vec<String> {
    let mut out = vec![];
    let mut buf: Vec<&str> = vec![];
    for line in text.lines().filter_map(code_text) {
        buf.push(line.trim());
        if line.ends_with('.') {
            out.push(buf.join(" "));
            buf.clear();
        }
    }
    if !buf.is_empty() {
        out.push(buf.join(" "));
    }
    out
}

#[derive(Debug, Clone)]
struct Declared {
    name: String,
    line: Option<usize>,
    parent: Option<usize>,
    handles: BTreeSet<String>,
    assignments: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct DeclarationState {
    division: Option<Division>,
    handle: Option<String>,
    root: Option<usize>,
    stack: Vec<(u8, usize)>,
}

impl DeclarationState {
    fn in_data(&self) -> bool {
        matches!(self.division, None | Some(Division::Data))
    }

    fn reset_group(&mut self) {
        self.root = None;
        self.stack.clear();
    }
}

/// Per-file scan state, shared by the declaration and procedural passes and
/// turned into rows once the file is complete.
#[derive(Debug, Default)]
struct FileScan {
    file: String,
    fields: Vec<Declared>,
    by_name: IndexMap<String, Vec<usize>>,
    assignments: IndexMap<String, String>,
    sources: IndexMap<String, BTreeSet<String>>,
}

impl FileScan {
    fn new(file: &str) -> Self {
        Self {
            file: file.to_owned(),
            ..Default::default()
        }
    }

    fn declare(&mut self, name: &str, line: Option<usize>, parent: Option<usize>) -> usize {
        let idx = self.fields.len();
        self.fields.push(Declared {
            name: name.to_owned(),
            line,
            parent,
            handles: BTreeSet::new(),
            assignments: BTreeSet::new(),
        });
        self.by_name.entry(name.to_owned()).or_default().push(idx);
        idx
    }

    /// Indices of every occurrence of `name`, adding an undeclared field if needed.
    fn ensure(&mut self, name: &str) -> Vec<usize> {
        if let Some(indices) = self.by_name.get(name) {
            return indices.clone();
        }
        vec![self.declare(name, None, None)]
    }

    fn declaration_pass(&mut self, text: &str) {
        let mut state = DeclarationState::default();

        for (idx, raw) in text.lines().enumerate() {
            let Some(line) = code_text(raw) else { continue };
            let Some(construct) = classify_declaration_line(line) else {
                continue;
            };
            match construct {
                Construct::Division(division) => {
                    state.division = Some(division);
                    if division == Division::Data {
                        state.handle = None;
                        state.reset_group();
                    }
                }
                Construct::Section(_) if state.in_data() => {
                    state.handle = None;
                    state.reset_group();
                }
                Construct::FileDescription(handle) if state.in_data() => {
                    state.handle = Some(sanitize_token(&handle));
                    state.reset_group();
                }
                Construct::Declaration { level, name } if state.in_data() => {
                    let unnamed = matches!(name.as_str(), "FILLER" | "PIC" | "PICTURE");
                    if matches!(level, 1 | 77) {
                        // an unnamed record still closes the previous group
                        state.reset_group();
                        if unnamed {
                            continue;
                        }
                        let field = self.declare(&name, Some(idx + 1), None);
                        state.root = Some(field);
                        if level == 1 {
                            if let Some(handle) = &state.handle {
                                self.fields[field].handles.insert(handle.clone());
                            }
                        }
                        continue;
                    }
                    if level == 66 || level == 88 || unnamed {
                        continue;
                    }
                    while state.stack.last().is_some_and(|(lvl, _)| *lvl >= level) {
                        state.stack.pop();
                    }
                    let parent = state.stack.last().map(|(_, p)| *p).or(state.root);
                    let field = self.declare(&name, Some(idx + 1), parent);
                    state.stack.push((level, field));
                }
                _ => {}
            }
        }
    }

    fn procedural_pass(&mut self, text: &str) {
        for sentence in sentences(text) {
            for construct in classify_sentence(&sentence) {
                match construct {
                    Construct::AssignClause { file, literal } => {
                        self.assignments.entry(file).or_insert(literal);
                    }
                    Construct::ReadInto { handle, buffer } => {
                        for field in self.ensure(&buffer) {
                            self.fields[field].handles.insert(handle.clone());
                        }
                    }
                    Construct::Move { source, target } => {
                        self.ensure(&source);
                        self.ensure(&target);
                        self.sources.entry(target).or_default().insert(source);
                    }
                    Construct::Compute { target, sources } => {
                        self.ensure(&target);
                        for source in sources {
                            self.ensure(&source);
                            self.sources.entry(target.clone()).or_default().insert(source);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn propagate_bindings(&mut self) {
        let mut children: Vec<Vec<usize>> = vec![vec![]; self.fields.len()];
        for (idx, field) in self.fields.iter().enumerate() {
            if let Some(parent) = field.parent {
                children[parent].push(idx);
            }
        }

        let seeds: Vec<(usize, BTreeSet<String>)> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| !field.handles.is_empty())
            .map(|(idx, field)| (idx, field.handles.clone()))
            .collect();
        for (seed, handles) in seeds {
            let mut queue = VecDeque::from([seed]);
            let mut visited = HashSet::from([seed]);
            while let Some(current) = queue.pop_front() {
                self.fields[current].handles.extend(handles.iter().cloned());
                for &child in &children[current] {
                    if visited.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }

        for idx in 0..self.fields.len() {
            if let Some(parent) = self.fields[idx].parent {
                let inherited = self.fields[parent].handles.clone();
                self.fields[idx].handles.extend(inherited);
            }
            let field = &mut self.fields[idx];
            field.handles = field
                .handles
                .iter()
                .map(|h| sanitize_token(h))
                .filter(|h| !h.is_empty())
                .collect();
            for handle in &field.handles {
                if let Some(literal) = self.assignments.get(handle) {
                    field.assignments.insert(sanitize_token(literal));
                }
            }
        }
    }

    /// Shortest data-flow chain from `name` to a field carrying a handle.
    fn summary_trace(&self, name: &str) -> String {
        const MAX_DEPTH: usize = 50;
        const MAX_PARENT_HOPS: usize = 20;

        let first = |n: &str| self.by_name.get(n).and_then(|v| v.first()).copied();
        let origin = |n: &str| -> Option<(String, String)> {
            let mut current = first(n);
            let mut hops = 0;
            while let Some(idx) = current {
                if hops > MAX_PARENT_HOPS {
                    break;
                }
                let field = &self.fields[idx];
                if let Some(handle) = field.handles.iter().next() {
                    let assign = self.assignments.get(handle).cloned().unwrap_or_default();
                    return Some((handle.clone(), assign));
                }
                current = field.parent;
                hops += 1;
            }
            None
        };

        let mut queue = VecDeque::from([vec![name.to_owned()]]);
        let mut seen_edges = HashSet::new();
        while let Some(path) = queue.pop_front() {
            let Some(current) = path.last() else { continue };
            if let Some((handle, assign)) = origin(current) {
                return format!("{} (HANDLE={}; ASSIGN={})", path.join(" <- "), handle, assign);
            }
            if path.len() > MAX_DEPTH {
                continue;
            }
            for source in self.sources.get(current).into_iter().flatten() {
                if seen_edges.insert((current.clone(), source.clone())) {
                    let mut next = path.clone();
                    next.push(source.clone());
                    queue.push_back(next);
                }
            }
        }
        format!("{}: no handle/assignment origin found", name)
    }

    fn into_rows(self) -> Vec<FieldRow> {
        self.fields
            .iter()
            .map(|field| {
                let data_flow_sources: BTreeSet<String> = self
                    .sources
                    .get(&field.name)
                    .into_iter()
                    .flatten()
                    .map(|s| sanitize_token(s))
                    .filter(|s| !s.is_empty())
                    .collect();
                let summary_trace = if field.handles.is_empty() && data_flow_sources.is_empty() {
                    String::new()
                } else {
                    self.summary_trace(&field.name)
                };
                FieldRow {
                    name: field.name.clone(),
                    origin_file: self.file.clone(),
                    declared_at: field.line,
                    parent_field: field.parent.map(|p| self.fields[p].name.clone()),
                    handles: field.handles.clone(),
                    assignments: field.assignments.clone(),
                    data_flow_sources,
                    summary_trace,
                }
            })
            .collect()
    }
}

/// Scans one field-declaration/procedural source file into raw field rows.
pub fn scan_field_source(file: &str, text: &str) -> Vec<FieldRow> {
    let mut scan = FileScan::new(file);
    scan.declaration_pass(text);
    scan.procedural_pass(text);
    scan.propagate_bindings();
    scan.into_rows()
}

pub fn scan_fields(dir: &Path, extensions: &[String], parallel: bool) -> Vec<FieldRow> {
    let files = collect_files(dir, extensions);
    let rows = scan_files(&files, parallel, |path, text| {
        scan_field_source(&path.display().to_string(), text)
    });
    log::info!(
        "Scanned {} field rows from {} files in {}",
        rows.len(),
        files.len(),
        dir.display()
    );
    rows
}

/// Names of every field declared in the copybook directory (88 levels and
/// fillers excluded).
pub fn copybook_field_names(dir: &Path, extensions: &[String]) -> IndexSet<String> {
    let mut names = IndexSet::new();
    for path in collect_files(dir, extensions) {
        let text = match read_source(&path) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Skipping unreadable copybook {}: {}", path.display(), err);
                continue;
            }
        };
        for line in text.lines().filter_map(code_text) {
            if let Some(Construct::Declaration { level, name }) = classify_declaration_line(line) {
                if level != 88 && name != "FILLER" {
                    names.insert(name);
                }
            }
        }
    }
    log::debug!("{} copybook field names in {}", names.len(), dir.display());
    names
}
