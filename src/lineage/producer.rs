use std::{
    collections::HashMap,
    sync::LazyLock,
};

use regex::Regex;
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::{
    config::ProducerConfig,
    ident::{program_name_from_file, sanitize_token},
    job_control::{DataStepRecord, JobControlRecord},
    lineage::{graph::LineageGraph, search::LineagePath},
};

/// Handles that never carry business data into a step.
pub const RESERVED_HANDLES: &[&str] = &["SYSOUT", "SYSPRINT", "SYSUDUMP", "SYSIN", "SYSABOUT"];

const CONTROL_INPUT_HANDLE: &str = "SYSIN";

static SUB_MEMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bDSN(?:AME)?\s*=\s*[^()]*\(\s*([A-Z0-9_$#@]+)\s*\)").expect("valid member regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum TerminalKind {
    Assign,
    Handle,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedRow {
    pub start_field: String,
    pub terminal_kind: TerminalKind,
    pub terminal_key: String,
    pub matching_job_rows: String,
    pub matching_data_step_rows: String,
    pub producer_file: String,
    pub producer_step: String,
    pub producer_executable: String,
    pub producer_inputs: Vec<String>,
    pub sub_member: String,
    pub rendered_path: String,
    pub hint_origin_file: String,
}

impl EnrichedRow {
    pub fn dedup_key(&self) -> (String, TerminalKind, String, String) {
        (
            self.start_field.clone(),
            self.terminal_kind,
            self.terminal_key.clone(),
            self.rendered_path.clone(),
        )
    }
}

/// The step that wrote the dataset a field was traced to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer<'a> {
    pub record: &'a JobControlRecord,
    pub inputs: Vec<String>,
    pub sub_member: String,
}

/// Job-control and data-step rows grouped by handle. Built once per run.
#[derive(Debug, Default)]
pub struct JobIndex {
    proc_rows: Vec<JobControlRecord>,
    job_rows: Vec<JobControlRecord>,
    data_step_rows: Vec<DataStepRecord>,
    proc_by_handle: HashMap<String, Vec<usize>>,
    job_by_handle: HashMap<String, Vec<usize>>,
    data_steps_by_handle: HashMap<String, Vec<usize>>,
}

fn group_by_key<T>(rows: &[T], key: impl Fn(&T) -> &str) -> HashMap<String, Vec<usize>> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        let key = sanitize_token(key(row));
        if !key.is_empty() {
            groups.entry(key).or_default().push(idx);
        }
    }
    groups
}

impl JobIndex {
    pub fn new(
        proc_rows: Vec<JobControlRecord>,
        job_rows: Vec<JobControlRecord>,
        data_step_rows: Vec<DataStepRecord>,
    ) -> Self {
        let proc_by_handle = group_by_key(&proc_rows, |r| r.handle.as_str());
        let job_by_handle = group_by_key(&job_rows, |r| r.handle.as_str());
        let data_steps_by_handle = group_by_key(&data_step_rows, |r| r.handle_or_dataset.as_str());
        Self {
            proc_rows,
            job_rows,
            data_step_rows,
            proc_by_handle,
            job_by_handle,
            data_steps_by_handle,
        }
    }

    fn all_job_control(&self) -> impl Iterator<Item = &JobControlRecord> {
        self.proc_rows.iter().chain(self.job_rows.iter())
    }

    fn rows_for<'a, T>(
        rows: &'a [T],
        groups: &HashMap<String, Vec<usize>>,
        key: &str,
    ) -> Vec<&'a T> {
        groups
            .get(key)
            .map(|idxs| idxs.iter().map(|idx| &rows[*idx]).collect())
            .unwrap_or_default()
    }

    /// Resolves the step that produced the dataset `selected` refers to: a
    /// row in another file+step naming the same dataset (or tail), favoring
    /// the configured transformation programs.
    pub fn resolve_producer(
        &self,
        selected: &JobControlRecord,
        config: &ProducerConfig,
    ) -> Option<Producer<'_>> {
        let candidates: Vec<&JobControlRecord> = self
            .all_job_control()
            .filter(|row| row.same_dataset(selected) && !row.same_step(selected))
            .collect();
        let producer = candidates
            .iter()
            .find(|row| config.is_preferred_executable(&row.program()))
            .or_else(|| candidates.first())
            .copied()?;

        let output_handle = producer.handle.to_uppercase();
        let mut inputs = vec![];
        let mut sub_member = String::new();
        for row in self.all_job_control().filter(|row| row.same_step(producer)) {
            let handle = row.handle.to_uppercase();
            if handle == output_handle {
                continue;
            }
            if RESERVED_HANDLES.contains(&handle.as_str()) {
                if handle == CONTROL_INPUT_HANDLE && sub_member.is_empty() {
                    sub_member = embedded_member(&row.raw_text).unwrap_or_default();
                }
                continue;
            }
            let dataset = if row.dataset.is_empty() {
                row.dataset_tail()
            } else {
                row.dataset.clone()
            };
            if !dataset.is_empty() {
                inputs.push(format!("{handle}={dataset}"));
            }
        }

        log::debug!(
            "Producer of {} is {}:{} ({} inputs)",
            selected.dataset,
            producer.file,
            producer.step,
            inputs.len()
        );
        Some(Producer {
            record: producer,
            inputs,
            sub_member,
        })
    }

    /// Builds the output row for one lineage path.
    pub fn enrich(
        &self,
        graph: &LineageGraph,
        path: &LineagePath,
        config: &ProducerConfig,
    ) -> EnrichedRow {
        let start_field = path
            .nodes
            .first()
            .map(|node| node.label(graph))
            .unwrap_or_default();
        let hint_origin_file = path
            .fields()
            .next()
            .map(|idx| graph.node(idx).scope.origin_file.clone())
            .unwrap_or_default();
        let program = program_name_from_file(&hint_origin_file);

        let (terminal_kind, terminal_key) = terminal_key(path, config.prefer_assign_over_handle);

        let proc_rows = narrow_to_program(
            Self::rows_for(&self.proc_rows, &self.proc_by_handle, &terminal_key),
            &program,
        );
        let job_rows = narrow_to_program(
            Self::rows_for(&self.job_rows, &self.job_by_handle, &terminal_key),
            &program,
        );
        let data_step_rows = Self::rows_for(
            &self.data_step_rows,
            &self.data_steps_by_handle,
            &terminal_key,
        );

        let producer = proc_rows
            .first()
            .or_else(|| job_rows.first())
            .and_then(|selected| self.resolve_producer(selected, config));

        let matching_job_rows = proc_rows
            .iter()
            .chain(job_rows.iter())
            .map(|row| {
                format!(
                    "{}|{}|{}|{}|{}|{}",
                    row.file,
                    row.step,
                    row.executable,
                    row.program(),
                    row.handle,
                    row.dataset
                )
            })
            .collect::<Vec<_>>()
            .join(" || ");
        let matching_data_step_rows = data_step_rows
            .iter()
            .map(|row| {
                format!(
                    "{}|{}|{}|{}",
                    row.file, row.data_step, row.construct_kind, row.handle_or_dataset
                )
            })
            .collect::<Vec<_>>()
            .join(" || ");

        let (producer_file, producer_step, producer_executable, producer_inputs, sub_member) =
            match producer {
                Some(producer) => (
                    producer.record.file.clone(),
                    producer.record.step.clone(),
                    producer.record.executable.clone(),
                    producer.inputs,
                    producer.sub_member,
                ),
                None => Default::default(),
            };

        EnrichedRow {
            start_field,
            terminal_kind,
            terminal_key,
            matching_job_rows,
            matching_data_step_rows,
            producer_file,
            producer_step,
            producer_executable,
            producer_inputs,
            sub_member,
            rendered_path: path.render(graph),
            hint_origin_file,
        }
    }
}

/// Keeps the rows run by `program`, unless none are.
fn narrow_to_program<'a>(
    rows: Vec<&'a JobControlRecord>,
    program: &str,
) -> Vec<&'a JobControlRecord> {
    if program.is_empty() {
        return rows;
    }
    let narrowed: Vec<_> = rows
        .iter()
        .copied()
        .filter(|row| row.program() == program)
        .collect();
    if narrowed.is_empty() { rows } else { narrowed }
}

/// Last assignment (or handle, depending on preference) on the path,
/// reduced to a bare identifier.
pub fn terminal_key(path: &LineagePath, prefer_assign: bool) -> (TerminalKind, String) {
    let assign = path.assignments().last();
    let handle = path.handles().last();
    let picked = if prefer_assign {
        assign
            .map(|a| (TerminalKind::Assign, a))
            .or_else(|| handle.map(|h| (TerminalKind::Handle, h)))
    } else {
        handle
            .map(|h| (TerminalKind::Handle, h))
            .or_else(|| assign.map(|a| (TerminalKind::Assign, a)))
    };
    match picked {
        Some((kind, value)) => (kind, sanitize_token(value)),
        None => (TerminalKind::None, String::new()),
    }
}

/// Member named in a `DSN=LIB(MEMBER)` operand, if any.
pub fn embedded_member(raw_text: &str) -> Option<String> {
    SUB_MEMBER_RE
        .captures(&raw_text.to_uppercase())
        .map(|caps| caps[1].to_owned())
}
