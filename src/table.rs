//! Delimited-text tables exchanged between the pipeline stages.
//!
//! Headers are normalized once per file: casing, surrounding blanks, a
//! leading BOM, `[]` suffixes and `-`/space separators are ignored, and the
//! column names written by older tooling are accepted as aliases.

use std::{
    collections::HashMap,
    io::{Read, Write},
    path::Path,
    str::FromStr,
};

use anyhow::{Context, anyhow};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::{
    ident::{join_list, normalize, sanitize_token, split_list},
    job_control::{DataStepConstruct, DataStepRecord, JobControlRecord},
    lineage::producer::{EnrichedRow, TerminalKind},
    scanner::FieldRow,
};

pub trait TableRecord: Sized {
    const COLUMNS: &'static [&'static str];
    const ALIASES: &'static [(&'static str, &'static str)] = &[];

    fn to_fields(&self) -> Vec<String>;

    /// `None` skips the row.
    fn from_fields(row: &RowView<'_>) -> Option<Self>;
}

fn canonical_header(header: &str) -> String {
    header
        .trim_matches('\u{feff}')
        .trim()
        .trim_end_matches("[]")
        .to_lowercase()
        .replace([' ', '-'], "_")
}

/// Canonical column name -> position in the file.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    indices: HashMap<&'static str, usize>,
}

impl ColumnMap {
    pub fn resolve<T: TableRecord>(headers: &StringRecord) -> Self {
        let positions: Vec<String> = headers.iter().map(canonical_header).collect();
        let position_of = |name: &str| positions.iter().position(|h| h == name);

        let mut indices = HashMap::new();
        for &column in T::COLUMNS {
            let found = position_of(column).or_else(|| {
                T::ALIASES
                    .iter()
                    .filter(|&&(_, canonical)| canonical == column)
                    .find_map(|&(alias, _)| position_of(alias))
            });
            if let Some(idx) = found {
                indices.insert(column, idx);
            }
        }
        Self { indices }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.indices.contains_key(column)
    }
}

pub struct RowView<'a> {
    columns: &'a ColumnMap,
    record: &'a StringRecord,
}

impl RowView<'_> {
    pub fn get(&self, column: &str) -> &str {
        self.columns
            .indices
            .get(column)
            .and_then(|idx| self.record.get(*idx))
            .map(str::trim)
            .unwrap_or_default()
    }

    pub fn optional(&self, column: &str) -> Option<String> {
        let value = self.get(column);
        (!value.is_empty()).then(|| value.to_owned())
    }

    pub fn number(&self, column: &str) -> Option<usize> {
        self.get(column).parse().ok()
    }

    /// Semicolon-joined identifiers, each sanitized.
    pub fn identifiers(&self, column: &str) -> Vec<String> {
        split_list(self.get(column))
            .iter()
            .map(|item| sanitize_token(item))
            .filter(|item| !item.is_empty())
            .collect()
    }
}

pub fn write_table_to<T: TableRecord, W: Write>(writer: W, rows: &[T]) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(T::COLUMNS)?;
    for row in rows {
        writer.write_record(row.to_fields())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_table<T: TableRecord>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file = std::fs::File::create(path).map_err(|err| {
        anyhow!("Failed to create table {} due to error: {}", path.display(), err)
    })?;
    write_table_to(file, rows)
        .with_context(|| format!("Failed to write table {}", path.display()))?;
    log::info!("Wrote {} ({} rows)", path.display(), rows.len());
    Ok(())
}

pub fn read_table_from<T: TableRecord, R: Read>(reader: R) -> anyhow::Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let columns = ColumnMap::resolve::<T>(reader.headers()?);
    for column in T::COLUMNS.iter().filter(|c| !columns.contains(c)) {
        log::debug!("Column `{}` not present, values default to empty", column);
    }
    let mut rows = vec![];
    for record in reader.records() {
        let record = record?;
        let view = RowView {
            columns: &columns,
            record: &record,
        };
        if let Some(row) = T::from_fields(&view) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Reads a table; a missing file yields no rows.
pub fn read_table<T: TableRecord>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.is_file() {
        log::warn!("Table {} not found, continuing without it", path.display());
        return Ok(vec![]);
    }
    let file = std::fs::File::open(path).map_err(|err| {
        anyhow!("Failed to open table {} due to error: {}", path.display(), err)
    })?;
    let rows = read_table_from(file)
        .with_context(|| format!("Failed to read table {}", path.display()))?;
    log::debug!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn opt_number(value: Option<usize>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl TableRecord for FieldRow {
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "origin_file",
        "declared_at",
        "parent_field",
        "handles",
        "assignments",
        "data_flow_sources",
        "summary_trace",
    ];
    const ALIASES: &'static [(&'static str, &'static str)] = &[
        ("variable", "name"),
        ("defined_at", "declared_at"),
        ("parent_record", "parent_field"),
        ("from_dd", "handles"),
        ("assign_target", "assignments"),
        ("direct_sources", "data_flow_sources"),
        ("source_fields", "data_flow_sources"),
        ("trace_to_input", "summary_trace"),
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.origin_file.clone(),
            opt_number(self.declared_at),
            self.parent_field.clone().unwrap_or_default(),
            join_list(&self.handles),
            join_list(&self.assignments),
            join_list(&self.data_flow_sources),
            self.summary_trace.clone(),
        ]
    }

    fn from_fields(row: &RowView<'_>) -> Option<Self> {
        let name = normalize(row.get("name"));
        if name.is_empty() {
            return None;
        }
        Some(FieldRow {
            name,
            origin_file: row.get("origin_file").to_owned(),
            declared_at: row.number("declared_at").filter(|line| *line > 0),
            parent_field: row.optional("parent_field").map(|p| normalize(&p)),
            handles: row.identifiers("handles").into_iter().collect(),
            assignments: row.identifiers("assignments").into_iter().collect(),
            data_flow_sources: row.identifiers("data_flow_sources").into_iter().collect(),
            summary_trace: row.get("summary_trace").to_owned(),
        })
    }
}

impl TableRecord for JobControlRecord {
    const COLUMNS: &'static [&'static str] = &[
        "file",
        "line",
        "step",
        "executable",
        "handle",
        "dataset",
        "disposition",
        "record_format",
        "record_length",
        "block_size",
        "raw_text",
    ];
    const ALIASES: &'static [(&'static str, &'static str)] = &[
        ("exec", "executable"),
        ("ddname", "handle"),
        ("dsn", "dataset"),
        ("disp", "disposition"),
        ("recfm", "record_format"),
        ("lrecl", "record_length"),
        ("blksize", "block_size"),
        ("raw", "raw_text"),
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.file.clone(),
            self.line.to_string(),
            self.step.clone(),
            self.executable.clone(),
            self.handle.clone(),
            self.dataset.clone(),
            self.disposition.clone(),
            self.record_format.clone(),
            self.record_length.clone(),
            self.block_size.clone(),
            self.raw_text.clone(),
        ]
    }

    fn from_fields(row: &RowView<'_>) -> Option<Self> {
        Some(JobControlRecord {
            file: row.get("file").to_owned(),
            line: row.number("line").unwrap_or_default(),
            step: row.get("step").to_uppercase(),
            executable: row.get("executable").to_uppercase(),
            handle: row.get("handle").to_uppercase(),
            dataset: row.get("dataset").to_owned(),
            disposition: row.get("disposition").to_owned(),
            record_format: row.get("record_format").to_owned(),
            record_length: row.get("record_length").to_owned(),
            block_size: row.get("block_size").to_owned(),
            raw_text: row.get("raw_text").to_owned(),
        })
    }
}

impl TableRecord for DataStepRecord {
    const COLUMNS: &'static [&'static str] = &[
        "file",
        "line",
        "data_step",
        "construct_kind",
        "handle_or_dataset",
        "raw_text",
    ];
    const ALIASES: &'static [(&'static str, &'static str)] = &[
        ("kind", "construct_kind"),
        ("handle_or_ds", "handle_or_dataset"),
        ("raw", "raw_text"),
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.file.clone(),
            self.line.to_string(),
            self.data_step.clone(),
            self.construct_kind.to_string(),
            self.handle_or_dataset.clone(),
            self.raw_text.clone(),
        ]
    }

    fn from_fields(row: &RowView<'_>) -> Option<Self> {
        let construct_kind = DataStepConstruct::from_str(row.get("construct_kind")).ok()?;
        Some(DataStepRecord {
            file: row.get("file").to_owned(),
            line: row.number("line").unwrap_or_default(),
            data_step: row.get("data_step").to_uppercase(),
            construct_kind,
            handle_or_dataset: row.get("handle_or_dataset").to_uppercase(),
            raw_text: row.get("raw_text").to_owned(),
        })
    }
}

impl TableRecord for EnrichedRow {
    const COLUMNS: &'static [&'static str] = &[
        "start_field",
        "terminal_kind",
        "terminal_key",
        "matching_job_rows",
        "matching_data_step_rows",
        "producer_file",
        "producer_step",
        "producer_executable",
        "producer_inputs",
        "sub_member",
        "rendered_path",
        "hint_origin_file",
    ];
    const ALIASES: &'static [(&'static str, &'static str)] = &[
        ("copybook_variable", "start_field"),
        ("final_key_type", "terminal_kind"),
        ("final_key", "terminal_key"),
        ("jcl_rows", "matching_job_rows"),
        ("sas_rows", "matching_data_step_rows"),
        ("producer_exec", "producer_executable"),
        ("input_files", "producer_inputs"),
        ("sas_member", "sub_member"),
        ("trace_path", "rendered_path"),
        ("cobol_file_hint", "hint_origin_file"),
    ];

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.start_field.clone(),
            self.terminal_kind.to_string(),
            self.terminal_key.clone(),
            self.matching_job_rows.clone(),
            self.matching_data_step_rows.clone(),
            self.producer_file.clone(),
            self.producer_step.clone(),
            self.producer_executable.clone(),
            join_list(&self.producer_inputs),
            self.sub_member.clone(),
            self.rendered_path.clone(),
            self.hint_origin_file.clone(),
        ]
    }

    fn from_fields(row: &RowView<'_>) -> Option<Self> {
        Some(EnrichedRow {
            start_field: row.get("start_field").to_owned(),
            terminal_kind: TerminalKind::from_str(row.get("terminal_kind"))
                .unwrap_or(TerminalKind::None),
            terminal_key: row.get("terminal_key").to_owned(),
            matching_job_rows: row.get("matching_job_rows").to_owned(),
            matching_data_step_rows: row.get("matching_data_step_rows").to_owned(),
            producer_file: row.get("producer_file").to_owned(),
            producer_step: row.get("producer_step").to_owned(),
            producer_executable: row.get("producer_executable").to_owned(),
            producer_inputs: split_list(row.get("producer_inputs")),
            sub_member: row.get("sub_member").to_owned(),
            rendered_path: row.get("rendered_path").to_owned(),
            hint_origin_file: row.get("hint_origin_file").to_owned(),
        })
    }
}
