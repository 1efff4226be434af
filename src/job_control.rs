use std::{path::Path, sync::LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::sources::{collect_files, scan_files};

static EXEC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*//([A-Z0-9$#@][A-Z0-9$#@\-_]*)?\s+EXEC\s+(\S+)")
        .expect("valid exec regex")
});

static DD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*//(?:([A-Z0-9$#@][A-Z0-9$#@\-_]*)\.)?([A-Z0-9$#@][A-Z0-9$#@\-_]*)\s+DD\b\s*(.*)$",
    )
    .expect("valid dd regex")
});

static CONTINUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^//\s+(\S.*)$").expect("valid continuation regex"));

static DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bDATA\s+([A-Z0-9_.]+)[^;]*;").expect("valid data regex")
});

static INFILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bINFILE\s+([A-Z0-9_]+)\b[^;]*;").expect("valid infile regex")
});

static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bFILE\s+([A-Z0-9_]+)\b[^;]*;").expect("valid file regex")
});

static MERGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bMERGE\s+([^;]+);").expect("valid merge regex"));

static SET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSET\s+([^;]+);").expect("valid set regex"));

static DATASET_OPTIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid dataset options regex"));

/// One DD statement, together with the step it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobControlRecord {
    pub file: String,
    pub line: usize,
    pub step: String,
    pub executable: String,
    pub handle: String,
    pub dataset: String,
    pub disposition: String,
    pub record_format: String,
    pub record_length: String,
    pub block_size: String,
    pub raw_text: String,
}

impl JobControlRecord {
    /// Program run by the step: the `PGM=` operand of the EXEC statement, else its
    /// leading procedure name.
    pub fn program(&self) -> String {
        let operands = parse_operands(&self.executable);
        if let Some(program) = operands.get("PGM").or_else(|| operands.get("PROC")) {
            return program.to_uppercase();
        }
        self.executable
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_uppercase()
    }

    /// Dataset name without member/generation, reduced to its last two qualifiers.
    pub fn dataset_tail(&self) -> String {
        dataset_tail(&self.dataset)
    }

    pub fn same_dataset(&self, other: &JobControlRecord) -> bool {
        let (a, b) = (self.dataset.to_uppercase(), other.dataset.to_uppercase());
        if !a.is_empty() && a == b {
            return true;
        }
        let (ta, tb) = (self.dataset_tail(), other.dataset_tail());
        !ta.is_empty() && ta == tb
    }

    pub fn same_step(&self, other: &JobControlRecord) -> bool {
        self.file == other.file && self.step == other.step
    }

    fn apply_operands(&mut self, operand_text: &str) {
        let operands = parse_operands(operand_text);
        let get = |key: &str| operands.get(key).cloned().unwrap_or_default();
        self.dataset = operands
            .get("DSN")
            .or_else(|| operands.get("DSNAME"))
            .cloned()
            .unwrap_or_default();
        self.disposition = get("DISP");

        let dcb = operands
            .get("DCB")
            .map(|dcb| parse_operands(strip_parens(dcb)))
            .unwrap_or_default();
        let record_attr = |key: &str| dcb.get(key).cloned().unwrap_or_else(|| get(key));
        self.record_format = record_attr("RECFM");
        self.record_length = record_attr("LRECL");
        self.block_size = record_attr("BLKSIZE");
    }
}

pub fn dataset_tail(dataset: &str) -> String {
    let base = dataset.split('(').next().unwrap_or_default().trim();
    let qualifiers: Vec<&str> = base.split('.').filter(|q| !q.is_empty()).collect();
    let start = qualifiers.len().saturating_sub(2);
    qualifiers[start..].join(".").to_uppercase()
}

fn strip_parens(value: &str) -> &str {
    value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(value)
}

/// Splits a JCL operand field into `KEY=VALUE` pairs. Commas inside
/// parentheses or quotes do not split; the field ends at the first blank
/// outside them, where JCL comments begin. Positional operands are ignored.
pub fn parse_operands(text: &str) -> IndexMap<String, String> {
    let mut operands = IndexMap::new();
    let mut parts = vec![];
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for c in text.trim().chars() {
        match c {
            '\'' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if !in_quotes && depth == 0 => parts.push(std::mem::take(&mut current)),
            c if c.is_whitespace() && !in_quotes && depth == 0 => break,
            _ => current.push(c),
        }
    }
    parts.push(current);

    for part in parts {
        if let Some((key, value)) = part.split_once('=') {
            let key = key.trim().to_uppercase();
            if !key.is_empty() {
                operands.entry(key).or_insert_with(|| value.trim().to_owned());
            }
        }
    }
    operands
}

#[derive(Debug, PartialEq, Eq)]
enum JobLine<'a> {
    Comment,
    Exec {
        step: &'a str,
        call: &'a str,
    },
    Dd {
        step_override: Option<&'a str>,
        handle: &'a str,
        operands: &'a str,
    },
    Continuation(&'a str),
    Other,
}

fn classify_job_line(line: &str) -> JobLine<'_> {
    if line.trim_start().starts_with("//*") {
        return JobLine::Comment;
    }
    if let Some(caps) = EXEC_RE.captures(line) {
        return JobLine::Exec {
            step: caps.get(1).map_or("", |m| m.as_str()),
            call: caps.get(2).map_or("", |m| m.as_str()),
        };
    }
    if let Some(caps) = DD_RE.captures(line) {
        return JobLine::Dd {
            step_override: caps.get(1).map(|m| m.as_str()),
            handle: caps.get(2).map_or("", |m| m.as_str()),
            operands: caps.get(3).map_or("", |m| m.as_str()),
        };
    }
    if let Some(caps) = CONTINUATION_RE.captures(line) {
        return JobLine::Continuation(caps.get(1).map_or("", |m| m.as_str()));
    }
    JobLine::Other
}

/// Drops the sequence-number field (columns 73-80) of a fixed-format statement.
fn statement_area(line: &str) -> &str {
    match line.char_indices().nth(72) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}

/// Scans one job-control or procedure-library member.
pub fn scan_job_source(file: &str, text: &str) -> Vec<JobControlRecord> {
    let mut records: Vec<JobControlRecord> = vec![];
    let mut step = String::new();
    let mut executable = String::new();
    let mut open_dd = false;

    for (idx, raw) in text.lines().enumerate() {
        match classify_job_line(statement_area(raw).trim_end()) {
            JobLine::Comment => continue,
            JobLine::Exec { step: s, call } => {
                step = s.to_uppercase();
                executable = call.to_uppercase();
                open_dd = false;
            }
            JobLine::Dd {
                step_override,
                handle,
                operands,
            } => {
                let mut record = JobControlRecord {
                    file: file.to_owned(),
                    line: idx + 1,
                    step: step_override.map_or_else(|| step.clone(), str::to_uppercase),
                    executable: executable.clone(),
                    handle: handle.to_uppercase(),
                    raw_text: operands.trim().to_owned(),
                    ..Default::default()
                };
                record.apply_operands(operands);
                open_dd = record.raw_text.ends_with(',');
                records.push(record);
            }
            JobLine::Continuation(operands) if open_dd => {
                if let Some(record) = records.last_mut() {
                    record.raw_text.push_str(operands.trim());
                    let operand_text = record.raw_text.clone();
                    record.apply_operands(&operand_text);
                    open_dd = record.raw_text.ends_with(',');
                }
            }
            JobLine::Continuation(_) | JobLine::Other => open_dd = false,
        }
    }
    records
}

pub fn index_job_control(
    dir: &Path,
    extensions: &[String],
    parallel: bool,
) -> Vec<JobControlRecord> {
    let files = collect_files(dir, extensions);
    let records = scan_files(&files, parallel, |path, text| {
        scan_job_source(&path.display().to_string(), text)
    });
    log::info!(
        "Indexed {} job-control rows from {} files in {}",
        records.len(),
        files.len(),
        dir.display()
    );
    records
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataStepConstruct {
    Infile,
    File,
    Set,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataStepRecord {
    pub file: String,
    pub line: usize,
    pub data_step: String,
    pub construct_kind: DataStepConstruct,
    pub handle_or_dataset: String,
    pub raw_text: String,
}

#[derive(Debug, PartialEq, Eq)]
enum DataStepStatement {
    Boundary(String),
    Input(String),
    Output(String),
    Set(Vec<String>),
    Merge(Vec<String>),
}

fn operand_list(text: &str) -> Vec<String> {
    DATASET_OPTIONS_RE
        .replace_all(text, " ")
        .split_whitespace()
        .map(|op| op.trim_end_matches(';').to_uppercase())
        .filter(|op| !op.is_empty())
        .collect()
}

fn recognize_data_step_line(line: &str) -> Vec<DataStepStatement> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('*') || trimmed.starts_with("/*") {
        return vec![];
    }
    let mut statements = vec![];
    if let Some(caps) = DATA_RE.captures(line) {
        statements.push(DataStepStatement::Boundary(caps[1].to_uppercase()));
    }
    if let Some(caps) = INFILE_RE.captures(line) {
        statements.push(DataStepStatement::Input(caps[1].to_uppercase()));
    }
    if let Some(caps) = FILE_RE.captures(line) {
        statements.push(DataStepStatement::Output(caps[1].to_uppercase()));
    }
    if let Some(caps) = MERGE_RE.captures(line) {
        let operands = operand_list(&caps[1])
            .into_iter()
            .filter(|op| op != "BY")
            .collect();
        statements.push(DataStepStatement::Merge(operands));
    }
    if let Some(caps) = SET_RE.captures(line) {
        statements.push(DataStepStatement::Set(operand_list(&caps[1])));
    }
    statements
}

/// Scans one data-step program.
pub fn scan_data_step_source(file: &str, text: &str) -> Vec<DataStepRecord> {
    let mut records = vec![];
    let mut data_step = String::new();

    for (idx, raw) in text.lines().enumerate() {
        for statement in recognize_data_step_line(raw) {
            let (kind, operands) = match statement {
                DataStepStatement::Boundary(name) => {
                    data_step = name;
                    continue;
                }
                DataStepStatement::Input(handle) => (DataStepConstruct::Infile, vec![handle]),
                DataStepStatement::Output(handle) => (DataStepConstruct::File, vec![handle]),
                DataStepStatement::Set(operands) => (DataStepConstruct::Set, operands),
                DataStepStatement::Merge(operands) => (DataStepConstruct::Merge, operands),
            };
            records.extend(operands.into_iter().map(|operand| DataStepRecord {
                file: file.to_owned(),
                line: idx + 1,
                data_step: data_step.clone(),
                construct_kind: kind,
                handle_or_dataset: operand,
                raw_text: raw.trim().to_owned(),
            }));
        }
    }
    records
}

pub fn index_data_steps(dir: &Path, extensions: &[String], parallel: bool) -> Vec<DataStepRecord> {
    let files = collect_files(dir, extensions);
    let records = scan_files(&files, parallel, |path, text| {
        scan_data_step_source(&path.display().to_string(), text)
    });
    log::info!(
        "Indexed {} data-step rows from {} files in {}",
        records.len(),
        files.len(),
        dir.display()
    );
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_job_lines() {
        assert_eq!(classify_job_line("//* comment"), JobLine::Comment);
        assert_eq!(
            classify_job_line("//STEP1 EXEC PGM=IEBGENER"),
            JobLine::Exec {
                step: "STEP1",
                call: "PGM=IEBGENER"
            }
        );
        assert_eq!(
            classify_job_line("//STEP1.SYSUT1 DD DSN=A.B,DISP=SHR"),
            JobLine::Dd {
                step_override: Some("STEP1"),
                handle: "SYSUT1",
                operands: "DSN=A.B,DISP=SHR"
            }
        );
        assert_eq!(
            classify_job_line("//         UNIT=SYSDA"),
            JobLine::Continuation("UNIT=SYSDA")
        );
        assert_eq!(classify_job_line("/*"), JobLine::Other);
    }
}
