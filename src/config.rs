use std::path::{Path, PathBuf};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub scan: ScanConfig,
    pub search: SearchConfig,
    pub producer: ProducerConfig,
}

impl Config {
    /// Reads a TOML config; `None` yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|_| anyhow!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).map_err(|err| {
            anyhow!(
                "Failed to parse TOML config in file {} due to error: {}",
                path.display(),
                err
            )
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub field_source_dir: PathBuf,
    pub copybook_dir: Option<PathBuf>,
    pub proc_dir: PathBuf,
    pub job_dir: PathBuf,
    pub data_step_dir: PathBuf,
    pub field_table: PathBuf,
    pub proc_table: PathBuf,
    pub job_table: PathBuf,
    pub data_step_table: PathBuf,
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            field_source_dir: PathBuf::from("cobol"),
            copybook_dir: Some(PathBuf::from("copybook")),
            proc_dir: PathBuf::from("proc"),
            job_dir: PathBuf::from("jcl"),
            data_step_dir: PathBuf::from("sas"),
            field_table: PathBuf::from("fields.csv"),
            proc_table: PathBuf::from("procs_index.csv"),
            job_table: PathBuf::from("jobs_index.csv"),
            data_step_table: PathBuf::from("data_steps_index.csv"),
            output: PathBuf::from("lineage.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub field_extensions: Vec<String>,
    pub copybook_extensions: Vec<String>,
    pub job_extensions: Vec<String>,
    pub data_step_extensions: Vec<String>,
    /// Scan files on the rayon pool. Output order does not change.
    pub parallel: bool,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            field_extensions: strings(&["cbl", "cob", "txt"]),
            copybook_extensions: strings(&["cpy", "cpb", "cbl", "cob", "txt", "inc", "copy", "cp"]),
            job_extensions: strings(&["jcl", "proc", "prc", "cntl", "cntljcl", "txt"]),
            data_step_extensions: strings(&["sas", "txt", "inc", "src", "pgm", "job"]),
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_depth: usize,
    pub max_paths_per_start: usize,
    /// Resolve a data-flow source outside the referencing scope when exactly
    /// one node anywhere carries that name.
    pub allow_cross_scope_if_unique: bool,
    pub include_only_copybook: bool,
    pub query: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_depth: 2000,
            max_paths_per_start: 50,
            allow_cross_scope_if_unique: false,
            include_only_copybook: true,
            query: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub prefer_assign_over_handle: bool,
    pub preferred_executables: Vec<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            prefer_assign_over_handle: true,
            preferred_executables: strings(&["SAS", "SORT", "ICEMAN", "DFSORT"]),
        }
    }
}

impl ProducerConfig {
    pub fn is_preferred_executable(&self, program: &str) -> bool {
        self.preferred_executables
            .iter()
            .any(|exec| exec.eq_ignore_ascii_case(program))
    }
}
