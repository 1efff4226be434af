use std::path::PathBuf;
use std::time::Instant;

use anyhow::anyhow;
use clap::Parser as ClapParser;
use clap::Subcommand;
use copytrace::{
    config::Config,
    job_control::{DataStepRecord, JobControlRecord, index_data_steps, index_job_control},
    lineage::{
        extract_lineage,
        producer::{EnrichedRow, JobIndex},
    },
    scanner::{FieldRow, copybook_field_names, scan_fields},
    table::{read_table, write_table},
};

#[derive(clap::Parser)]
#[command(name = "copytrace")]
#[command(about = "Field-level lineage for COBOL/JCL batch codebases", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index procedure-library, job and data-step sources into tables.
    IndexJobs,
    /// Scan field declarations and procedure code into the field table.
    ScanFields,
    /// Trace lineage from the indexed tables.
    Trace(TraceCommand),
    /// Index, scan and trace in one go.
    Run(TraceCommand),
}

#[derive(clap::Args)]
struct TraceCommand {
    /// Trace only this field.
    #[arg(short, long)]
    query: Option<String>,
    /// Maximum lineage path length before a path is cut.
    #[arg(long)]
    max_depth: Option<usize>,
    /// Maximum number of paths per start field.
    #[arg(long)]
    max_paths: Option<usize>,
    /// Also print the enriched rows as JSON.
    #[arg(long)]
    json: bool,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

impl TraceCommand {
    fn apply(&self, config: &mut Config) {
        if let Some(query) = &self.query {
            config.search.query = Some(query.clone());
        }
        if let Some(max_depth) = self.max_depth {
            config.search.max_depth = max_depth;
        }
        if let Some(max_paths) = self.max_paths {
            config.search.max_paths_per_start = max_paths;
        }
    }
}

fn index_jobs(config: &Config) -> anyhow::Result<()> {
    let (paths, scan) = (&config.paths, &config.scan);
    let proc_rows = index_job_control(&paths.proc_dir, &scan.job_extensions, scan.parallel);
    let job_rows = index_job_control(&paths.job_dir, &scan.job_extensions, scan.parallel);
    let data_step_rows =
        index_data_steps(&paths.data_step_dir, &scan.data_step_extensions, scan.parallel);

    write_table(&paths.proc_table, &proc_rows)?;
    write_table(&paths.job_table, &job_rows)?;
    write_table(&paths.data_step_table, &data_step_rows)?;
    log::info!(
        "Indexed {} proc, {} job and {} data-step rows",
        proc_rows.len(),
        job_rows.len(),
        data_step_rows.len()
    );
    Ok(())
}

fn scan_field_table(config: &Config) -> anyhow::Result<()> {
    let (paths, scan) = (&config.paths, &config.scan);
    let fields = scan_fields(&paths.field_source_dir, &scan.field_extensions, scan.parallel);
    write_table(&paths.field_table, &fields)
}

fn trace(config: &Config, command: &TraceCommand) -> anyhow::Result<()> {
    let paths = &config.paths;
    let fields: Vec<FieldRow> = read_table(&paths.field_table)?;
    if fields.is_empty() {
        log::warn!(
            "No field rows in {}, lineage will be empty",
            paths.field_table.display()
        );
    }
    let proc_rows: Vec<JobControlRecord> = read_table(&paths.proc_table)?;
    let job_rows: Vec<JobControlRecord> = read_table(&paths.job_table)?;
    let data_step_rows: Vec<DataStepRecord> = read_table(&paths.data_step_table)?;
    let jobs = JobIndex::new(proc_rows, job_rows, data_step_rows);

    let allow_list = paths
        .copybook_dir
        .as_ref()
        .filter(|_| config.search.include_only_copybook)
        .map(|dir| copybook_field_names(dir, &config.scan.copybook_extensions));

    let rows: Vec<EnrichedRow> = extract_lineage(
        &fields,
        &jobs,
        allow_list.as_ref(),
        &config.search,
        &config.producer,
    );
    write_table(&paths.output, &rows).map_err(|err| {
        anyhow!(
            "Failed to write lineage to {} due to error: {}",
            paths.output.display(),
            err
        )
    })?;
    log::info!("Wrote {} lineage rows to {}", rows.len(), paths.output.display());

    if command.json || command.pretty {
        let out_str = if command.pretty {
            serde_json::to_string_pretty(&rows)?
        } else {
            serde_json::to_string(&rows)?
        };
        println!("{}", out_str);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::IndexJobs => index_jobs(&config)?,
        Commands::ScanFields => scan_field_table(&config)?,
        Commands::Trace(trace_command) => {
            trace_command.apply(&mut config);
            trace(&config, trace_command)?;
        }
        Commands::Run(trace_command) => {
            trace_command.apply(&mut config);
            index_jobs(&config)?;
            scan_field_table(&config)?;
            trace(&config, trace_command)?;
        }
    }

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}
