use std::path::Path;

use copytrace::{
    config::Config,
    job_control::{DataStepRecord, JobControlRecord, index_data_steps, index_job_control},
    lineage::{
        extract_lineage,
        producer::{EnrichedRow, JobIndex, TerminalKind},
    },
    scanner::{FieldRow, copybook_field_names, scan_fields},
    table::{read_table, write_table},
};

const ACCTUPD: &str = "\
       IDENTIFICATION DIVISION.
       PROGRAM-ID. ACCTUPD.
       ENVIRONMENT DIVISION.
       INPUT-OUTPUT SECTION.
       FILE-CONTROL.
           SELECT ACCTFILE ASSIGN TO ACCTDD
               ORGANIZATION IS SEQUENTIAL.
       DATA DIVISION.
       FILE SECTION.
       FD  ACCTFILE.
       01  ACCT-REC.
           05  ACCOUNT-NO      PIC X(10).
           05  ACCT-BAL        PIC 9(7)V99.
       WORKING-STORAGE SECTION.
       01  WS-TOTALS.
           05  WS-BAL          PIC 9(9)V99.
       PROCEDURE DIVISION.
           READ ACCTFILE INTO WS-TOTALS.
           MOVE ACCT-BAL TO WS-BAL.
           STOP RUN.
";

const ACCTREC: &str = "\
      * ACCOUNT MASTER LAYOUT
       01  ACCT-REC.
           05  ACCOUNT-NO      PIC X(10).
           05  ACCT-BAL        PIC 9(7)V99.
           88  ACCT-EMPTY      VALUE ZERO.
           05  FILLER          PIC X(5).
";

const NIGHTLY: &str = "\
//NIGHTLY  JOB (ACCT),'NIGHTLY RUN'
//STEP010  EXEC PGM=SORT
//SORTIN   DD DSN=PROD.ACCT.RAW,DISP=SHR
//SORTOUT  DD DSN=PROD.ACCT.DAILY,DISP=(NEW,CATLG),
//            DCB=(RECFM=FB,LRECL=80,BLKSIZE=8000)
//SYSOUT   DD SYSOUT=*
//SYSIN    DD DSN=PROD.CTL.LIB(SORTACCT),DISP=SHR
//STEP020  EXEC PGM=ACCTUPD
//ACCTDD   DD DSN=PROD.ACCT.DAILY,DISP=SHR
";

const ACCTRPT: &str = "\
data work.accts;
  infile ACCTDD;
run;
";

fn write_sources(root: &Path) {
    for (dir, file, text) in [
        ("cobol", "ACCTUPD.cbl", ACCTUPD),
        ("copybook", "ACCTREC.cpy", ACCTREC),
        ("jcl", "NIGHTLY.jcl", NIGHTLY),
        ("sas", "ACCTRPT.sas", ACCTRPT),
    ] {
        std::fs::create_dir_all(root.join(dir)).unwrap();
        std::fs::write(root.join(dir).join(file), text).unwrap();
    }
}

fn config_for(root: &Path) -> Config {
    let mut config = Config::default();
    let paths = &mut config.paths;
    paths.field_source_dir = root.join("cobol");
    paths.copybook_dir = Some(root.join("copybook"));
    paths.proc_dir = root.join("proc");
    paths.job_dir = root.join("jcl");
    paths.data_step_dir = root.join("sas");
    paths.field_table = root.join("out/fields.csv");
    paths.proc_table = root.join("out/procs_index.csv");
    paths.job_table = root.join("out/jobs_index.csv");
    paths.data_step_table = root.join("out/data_steps_index.csv");
    paths.output = root.join("out/lineage.csv");
    config
}

fn run_pipeline(config: &Config) -> anyhow::Result<Vec<EnrichedRow>> {
    let (paths, scan) = (&config.paths, &config.scan);
    write_table(
        &paths.proc_table,
        &index_job_control(&paths.proc_dir, &scan.job_extensions, scan.parallel),
    )?;
    write_table(
        &paths.job_table,
        &index_job_control(&paths.job_dir, &scan.job_extensions, scan.parallel),
    )?;
    write_table(
        &paths.data_step_table,
        &index_data_steps(&paths.data_step_dir, &scan.data_step_extensions, scan.parallel),
    )?;
    write_table(
        &paths.field_table,
        &scan_fields(&paths.field_source_dir, &scan.field_extensions, scan.parallel),
    )?;

    let fields: Vec<FieldRow> = read_table(&paths.field_table)?;
    let proc_rows: Vec<JobControlRecord> = read_table(&paths.proc_table)?;
    let job_rows: Vec<JobControlRecord> = read_table(&paths.job_table)?;
    let data_step_rows: Vec<DataStepRecord> = read_table(&paths.data_step_table)?;
    let jobs = JobIndex::new(proc_rows, job_rows, data_step_rows);
    let allow_list = paths
        .copybook_dir
        .as_ref()
        .map(|dir| copybook_field_names(dir, &scan.copybook_extensions));

    let rows = extract_lineage(
        &fields,
        &jobs,
        allow_list.as_ref(),
        &config.search,
        &config.producer,
    );
    write_table(&paths.output, &rows)?;
    Ok(rows)
}

#[test]
fn test_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let config = config_for(dir.path());

    let rows = run_pipeline(&config).unwrap();
    let starts: Vec<&str> = rows.iter().map(|r| r.start_field.as_str()).collect();
    assert_eq!(starts.len(), 10);
    assert!(
        starts
            .iter()
            .all(|s| ["ACCOUNT-NO", "ACCT-BAL", "ACCT-REC"].contains(s))
    );
    assert_eq!(starts[0], "ACCOUNT-NO");
    assert_eq!(starts[9], "ACCT-REC");

    let first = &rows[0];
    assert_eq!(first.rendered_path, "ACCOUNT-NO <- ASSIGN:ACCTDD");
    assert_eq!(first.terminal_kind, TerminalKind::Assign);
    assert_eq!(first.terminal_key, "ACCTDD");
    assert!(
        first
            .matching_job_rows
            .ends_with("|STEP020|PGM=ACCTUPD|ACCTUPD|ACCTDD|PROD.ACCT.DAILY")
    );
    assert!(first.matching_data_step_rows.ends_with("|WORK.ACCTS|INFILE|ACCTDD"));
    assert!(first.producer_file.ends_with("NIGHTLY.jcl"));
    assert_eq!(first.producer_step, "STEP010");
    assert_eq!(first.producer_executable, "PGM=SORT");
    assert_eq!(first.producer_inputs, vec!["SORTIN=PROD.ACCT.RAW".to_owned()]);
    assert_eq!(first.sub_member, "SORTACCT");
    assert!(first.hint_origin_file.ends_with("ACCTUPD.cbl"));

    let handle_only = rows
        .iter()
        .find(|r| r.rendered_path == "ACCOUNT-NO <- ACCT-REC <- HANDLE:ACCTFILE")
        .expect("handle-terminated path");
    assert_eq!(handle_only.terminal_kind, TerminalKind::Handle);
    assert_eq!(handle_only.terminal_key, "ACCTFILE");
    assert_eq!(handle_only.matching_job_rows, "");
    assert_eq!(handle_only.producer_step, "");

    let reloaded: Vec<EnrichedRow> = read_table(&config.paths.output).unwrap();
    assert_eq!(reloaded, rows);
}

#[test]
fn test_rerun_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let mut config = config_for(dir.path());

    run_pipeline(&config).unwrap();
    let first = std::fs::read_to_string(&config.paths.output).unwrap();

    config.scan.parallel = true;
    run_pipeline(&config).unwrap();
    let second = std::fs::read_to_string(&config.paths.output).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_query_and_allow_list() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let mut config = config_for(dir.path());

    config.search.query = Some("account-no".to_owned());
    let rows = run_pipeline(&config).unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.start_field == "ACCOUNT-NO"));

    config.search.query = None;
    config.search.include_only_copybook = false;
    let rows = run_pipeline(&config).unwrap();
    assert!(rows.iter().any(|r| r.start_field == "WS-BAL"));
}

#[test]
fn test_missing_inputs_yield_empty_lineage() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());

    let rows = run_pipeline(&config).unwrap();
    assert!(rows.is_empty());
    assert!(config.paths.output.is_file());
}

#[test]
fn test_unresolved_terminal() {
    let rows = vec![FieldRow {
        name: "WS-FLAG".to_owned(),
        origin_file: "FLAGS.cbl".to_owned(),
        ..Default::default()
    }];
    let config = Config::default();
    let lineage = extract_lineage(
        &rows,
        &JobIndex::default(),
        None,
        &config.search,
        &config.producer,
    );
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].terminal_kind, TerminalKind::None);
    assert_eq!(lineage[0].terminal_key, "");
    assert_eq!(lineage[0].rendered_path, "WS-FLAG");
    assert_eq!(lineage[0].hint_origin_file, "FLAGS.cbl");
}
