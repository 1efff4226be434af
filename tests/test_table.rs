use copytrace::{
    job_control::{DataStepConstruct, DataStepRecord, JobControlRecord},
    scanner::FieldRow,
    table::{read_table, read_table_from, write_table_to},
};

#[test]
fn test_legacy_field_columns() {
    let csv = "\u{feff}Variable,Origin_File,Parent_Record,From_DD,Assign_Target,Direct_Sources\n\
               acct-rec,ACCTUPD.cbl,,ACCTFILE,,\n\
               account-no,ACCTUPD.cbl,acct-rec,ACCTFILE,'ACCTDD' file status,\n\
               ws-bal,ACCTUPD.cbl,ws-totals,,,acct-bal;ws-adj\n\
               ,ACCTUPD.cbl,,,,\n";
    let rows: Vec<FieldRow> = read_table_from(csv.as_bytes()).unwrap();
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0].name, "ACCT-REC");
    assert_eq!(rows[0].parent_field, None);
    assert_eq!(rows[0].declared_at, None);

    assert_eq!(rows[1].parent_field.as_deref(), Some("ACCT-REC"));
    assert_eq!(
        rows[1].assignments.iter().collect::<Vec<_>>(),
        vec!["ACCTDD"]
    );
    assert_eq!(
        rows[2].data_flow_sources.iter().collect::<Vec<_>>(),
        vec!["ACCT-BAL", "WS-ADJ"]
    );
}

#[test]
fn test_legacy_job_columns() {
    let csv = "file,line,step,exec,exec_pgm,ddname,dsn,dsn_tail,disp,recfm,lrecl,blksize,raw\n\
               NIGHTLY.jcl,4,step010,pgm=sort,SORT,sortin,PROD.ACCT.RAW,ACCT.RAW,SHR,FB,80,8000,\"DSN=PROD.ACCT.RAW,DISP=SHR\"\n";
    let rows: Vec<JobControlRecord> = read_table_from(csv.as_bytes()).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.line, 4);
    assert_eq!(row.step, "STEP010");
    assert_eq!(row.program(), "SORT");
    assert_eq!(row.handle, "SORTIN");
    assert_eq!(row.dataset, "PROD.ACCT.RAW");
    assert_eq!(row.block_size, "8000");
    assert_eq!(row.raw_text, "DSN=PROD.ACCT.RAW,DISP=SHR");
}

#[test]
fn test_data_step_kinds() {
    let csv = "file,line,data_step,kind,handle_or_ds,raw\n\
               r.sas,2,WORK.A,infile,payin,infile payin;\n\
               r.sas,3,WORK.A,proc,x,proc print;\n\
               r.sas,4,WORK.A,Merge,work.b,merge work.b work.c;\n";
    let rows: Vec<DataStepRecord> = read_table_from(csv.as_bytes()).unwrap();
    let kinds: Vec<(DataStepConstruct, &str)> = rows
        .iter()
        .map(|r| (r.construct_kind, r.handle_or_dataset.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (DataStepConstruct::Infile, "PAYIN"),
            (DataStepConstruct::Merge, "WORK.B"),
        ]
    );
}

#[test]
fn test_written_header_is_canonical() {
    let row = FieldRow {
        name: "WS-BAL".to_owned(),
        origin_file: "ACCTUPD.cbl".to_owned(),
        declared_at: Some(16),
        parent_field: Some("WS-TOTALS".to_owned()),
        handles: ["ACCTFILE".to_owned()].into(),
        ..Default::default()
    };
    let mut out = vec![];
    write_table_to(&mut out, &[row.clone()]).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with(
        "name,origin_file,declared_at,parent_field,handles,assignments,data_flow_sources,summary_trace\n"
    ));

    let reread: Vec<FieldRow> = read_table_from(text.as_bytes()).unwrap();
    assert_eq!(reread, vec![row]);
}

#[test]
fn test_missing_table_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<FieldRow> = read_table(&dir.path().join("absent.csv")).unwrap();
    assert!(rows.is_empty());
}
