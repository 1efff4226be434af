//! # copytrace
//!
//! A library for reconstructing field-level data lineage in mainframe batch
//! codebases.
//!
//! # Features
//!
//! - Index job-control and procedure-library members into step/dataset records.
//! - Index data-step programs into input/output/set/merge records.
//! - Scan record layouts and procedure code into fields with their file handles,
//!   assignments and data-flow sources.
//! - Build a graph of fields scoped to their record hierarchy, so equally named
//!   fields of different records never merge.
//! - Search ranked lineage paths back to an assignment or file handle, and resolve
//!   the job step that produced the dataset behind it.
//!
//! # Example
//!
//! ```rust,no_run
//! use copytrace::{
//!     config::Config,
//!     job_control::scan_job_source,
//!     lineage::{extract_lineage, producer::JobIndex},
//!     scanner::scan_field_source,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     env_logger::init();
//!
//!     let cobol = r#"
//!        FILE-CONTROL.
//!            SELECT ACCTFILE ASSIGN TO ACCTDD.
//!        DATA DIVISION.
//!        FILE SECTION.
//!        FD  ACCTFILE.
//!        01  ACCT-REC.
//!            05  ACCOUNT-NO    PIC X(10).
//!     "#;
//!     let jcl = r#"
//! //STEP020  EXEC PGM=ACCTUPD
//! //ACCTDD   DD DSN=PROD.ACCT.DAILY,DISP=SHR
//!     "#;
//!
//!     let fields = scan_field_source("ACCTUPD.cbl", cobol);
//!     let jobs = JobIndex::new(vec![], scan_job_source("NIGHTLY.jcl", jcl), vec![]);
//!     let config = Config::default();
//!     for row in extract_lineage(&fields, &jobs, None, &config.search, &config.producer) {
//!         println!("{}", row.rendered_path);
//!     }
//!     Ok(())
//! }
//! ```
mod arena;
pub mod config;
pub mod ident;
pub mod job_control;
pub mod lineage;
pub mod scanner;
pub mod sources;
pub mod table;

pub use arena::ArenaIndex;
