use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use rusqlite::Connection;
use visc_dsr::{export_json, export_store_file, ExportOptions};

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[arg(long)]
    pub db: PathBuf,
    #[arg(long)]
    pub out: PathBuf,
    /// Also write the derived files per combination.
    #[arg(long)]
    pub per_run: bool,
    #[arg(long)]
    pub distribution_summary: bool,
    /// Additionally dump the whole store as canonical JSON.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

pub fn run(args: &ExportArgs) -> Result<(), Box<dyn Error>> {
    let opts = ExportOptions {
        per_run: args.per_run,
        distribution_summary: args.distribution_summary,
    };
    let manifest = export_store_file(&args.db, &args.out, &opts)?;
    if let Some(path) = &args.json {
        let conn = Connection::open(&args.db)?;
        export_json(&conn, path)?;
    }
    for path in manifest.tables.iter().chain(&manifest.derived) {
        println!("{}", path.display());
    }
    if !manifest.per_run.is_empty() {
        println!("per-run exports: {}", manifest.per_run.len());
    }
    Ok(())
}
