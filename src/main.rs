use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tiergraph::{chain, cleanup, cli, ingest, resolve, store};
use tracing_subscriber::EnvFilter;

fn default_db_path(root: &PathBuf) -> PathBuf {
    root.join(".tiergraph").join("tiergraph.sqlite")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Analyze {
            root,
            db,
            project,
            clear,
            force,
            no_ignore,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&root));
            let store = store::Store::open(&db_path)?;
            let mut ingestor = ingest::Ingestor::new(
                store,
                &project,
                root,
                ingest::scan::ScanOptions::new(no_ignore),
                force,
            )?;
            if clear {
                let project_id = ingestor.project_id();
                ingestor.store().clear_project(project_id)?;
            }
            let (mut stats, outcomes) = ingestor.analyze()?;
            let resolved = resolve::run(ingestor.store())?;
            stats.resolved_symbol_edges = resolved.symbol_edges;
            stats.resolved_table_edges = resolved.table_edges;
            stats.resolved_call_edges = resolved.call_edges;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "stats": stats,
                    "files": outcomes,
                }))?
            );
            Ok(())
        }
        cli::Command::Resolve { root, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&root));
            let store = store::Store::open(&db_path)?;
            let stats = resolve::run(&store)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        cli::Command::Chains { root, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&root));
            let store = store::Store::open(&db_path)?;
            let rows = chain::chain_report(&store)?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
        cli::Command::Cleanup { root, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&root));
            let store = store::Store::open(&db_path)?;
            let report = cleanup::run(&store)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        cli::Command::Overview { root, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&root));
            let store = store::Store::open(&db_path)?;
            let overview = store.overview()?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
            Ok(())
        }
    }
}
