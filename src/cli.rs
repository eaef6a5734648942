use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tiergraph",
    version,
    about = "Metadata graph engine for multi-tier web applications",
    after_help = r#"Examples:
  tiergraph analyze --root . --project shop
  tiergraph analyze --root . --project shop --clear --force
  tiergraph resolve --root .
  tiergraph chains --root .
  tiergraph cleanup --root .
  tiergraph overview --root .
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan a source root, extract facts per file, and resolve cross-file
    /// edges.
    Analyze {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Project name the files are registered under.
        #[arg(long, default_value = "default")]
        project: String,
        /// Physically delete the project's rows before ingesting.
        #[arg(long)]
        clear: bool,
        /// Re-analyze files whose content hash is unchanged.
        #[arg(long)]
        force: bool,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Re-run cross-file edge derivation without re-scanning sources.
    Resolve {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the entry -> method -> statement -> table chain report.
    Chains {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Retire malformed endpoint components and their edges.
    Cleanup {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print store-wide live counts.
    Overview {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}
