use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "citydb-delete",
    version,
    about = "Generate, install and run cascading delete routines for a 3D city database"
)]
pub struct Cli {
    /// Path to the configuration file (falls back to CONFIG_PATH, then config/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize the delete routines and write the script
    Generate {
        /// Read the schema from a YAML file instead of the database catalogue
        #[arg(long)]
        schema_file: Option<PathBuf>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Install a delete script into the database
    Install {
        /// Script to install (generated from the catalogue when omitted)
        #[arg(short, long)]
        script: Option<PathBuf>,
    },
    /// Delete the objects listed in a file
    Delete {
        /// File with one `object_id[,objectclass_id[,objectclass_name]]` per line
        #[arg(long)]
        ids: PathBuf,

        /// Number of workers (overrides bulk_delete.workers)
        #[arg(short, long)]
        workers: Option<usize>,
    },
}
