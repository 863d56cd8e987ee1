use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Delivers the results of finished conversion jobs.
#[derive(Debug, Parser)]
#[command(name = "convertx-delivery", version, about)]
pub struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(long, global = true, env = "CONVERTX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report whether an output directory is single- or multi-output
    Classify {
        output_dir: PathBuf,
    },

    /// Finish a job: package multi-output results, leave single outputs alone
    Package {
        output_dir: PathBuf,
        /// Job identifier; a random one is generated when omitted
        #[arg(long)]
        job_id: Option<String>,
        #[arg(long, default_value = "")]
        engine: String,
        #[arg(long, default_value = "")]
        source_format: String,
        #[arg(long, default_value = "")]
        output_format: String,
        /// multi-output, sequence, batch, split or pages
        #[arg(long)]
        task_type: Option<String>,
        /// Extra manifest metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// The converter itself failed with this message; nothing is packaged
        #[arg(long)]
        conversion_error: Option<String>,
    },

    /// Bundle a directory into a plain .tar
    Plain {
        source_dir: PathBuf,
        output: PathBuf,
    },

    /// Print the governed archive and package names for a base name
    ArchiveName {
        base_name: String,
    },

    /// Validate and fix converter arguments for an output path
    Govern {
        output_path: String,
        #[arg(long)]
        output_format: Option<String>,
        /// Converter arguments, after `--`
        #[arg(last = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the manifest stored in a governed package
    Manifest {
        package: PathBuf,
    },
}
