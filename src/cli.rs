use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opconverge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge declared backend objects to their desired state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Backend API URL
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// API token (prefer OPCONVERGE_TOKEN or the config file)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Retries per backend command after the first attempt
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Object type configuration document (defaults to the built-in one)
    #[arg(long, global = true)]
    pub schema: Option<PathBuf>,

    /// Refuse to run against a backend older than this version
    #[arg(long, global = true)]
    pub min_version: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update an object from a JSON declaration
    Apply(DeclArgs),

    /// Show what apply would change, without writing
    Diff(DeclArgs),

    /// Read an object's current state
    Read(ObjectArgs),

    /// Delete an object
    Delete(ObjectArgs),

    /// List object types, or the attributes of one type
    Schema {
        /// Object type to describe
        object_type: Option<String>,
    },

    /// Show the backend version
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser)]
pub struct DeclArgs {
    /// Object type (e.g. action, alarm, notebook)
    pub object_type: String,

    /// JSON file with the declaration ("-" for stdin)
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser)]
pub struct ObjectArgs {
    /// Object type (e.g. action, alarm, notebook)
    pub object_type: String,

    /// Object name
    pub name: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
