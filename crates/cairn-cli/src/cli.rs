use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cairn",
    about = "Cairn - content-addressed hierarchical blob storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./cairn.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store root, overriding the configuration
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Namespace, overriding the configuration
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Chunk a file into the store and print its root
    Put(PutArgs),
    /// Write the content under a root to stdout or a file
    Get(GetArgs),
    /// Opaque blob operations
    #[command(subcommand)]
    Blob(BlobCommand),
    /// Import a directory as a tree
    Import(ImportArgs),
    /// Export a tree to a directory
    Export(ExportArgs),
    /// Zip archive import and export
    #[command(subcommand)]
    Archive(ArchiveCommand),
    /// List a directory inside a tree
    Ls(LsArgs),
    /// Evict least recently used objects above the namespace ceiling
    Gc(GcArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct PutArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct GetArgs {
    /// Root hash, or tree root hash with --path
    pub root: String,
    /// File inside the tree at `root`
    #[arg(long)]
    pub path: Option<String>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum BlobCommand {
    /// Store a file as one opaque blob
    Put { path: PathBuf },
    /// Print a blob to stdout or a file
    Get {
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check which blobs exist
    Head { ids: Vec<String> },
    /// Delete a blob
    Rm { id: String },
}

#[derive(Args)]
pub struct ImportArgs {
    pub dir: PathBuf,
}

#[derive(Args)]
pub struct ExportArgs {
    pub root: String,
    pub dest: PathBuf,
}

#[derive(Subcommand)]
pub enum ArchiveCommand {
    /// Pack a tree into a zip file
    Export { root: String, output: PathBuf },
    /// Unpack a zip file into a new tree
    Import { input: PathBuf },
}

#[derive(Args)]
pub struct LsArgs {
    pub root: String,
    #[arg(default_value = "")]
    pub path: String,
    /// List every path in the tree
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct GcArgs {
    /// Root hashes whose reachable nodes must be kept
    #[arg(long)]
    pub keep: Vec<String>,
}
