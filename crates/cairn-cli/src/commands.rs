use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use cairn_sdk::{
    cancel_pair, BlobId, CancelSignal, ContentHash, GcReport, ImportStats, NodeHandle,
    StorageClient, StorageConfig,
};
use colored::Colorize;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use crate::cli::*;

const DEFAULT_CONFIG_FILE: &str = "cairn.toml";

/// Dispatch a parsed command line.
pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    if let Command::Config = cli.command {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let client = StorageClient::open(config)?;
    let cancel = cancel_on_ctrl_c();
    let format = cli.format;

    match cli.command {
        Command::Put(args) => cmd_put(&client, args, format, &cancel).await,
        Command::Get(args) => cmd_get(&client, args, &cancel).await,
        Command::Blob(cmd) => cmd_blob(&client, cmd, format).await,
        Command::Import(args) => cmd_import(&client, args, format, &cancel).await,
        Command::Export(args) => cmd_export(&client, args, format, &cancel).await,
        Command::Archive(cmd) => cmd_archive(&client, cmd, format).await,
        Command::Ls(args) => cmd_ls(&client, args, format).await,
        Command::Gc(args) => cmd_gc(&client, args, format, &cancel).await,
        Command::Config => Ok(()),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            StorageConfig::load(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => StorageConfig::default(),
    };
    if let Some(store) = &cli.store {
        config.store_root = store.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    config.validate()?;
    Ok(config)
}

fn cancel_on_ctrl_c() -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            let _ = handle.send(true);
        }
    });
    signal
}

fn parse_hash(s: &str) -> anyhow::Result<ContentHash> {
    ContentHash::from_hex(s).with_context(|| format!("invalid hash {s:?}"))
}

async fn resolve(client: &StorageClient, s: &str) -> anyhow::Result<NodeHandle> {
    let hash = parse_hash(s)?;
    client
        .resolve(&hash)
        .await
        .with_context(|| format!("resolving {}", hash.short_hex()))
}

async fn write_output(output: Option<&Path>, data: &[u8]) -> anyhow::Result<()> {
    match output {
        Some(path) => tokio::fs::write(path, data).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(data).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

fn print_root(label: &str, root: &NodeHandle, stats: Option<&ImportStats>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let mut value = json!({ "root": root.hash.to_hex(), "length": root.length });
            if let Some(s) = stats {
                value["files"] = json!(s.files);
                value["directories"] = json!(s.directories);
                value["nodes_written"] = json!(s.nodes_written);
            }
            println!("{value}");
        }
        OutputFormat::Text => {
            println!("{} {} {}", "✓".green().bold(), label, root.hash.to_hex().yellow());
            println!("  Length: {} bytes", root.length.to_string().bold());
            if let Some(s) = stats {
                println!(
                    "  Files: {}  Directories: {}  Nodes written: {}",
                    s.files, s.directories, s.nodes_written
                );
            }
        }
    }
}

async fn cmd_put(
    client: &StorageClient,
    args: PutArgs,
    format: OutputFormat,
    cancel: &CancelSignal,
) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(&args.path)
        .await
        .with_context(|| format!("opening {}", args.path.display()))?;
    let root = client.write_file(file, cancel).await?;
    print_root("Stored", &root, None, format);
    Ok(())
}

async fn cmd_get(client: &StorageClient, args: GetArgs, cancel: &CancelSignal) -> anyhow::Result<()> {
    let root = resolve(client, &args.root).await?;
    match (&args.path, &args.output) {
        (Some(path), output) => {
            let data = client.read_path(&root, path).await?;
            write_output(output.as_deref(), &data).await
        }
        (None, Some(output)) => {
            let mut file = tokio::fs::File::create(output).await?;
            client.copy_file(&root, &mut file, cancel).await?;
            Ok(())
        }
        (None, None) => {
            let mut stdout = tokio::io::stdout();
            client.copy_file(&root, &mut stdout, cancel).await?;
            Ok(())
        }
    }
}

async fn cmd_blob(client: &StorageClient, cmd: BlobCommand, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        BlobCommand::Put { path } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let id = client.put_blob(Bytes::from(data)).await?;
            match format {
                OutputFormat::Json => println!("{}", json!({ "id": id.to_string() })),
                OutputFormat::Text => println!("{} Blob {}", "✓".green().bold(), id.to_string().yellow()),
            }
        }
        BlobCommand::Get { id, output } => {
            let id = BlobId::from(parse_hash(&id)?);
            let data = client
                .get_blob(&id)
                .await?
                .with_context(|| format!("blob {id} not found"))?;
            write_output(output.as_deref(), &data).await?;
        }
        BlobCommand::Head { ids } => {
            let ids = ids
                .iter()
                .map(|s| parse_hash(s).map(BlobId::from))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let missing = client.exists_batch(&ids).await?;
            for id in &ids {
                let present = !missing.contains(id);
                match format {
                    OutputFormat::Json => println!("{}", json!({ "id": id.to_string(), "present": present })),
                    OutputFormat::Text if present => println!("  {} {}", "present".green(), id),
                    OutputFormat::Text => println!("  {} {}", "missing".red(), id),
                }
            }
        }
        BlobCommand::Rm { id } => {
            let id = BlobId::from(parse_hash(&id)?);
            let removed = client.delete_blob(&id).await?;
            match format {
                OutputFormat::Json => println!("{}", json!({ "id": id.to_string(), "removed": removed })),
                OutputFormat::Text if removed => println!("{} Removed {}", "✓".green().bold(), id),
                OutputFormat::Text => println!("Blob {} not present.", id),
            }
        }
    }
    Ok(())
}

async fn cmd_import(
    client: &StorageClient,
    args: ImportArgs,
    format: OutputFormat,
    cancel: &CancelSignal,
) -> anyhow::Result<()> {
    let (root, stats) = client.import_directory(&args.dir, cancel).await?;
    print_root("Imported", &root, Some(&stats), format);
    Ok(())
}

async fn cmd_export(
    client: &StorageClient,
    args: ExportArgs,
    format: OutputFormat,
    cancel: &CancelSignal,
) -> anyhow::Result<()> {
    let root = resolve(client, &args.root).await?;
    let stats = client.export_directory(&root, &args.dest, cancel).await?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "files": stats.files, "directories": stats.directories, "bytes": stats.bytes })
        ),
        OutputFormat::Text => println!(
            "{} Exported {} files, {} directories ({} bytes) to {}",
            "✓".green().bold(),
            stats.files,
            stats.directories,
            stats.bytes,
            args.dest.display().to_string().bold()
        ),
    }
    Ok(())
}

async fn cmd_archive(client: &StorageClient, cmd: ArchiveCommand, format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ArchiveCommand::Export { root, output } => {
            let root = resolve(client, &root).await?;
            let archive = client.export_archive(&root).await?;
            tokio::fs::write(&output, &archive).await?;
            match format {
                OutputFormat::Json => println!("{}", json!({ "bytes": archive.len() })),
                OutputFormat::Text => println!(
                    "{} Wrote {} ({} bytes)",
                    "✓".green().bold(),
                    output.display().to_string().bold(),
                    archive.len()
                ),
            }
        }
        ArchiveCommand::Import { input } => {
            let data = tokio::fs::read(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            let (root, stats) = client.import_archive(Bytes::from(data)).await?;
            print_root("Imported", &root, Some(&stats), format);
        }
    }
    Ok(())
}

async fn cmd_ls(client: &StorageClient, args: LsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root = resolve(client, &args.root).await?;

    if args.recursive {
        let listing = client.walk(&root).await?;
        match format {
            OutputFormat::Json => {
                let files: Vec<_> = listing
                    .files
                    .iter()
                    .map(|(path, f)| json!({ "path": path, "length": f.length, "flags": f.flags.to_string(), "root": f.root.hash.to_hex() }))
                    .collect();
                println!("{}", json!({ "directories": listing.directories, "files": files }));
            }
            OutputFormat::Text => {
                for dir in &listing.directories {
                    println!("{:>12}  {}/", "", dir.blue().bold());
                }
                for (path, f) in &listing.files {
                    println!("{:>12}  {}  {}", f.length, f.flags, path);
                }
            }
        }
        return Ok(());
    }

    let listing = client.list(&root, &args.path).await?;
    match format {
        OutputFormat::Json => {
            let files: Vec<_> = listing
                .files
                .iter()
                .map(|f| json!({ "name": f.name, "length": f.length, "flags": f.flags.to_string(), "root": f.root.hash.to_hex() }))
                .collect();
            println!("{}", json!({ "directories": listing.directories, "files": files }));
        }
        OutputFormat::Text => {
            for dir in &listing.directories {
                println!("{:>12}  {}/", "", dir.blue().bold());
            }
            for f in &listing.files {
                let name = if f.flags.is_executable() {
                    f.name.green().to_string()
                } else {
                    f.name.clone()
                };
                println!("{:>12}  {}  {}", f.length, f.flags, name);
            }
        }
    }
    Ok(())
}

async fn cmd_gc(
    client: &StorageClient,
    args: GcArgs,
    format: OutputFormat,
    cancel: &CancelSignal,
) -> anyhow::Result<()> {
    let keep = args
        .keep
        .iter()
        .map(|s| parse_hash(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let report = client.collect_garbage(&keep, cancel).await?;
    print_gc(client, &report, format);
    Ok(())
}

fn print_gc(client: &StorageClient, report: &GcReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "namespace": client.namespace().as_str(),
                "scanned": report.scanned,
                "total_bytes": report.total_bytes,
                "eligible": report.eligible,
                "deleted": report.deleted,
                "bytes_freed": report.bytes_freed,
                "failed": report.failed,
                "protected": report.protected,
                "remaining_bytes": report.remaining_bytes,
                "cancelled": report.cancelled,
            })
        ),
        OutputFormat::Text => {
            let mark = if report.cancelled { "!".yellow().bold() } else { "✓".green().bold() };
            println!(
                "{} GC {}: {} objects removed, {} bytes freed",
                mark,
                client.namespace().as_str().cyan(),
                report.deleted,
                report.bytes_freed
            );
            println!(
                "  Scanned {} ({} bytes), eligible {}, protected {}, remaining {} bytes",
                report.scanned, report.total_bytes, report.eligible, report.protected, report.remaining_bytes
            );
            if report.failed > 0 {
                println!("  {} {} deletes failed", "warning:".yellow(), report.failed);
            }
        }
    }
}
