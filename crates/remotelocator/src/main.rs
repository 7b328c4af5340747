//! RemoteLocator - Main entry point
//!
//! Builds the catalog of downloadable IR remotes from local archive mirrors,
//! drills down through it and resolves remotes to their commands.

mod builder;
mod config;
mod fetch;
mod locate;
mod output;
mod resolver;

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use remotelocator_core::{CatalogDocument, IngestOptions, SourceKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

use builder::{build_document, SourceRoot};
use config::Config;
use fetch::Fetcher;
use locate::{locate, Located, Query};
use resolver::{ResolveJob, Resolver};

const STDOUT: &str = "-";

#[derive(Parser, Debug)]
#[command(name = "remotelocator")]
#[command(about = "Locate downloadable IR remotes across archives")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "remotelocator.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape archive mirrors and write a catalog document
    Build(BuildArgs),
    /// List a catalog level, or show one remote
    Locate(LocateArgs),
    /// Resolve every remote and write one Girr file per remote
    Export(ExportArgs),
}

#[derive(ClapArgs, Debug)]
struct BuildArgs {
    /// Girr archive directory
    #[arg(long)]
    girr: Option<PathBuf>,
    /// IRDB `codes` directory
    #[arg(long)]
    irdb: Option<PathBuf>,
    /// LIRC `remotes` directory
    #[arg(long)]
    lirc: Option<PathBuf>,
    /// Flipper-IRDB directory
    #[arg(long)]
    flipper: Option<PathBuf>,
    /// JP1 spreadsheet (flat ODS)
    #[arg(long)]
    jp1: Option<PathBuf>,
    /// Sort the catalog before writing
    #[arg(long)]
    sort: bool,
    /// Insert remotes in the order the scrapers found them
    #[arg(long)]
    keep_order: bool,
    /// Output file, `-` for stdout
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct LocateArgs {
    /// Catalog document: file, `file:` URL or http(s) URL
    #[arg(short, long)]
    catalog: Option<String>,
    /// Only remotes of this kind
    #[arg(short, long)]
    kind: Option<SourceKind>,
    /// Manufacturer, `?` to list
    #[arg(short, long)]
    manufacturer: Option<String>,
    /// Device class, `?` to list
    #[arg(short, long)]
    device_class: Option<String>,
    /// Remote, `?` to list
    remote: Option<String>,
    /// Emit Girr XML
    #[arg(long)]
    girr: bool,
    /// Emit Pronto Hex
    #[arg(long)]
    pronto: bool,
    /// Emit IRDB style CSV
    #[arg(long)]
    csv: bool,
    /// Emit JSON
    #[arg(long)]
    json: bool,
    /// Print the remote's URL instead of resolving it
    #[arg(short, long)]
    url: bool,
    /// Open the remote's URL in the browser
    #[arg(short, long)]
    browse: bool,
    /// Output file, `-` for stdout
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct ExportArgs {
    /// Catalog document: file, `file:` URL or http(s) URL
    #[arg(short, long)]
    catalog: Option<String>,
    /// Only remotes of this kind
    #[arg(short, long)]
    kind: Option<SourceKind>,
    /// Output directory
    #[arg(short, long)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so listings and remotes can be piped
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("RemoteLocator v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;

    match args.command {
        Commands::Build(build) => run_build(&config, build),
        Commands::Locate(query) => run_locate(&config, query).await,
        Commands::Export(export) => run_export(&config, export).await,
    }
}

fn write_output(output: Option<&str>, text: &str) -> Result<()> {
    match output {
        None | Some(STDOUT) => {
            print!("{}", text);
            Ok(())
        }
        Some(path) => std::fs::write(path, text).with_context(|| format!("Failed to write {}", path)),
    }
}

fn load_catalog_file(path: &Path) -> Result<CatalogDocument> {
    CatalogDocument::from_file(path)
        .with_context(|| format!("Failed to load catalog {}", path.display()))
}

/// The configured catalog, or the one named on the command line
async fn load_catalog(config: &Config, catalog: Option<&str>) -> Result<CatalogDocument> {
    let Some(source) = catalog else {
        return load_catalog_file(&config.catalog.path);
    };
    match Url::parse(source) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            let fetched = fetcher(config)?
                .fetch_url(&url)
                .await
                .with_context(|| format!("Failed to download catalog {}", url))?;
            let xml = String::from_utf8(fetched.content)
                .with_context(|| format!("Catalog {} is not UTF-8", url))?;
            CatalogDocument::from_xml(&xml).with_context(|| format!("Failed to load catalog {}", url))
        }
        Ok(url) if url.scheme() == "file" => {
            let path = url
                .to_file_path()
                .map_err(|()| anyhow!("Not a local file URL: {}", url))?;
            load_catalog_file(&path)
        }
        // plain paths, including Windows drive letters
        _ => load_catalog_file(Path::new(source)),
    }
}

fn fetcher(config: &Config) -> Result<Fetcher> {
    Fetcher::new(
        config.resolver.timeout(),
        &config.resolver.user_agent,
        config.mirrors(),
    )
    .context("Failed to create HTTP client")
}

fn resolver(config: &Config) -> Result<Arc<Resolver>> {
    Ok(Arc::new(Resolver::new(fetcher(config)?, &config.resolver)))
}

fn run_build(config: &Config, args: BuildArgs) -> Result<()> {
    let given = [
        (SourceKind::Girr, args.girr),
        (SourceKind::Irdb, args.irdb),
        (SourceKind::Lirc, args.lirc),
        (SourceKind::Flipper, args.flipper),
        (SourceKind::Jp1, args.jp1),
    ];
    let roots: Vec<SourceRoot> = given
        .into_iter()
        .filter_map(|(kind, root)| {
            root.or_else(|| config.source_dir(kind).map(Path::to_path_buf))
                .map(|root| SourceRoot { kind, root })
        })
        .collect();
    if roots.is_empty() {
        anyhow::bail!("No sources given, neither on the command line nor in the config");
    }

    let options = IngestOptions {
        presort: !args.keep_order,
    };
    let document = build_document(config, &roots, &options, args.sort)?;

    match args.output.as_deref() {
        Some(STDOUT) => write_output(None, &document.to_xml()?),
        Some(path) => document
            .to_file(Path::new(path))
            .with_context(|| format!("Failed to write {}", path)),
        None => document
            .to_file(&config.catalog.path)
            .with_context(|| format!("Failed to write {}", config.catalog.path.display())),
    }
}

async fn run_locate(config: &Config, args: LocateArgs) -> Result<()> {
    let document = load_catalog(config, args.catalog.as_deref()).await?;
    let query = Query {
        manufacturer: args.manufacturer.as_deref(),
        device_class: args.device_class.as_deref(),
        remote: args.remote.as_deref(),
        kind: args.kind,
    };

    let (manufacturer, device_class, entry) = match locate(&document.catalog, &query)? {
        Located::Remote {
            manufacturer,
            device_class,
            entry,
        } => (manufacturer, device_class, entry),
        listing => {
            let mut text = listing.names().join("\n");
            text.push('\n');
            return write_output(args.output.as_deref(), &text);
        }
    };

    if args.url || args.browse {
        let url = entry.location().url()?;
        if args.browse {
            open::that(url.as_str()).with_context(|| format!("Failed to open {}", url))?;
        }
        if args.url {
            write_output(args.output.as_deref(), &format!("{}\n", url))?;
        }
        return Ok(());
    }

    let remote = resolver(config)?
        .resolve(manufacturer, device_class, entry)
        .await
        .with_context(|| format!("Failed to resolve {}", entry.remote_name()))?;

    // Girr unless something else was asked for
    let girr = args.girr || !(args.pronto || args.csv || args.json);
    let mut text = String::new();
    if girr {
        text.push_str(&output::girr(&remote)?);
    }
    if args.pronto {
        text.push_str(&output::pronto(&remote));
    }
    if args.csv {
        text.push_str(&output::csv(&remote)?);
    }
    if args.json {
        text.push_str(&output::json(&remote)?);
        text.push('\n');
    }
    write_output(args.output.as_deref(), &text)
}

/// File name of an exported remote
fn export_name(job: &ResolveJob) -> String {
    format!("{}_{}_{}.girr", job.manufacturer, job.device_class, job.key)
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

async fn run_export(config: &Config, args: ExportArgs) -> Result<()> {
    let document = load_catalog(config, args.catalog.as_deref()).await?;
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let jobs: Vec<ResolveJob> = document
        .catalog
        .entries()
        .filter(|(_, _, _, entry)| args.kind.map_or(true, |kind| entry.kind() == kind))
        .filter(|(_, _, _, entry)| entry.kind().is_resolvable())
        .map(|(m, d, key, entry)| ResolveJob::new(m.name(), d.name(), key, entry))
        .collect();
    info!(remotes = jobs.len(), "Exporting");

    let mut written = 0usize;
    let mut failed = 0usize;
    for (job, result) in resolver(config)?.resolve_all(jobs).await {
        let path = args.output.join(export_name(&job));
        let outcome = result
            .map_err(anyhow::Error::from)
            .and_then(|remote| output::girr(&remote))
            .and_then(|xml| std::fs::write(&path, xml).map_err(anyhow::Error::from));
        match outcome {
            Ok(()) => written += 1,
            Err(e) => {
                failed += 1;
                warn!(manufacturer = %job.manufacturer, device_class = %job.device_class,
                      remote = %job.key, error = %e, "Export failed");
            }
        }
    }

    info!(written, failed, dir = %args.output.display(), "Export finished");
    Ok(())
}
