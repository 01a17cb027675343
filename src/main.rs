mod config;
mod db;
mod enrich;
mod export;
mod fuzzy;
mod graph;
mod normalize;
mod query;
mod record;
mod server;
mod tui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::{SnapshotError, Store};
use crate::export::ExportFormat;
use crate::graph::{BandGraph, MergePolicy, SelfLoopPolicy};
use crate::query::{QueryError, SortKey};

#[derive(Parser)]
#[command(
    name = "ffo",
    version,
    about = "Band recommendations from \"for fans of\" mentions."
)]
struct Cli {
    /// Path to the SQLite store (overrides the config file)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Config file path (default ~/.ffo/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the default config file
    Init,
    /// Validate a JSON array of relation records and add them to the store
    Ingest {
        file: PathBuf,
        /// Drop every stored record first
        #[arg(long)]
        replace: bool,
    },
    /// Attach metrics to extracted posts and store the resulting records
    Enrich {
        posts: PathBuf,
        /// JSON object of band name -> {followers, popularity}
        #[arg(long)]
        catalog: PathBuf,
    },
    /// Rebuild the graph snapshot from stored records
    Build {
        #[arg(long, value_enum)]
        self_loops: Option<SelfLoopPolicy>,
        #[arg(long, value_enum)]
        merge: Option<MergePolicy>,
    },
    /// List every band in the graph
    Bands,
    /// List known countries
    Countries,
    /// Recommend bands for fans of BAND
    Recommend {
        band: String,
        #[arg(long)]
        max_followers: Option<u64>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        max_popularity: Option<u8>,
        #[arg(long)]
        min_connections: Option<u32>,
        /// Only bands from this country (repeatable)
        #[arg(long = "country")]
        countries: Vec<String>,
        #[arg(long, value_enum)]
        sort: Option<SortKey>,
    },
    /// Write the whole graph for external tools
    Export {
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
        /// Output file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show store and graph statistics
    Stats,
    /// Browse recommendations interactively in the terminal
    Browse,
    /// Launch HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Open the store and load its graph snapshot.
fn load_graph(path: &Path) -> Result<BandGraph, SnapshotError> {
    let store = Store::open_existing(path)?;
    let (graph, _) = store.load_snapshot(path)?;
    Ok(graph)
}

fn fmt_opt<T: ToString>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Handle init before loading config (it creates the config file).
    if matches!(cli.command, Commands::Init) {
        if config_path.exists() {
            println!("ℹ️  Config already exists at {}", config_path.display());
        } else {
            Config::write_default(&config_path)?;
            println!("✅ Default config written to {}", config_path.display());
        }
        return Ok(());
    }

    let cfg = Config::load_from(&config_path)?;
    init_tracing(&cfg.log_level);
    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.store_path));

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Ingest { file, replace } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let raw: Vec<record::RawRecord> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {} as a JSON array of records", file.display()))?;
            let validated = record::validate_batch(&raw);
            let store = Store::open(&store_path)
                .with_context(|| format!("opening {}", store_path.display()))?;
            if replace {
                let cleared = store.clear_records()?;
                info!(cleared, "cleared stored records");
            }
            let added = store.append_records(&validated.records)?;
            println!(
                "📥 Ingested {added} records from {} ({} stored)",
                file.display(),
                store.record_count()?
            );
            if !validated.rejected.is_empty() {
                println!("   Rejected {}:", validated.rejected.len());
                for (i, e) in validated.rejected.iter().take(10) {
                    println!("     #{i}: {e}");
                }
                if validated.rejected.len() > 10 {
                    println!("     … and {} more", validated.rejected.len() - 10);
                }
            }
            println!("   Run `ffo build` to refresh the graph.");
        }
        Commands::Enrich { posts, catalog } => {
            let text = std::fs::read_to_string(&posts)
                .with_context(|| format!("reading {}", posts.display()))?;
            let posts_in: Vec<enrich::ExtractedPost> = serde_json::from_str(&text)
                .with_context(|| format!("parsing {} as a JSON array of posts", posts.display()))?;
            let lookup = enrich::CatalogLookup::load(&catalog)?;
            let store = Store::open(&store_path)
                .with_context(|| format!("opening {}", store_path.display()))?;
            let mut cache = enrich::MetadataCache::from_entries(store.load_cache()?);
            let (records, report) = enrich::enrich_posts(posts_in, &lookup, &mut cache);
            store.append_records(&records)?;
            store.save_cache(cache.entries())?;
            println!("🔎 Enriched {} posts:", report.posts);
            println!("   Records:         {}", report.records);
            println!("   Duplicate posts: {}", report.duplicate_posts);
            println!("   Skipped posts:   {}", report.skipped_posts);
            println!("   Skipped bands:   {}", report.skipped_bands);
            println!(
                "   Lookups:         {} ({} cached, {} names known)",
                cache.misses(),
                cache.hits(),
                cache.len()
            );
        }
        Commands::Build { self_loops, merge } => {
            let mut options = cfg.build;
            if let Some(s) = self_loops {
                options.self_loops = s;
            }
            if let Some(m) = merge {
                options.merge = m;
            }
            let store = Store::open(&store_path)
                .with_context(|| format!("opening {}", store_path.display()))?;
            let outcome = store.rebuild(&options).context("rebuilding graph snapshot")?;
            let r = &outcome.report;
            println!("🕸️  Built graph from {} records", r.records);
            println!("   Bands:       {}", outcome.graph.band_count());
            println!("   Connections: {}", outcome.graph.connection_count());
            if r.skipped() > 0 {
                println!(
                    "   Skipped:     {} ({} empty names, {} self-recommendations)",
                    r.skipped(),
                    r.skipped_empty,
                    r.skipped_self_loops
                );
            }
        }
        Commands::Bands => {
            let graph = load_graph(&store_path)?;
            if graph.is_empty() {
                println!("🤷 The graph is empty. Ingest some records and run `ffo build`.");
            }
            for name in graph.names() {
                println!("{name}");
            }
        }
        Commands::Countries => {
            let graph = load_graph(&store_path)?;
            for country in graph.countries() {
                println!("{country}");
            }
        }
        Commands::Recommend {
            band,
            max_followers,
            max_popularity,
            min_connections,
            countries,
            sort,
        } => {
            let graph = load_graph(&store_path)?;
            let mut filters = cfg.filters.clone();
            if let Some(f) = max_followers {
                filters.max_followers = f;
            }
            if let Some(p) = max_popularity {
                filters.max_popularity = p;
            }
            if let Some(c) = min_connections {
                filters.min_connections = c;
            }
            if !countries.is_empty() {
                filters.countries = countries.into_iter().collect();
            }
            let sort = sort.unwrap_or_default();
            let results = match query::recommend(&graph, &band, &filters, sort) {
                Ok(r) => r,
                Err(e @ QueryError::UnknownBand { .. }) => {
                    let QueryError::UnknownBand { suggestions, .. } = &e;
                    if suggestions.is_empty() {
                        anyhow::bail!("{e}");
                    }
                    anyhow::bail!("{e}. Did you mean: {}?", suggestions.join(", "));
                }
            };
            if results.is_empty() {
                println!("🤷 No recommendations for \"{band}\" with these filters.");
            } else {
                println!("🎸 For fans of \"{band}\" (by {sort}):\n");
                println!(
                    "  {:<32} {:>5} {:>5} {:>10}  Country",
                    "Band", "Conn", "Pop", "Followers"
                );
                for r in results {
                    println!(
                        "  {:<32} {:>5} {:>5} {:>10}  {}",
                        r.band,
                        r.connections,
                        fmt_opt(r.popularity),
                        fmt_opt(r.followers),
                        r.country
                    );
                }
            }
        }
        Commands::Export { format, out } => {
            let graph = load_graph(&store_path)?;
            let format = format.unwrap_or(cfg.export.format);
            let out = out.unwrap_or_else(|| cfg.export.output_path(format));
            export::write_file(&graph, format, &out)?;
            println!(
                "📦 Exported {} bands and {} connections to {}",
                graph.band_count(),
                graph.connection_count(),
                out.display()
            );
        }
        Commands::Stats => {
            let store = Store::open_existing(&store_path)?;
            let stats = store.stats()?;
            println!("🕸️  Graph Statistics:\n");
            println!("  Records:     {}", stats.record_count);
            println!("  Bands:       {}", stats.band_count);
            println!("  Connections: {}", stats.connection_count);
            println!("  Cached:      {}", stats.cache_entries);
            println!("  DB size:     {}", stats.db_size);
            match store.load_snapshot(&store_path) {
                Ok((graph, info)) => {
                    println!("  Built at:    {} UTC", info.built_at);
                    println!(
                        "  Skipped:     {} empty, {} self-recommendations",
                        info.report.skipped_empty, info.report.skipped_self_loops
                    );
                    let top = graph.top_bands(10);
                    if !top.is_empty() {
                        println!("\n  Most mentioned:");
                        for (band, degree) in top {
                            println!("    {degree:>5}  {}", band.name);
                        }
                    }
                }
                Err(SnapshotError::Missing(_)) => {
                    println!("  Built at:    never (run `ffo build`)");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Browse => {
            let graph = load_graph(&store_path)?;
            tui::run(graph, cfg.filters.clone())?;
        }
        Commands::Serve { port } => {
            let snapshot = match Store::open_existing(&store_path)
                .and_then(|s| s.load_snapshot(&store_path))
            {
                Ok((graph, info)) => Some(server::Snapshot { graph, info }),
                Err(SnapshotError::Missing(_)) => {
                    warn!(
                        store = %store_path.display(),
                        "no graph snapshot yet; POST /api/rebuild once records are ingested"
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            };
            let state = server::AppState::new(
                store_path.clone(),
                cfg.build,
                cfg.filters.clone(),
                snapshot,
            );
            server::run_server(state, port.unwrap_or(cfg.server.port)).await?;
        }
    }
    Ok(())
}
