// src/main.rs

use clap::{Args, Parser, Subcommand};
use price_check::compare::{comparison_table, pending_prices, product_detail};
use price_check::config::{Config, DEFAULT_CONFIG_PATH};
use price_check::document_db::DocumentStore;
use price_check::extract::{Document, extract_document, extractor_for};
use price_check::manual::{ManualEntry, parse_price};
use price_check::model::SupplierId;
use price_check::reconcile::{Decision, ReviewedItem, suggest_decisions};
use price_check::report::{ReportOptions, grouped_report, matrix_report};
use price_check::state::Coordinator;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(name = "price-check", version, about = "Compare supplier price lists")]
struct Cli {
    /// Config file
    #[arg(long, global = true, env = "PRICE_CHECK_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage suppliers
    #[command(subcommand)]
    Supplier(SupplierCommand),
    /// Extract a price list (PDF or image) and review or apply it
    Upload(UploadArgs),
    /// Apply a review file produced by `upload`
    Reconcile {
        review: PathBuf,
        #[arg(long)]
        supplier: Option<String>,
    },
    /// Add a single price by hand
    Add {
        canonical: String,
        #[arg(long)]
        price: String,
        /// Name on the supplier's list, defaults to the canonical name
        #[arg(long, default_value = "")]
        local: String,
        #[arg(long)]
        supplier: Option<String>,
    },
    /// Merge master products into one
    Merge {
        #[arg(required = true, num_args = 2..)]
        names: Vec<String>,
        #[arg(long)]
        into: String,
    },
    /// Toggle the favorite flag of a master product
    Favorite { name: String },
    /// Comparison table
    Compare {
        #[arg(long, short, default_value = "")]
        query: String,
    },
    /// Local names and prices of one master product
    Detail { name: String },
    /// Prices of a supplier that are not mapped yet
    Pending {
        #[arg(long)]
        supplier: Option<String>,
    },
    /// Savings report
    Report(ReportArgs),
    /// List ambiguous mappings and stored collections
    Check,
}

#[derive(Debug, Subcommand)]
enum SupplierCommand {
    Add { name: String },
    List,
    Remove { id: String },
    /// Make this supplier the default for upload, add and pending
    Select { id: String },
}

#[derive(Debug, Args)]
struct UploadArgs {
    file: PathBuf,
    #[arg(long)]
    supplier: Option<String>,
    /// LOCAL=CANONICAL, overrides the suggested decision for LOCAL
    #[arg(long = "assign", value_parser = parse_assignment)]
    assignments: Vec<(String, String)>,
    /// Write the result instead of printing the review
    #[arg(long)]
    apply: bool,
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Restrict to these suppliers, default all
    #[arg(long = "supplier")]
    suppliers: Vec<String>,
    /// Include products without a price difference
    #[arg(long)]
    all: bool,
    #[arg(long)]
    sort_by_savings: bool,
    /// Product by supplier matrix instead of per-supplier groups
    #[arg(long)]
    matrix: bool,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (local, canonical) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected LOCAL=CANONICAL, got '{raw}'"))?;
    Ok((local.trim().to_string(), canonical.trim().to_string()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_coordinator(cfg: &Config) -> CliResult<Coordinator> {
    if let Some(dir) = Path::new(&cfg.db_path).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let db = DocumentStore::new(&cfg.db_path)?;
    Ok(Coordinator::open(db, &cfg.user, cfg.reconcile)?)
}

fn supplier_arg(explicit: Option<String>, cfg: &Config) -> CliResult<SupplierId> {
    explicit
        .or_else(|| cfg.selected_supplier.clone())
        .map(SupplierId::new)
        .ok_or_else(|| "no supplier given and none selected (price-check supplier select <id>)".into())
}

#[tokio::main]
async fn main() -> CliResult {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> CliResult {
    let cfg = Config::load_or_default(&cli.config)?;
    info!(config = %cli.config.display(), db_path = %cfg.db_path, user = %cfg.user, "Configuration loaded");

    match cli.command {
        Command::Supplier(cmd) => run_supplier(cmd, &cfg, &cli.config),
        Command::Upload(args) => run_upload(args, &cfg).await,
        Command::Reconcile { review, supplier } => {
            let supplier = supplier_arg(supplier, &cfg)?;
            let items: Vec<ReviewedItem> = serde_json::from_str(&std::fs::read_to_string(&review)?)?;
            let mut coordinator = open_coordinator(&cfg)?;
            print_json(&coordinator.reconcile(&supplier, &items)?)
        }
        Command::Add {
            canonical,
            price,
            local,
            supplier,
        } => {
            let entry = ManualEntry {
                canonical,
                local_name: local,
                price: parse_price(&price)?,
                supplier: supplier_arg(supplier, &cfg)?,
            };
            let mut coordinator = open_coordinator(&cfg)?;
            print_json(&coordinator.add_manual(&entry)?)
        }
        Command::Merge { names, into } => {
            let names: BTreeSet<String> = names.into_iter().collect();
            let mut coordinator = open_coordinator(&cfg)?;
            print_json(&coordinator.merge(&names, &into)?)
        }
        Command::Favorite { name } => {
            let mut coordinator = open_coordinator(&cfg)?;
            let is_favorite = coordinator.toggle_favorite(&name)?;
            print_json(&serde_json::json!({ "name": name, "is_favorite": is_favorite }))
        }
        Command::Compare { query } => {
            let snapshot = open_coordinator(&cfg)?.snapshot();
            print_json(&comparison_table(&snapshot, &query))
        }
        Command::Detail { name } => {
            let snapshot = open_coordinator(&cfg)?.snapshot();
            let detail = product_detail(&snapshot, &name)
                .ok_or_else(|| format!("unknown master product '{name}'"))?;
            print_json(&detail)
        }
        Command::Pending { supplier } => {
            let supplier = supplier_arg(supplier, &cfg)?;
            let snapshot = open_coordinator(&cfg)?.snapshot();
            snapshot.require_supplier(&supplier)?;
            print_json(&pending_prices(&snapshot, &supplier))
        }
        Command::Report(args) => {
            let snapshot = open_coordinator(&cfg)?.snapshot();
            let options = ReportOptions {
                suppliers: args.suppliers.into_iter().map(SupplierId::new).collect(),
                only_differences: !args.all,
                sort_by_savings: args.sort_by_savings,
            };
            if args.matrix {
                print_json(&matrix_report(&snapshot, &options))
            } else {
                print_json(&grouped_report(&snapshot, &options))
            }
        }
        Command::Check => {
            let db = DocumentStore::new(&cfg.db_path)?;
            let collections: Vec<_> = db
                .get_counts(&cfg.user)?
                .into_iter()
                .map(|(collection, version, bytes)| {
                    serde_json::json!({ "collection": collection, "version": version, "bytes": bytes })
                })
                .collect();
            let coordinator = Coordinator::open(db, &cfg.user, cfg.reconcile)?;
            let ambiguities = coordinator.snapshot().mappings.ambiguities();
            for ambiguity in &ambiguities {
                warn!(%ambiguity, "Ambiguous mapping");
            }
            print_json(&serde_json::json!({
                "collections": collections,
                "ambiguities": ambiguities,
            }))
        }
    }
}

fn run_supplier(cmd: SupplierCommand, cfg: &Config, config_path: &Path) -> CliResult {
    let mut coordinator = open_coordinator(cfg)?;
    match cmd {
        SupplierCommand::Add { name } => print_json(&coordinator.add_supplier(&name)?),
        SupplierCommand::List => print_json(&coordinator.snapshot().suppliers),
        SupplierCommand::Remove { id } => {
            print_json(&coordinator.delete_supplier(&SupplierId::new(id))?)
        }
        SupplierCommand::Select { id } => {
            let id = SupplierId::new(id);
            let supplier = coordinator.snapshot().require_supplier(&id)?.clone();
            Config::update_selected_supplier(config_path, id.as_str())?;
            info!(supplier = %supplier.id, name = %supplier.name, "Supplier selected");
            print_json(&supplier)
        }
    }
}

async fn run_upload(args: UploadArgs, cfg: &Config) -> CliResult {
    let supplier = supplier_arg(args.supplier, cfg)?;
    let mut coordinator = open_coordinator(cfg)?;
    coordinator.snapshot().require_supplier(&supplier)?;

    let document = Document::from_path(&args.file)?;
    let extractor = extractor_for(&cfg.llm)?;
    let entries = extract_document(extractor.as_ref(), &document).await?;

    let mut items = suggest_decisions(&coordinator.snapshot(), &supplier, &entries);
    let mut assignments: BTreeMap<String, String> = args.assignments.into_iter().collect();
    for item in &mut items {
        if let Some(canonical) = assignments.remove(&item.entry.product) {
            item.decision = Decision::assign(canonical);
        }
    }
    for local in assignments.keys() {
        warn!(local = %local, "Assignment does not match any extracted product");
    }

    if !args.apply {
        return print_json(&items);
    }
    print_json(&coordinator.reconcile(&supplier, &items)?)
}
