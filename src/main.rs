use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use shopngo::application::service::ShopService;
use shopngo::config::Config;
use shopngo::domain::identity::Identity;
use shopngo::domain::ports::Stores;
use shopngo::domain::product::Product;
use shopngo::error::CartError;
use shopngo::infrastructure::clock::SystemClock;
use shopngo::infrastructure::identity::StaticIdentityProvider;
use shopngo::infrastructure::notifier::OutboxNotifier;
use shopngo::interfaces::csv::catalog_reader::CatalogReader;
use shopngo::interfaces::csv::command_reader::{CartCommand, CommandReader, ScriptedCommand};
use shopngo::interfaces::csv::report_writer::ReportWriter;
use shopngo::logging;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database. Needs the `storage-rocksdb` feature.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Log level, unless RUST_LOG is set
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a command script, then print orders and carts as CSV
    Replay {
        /// Script CSV: op, credential, arg, extra
        script: PathBuf,

        /// Products CSV to seed the catalog with
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Carts to provision on an empty registry
        #[arg(long)]
        carts: Option<u32>,
    },
    /// Provision carts and seed the catalog, then print the cart table
    Provision {
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long)]
        carts: Option<u32>,
    },
    /// End every active session and free its cart
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.log_json |= cli.log_json;
    if cli.db_path.is_some() {
        config.db_path = cli.db_path;
    }
    logging::init(&config.log_level, config.log_json)?;

    let stores = open_stores(config.db_path.as_deref())?;
    let identity = StaticIdentityProvider::trusting();
    let operator = format!("operator-{}", uuid::Uuid::new_v4());
    identity
        .register(operator.clone(), Identity::admin("operator"))
        .await;
    let outbox = OutboxNotifier::new();
    let service = ShopService::new(
        stores.clone(),
        Arc::new(identity),
        Arc::new(outbox.clone()),
        Arc::new(SystemClock),
        config.checkout_policy(),
    );

    match cli.command {
        Command::Replay {
            script,
            catalog,
            carts,
        } => {
            prepare(&service, &operator, catalog.as_deref(), carts.unwrap_or(config.carts)).await?;
            replay(&service, &outbox, &script).await?;

            let closed = service.shutdown().await?;
            info!(closed, "Closed remaining sessions");

            let mut writer = ReportWriter::new(io::stdout().lock());
            writer.write_orders(&stores.orders.all().await?)?;
            writer.write_carts(&service.list_carts().await?)?;
        }
        Command::Provision { catalog, carts } => {
            prepare(&service, &operator, catalog.as_deref(), carts.unwrap_or(config.carts)).await?;
            let mut writer = ReportWriter::new(io::stdout().lock());
            writer.write_carts(&service.list_carts().await?)?;
        }
        Command::Cleanup => {
            let closed = service.end_all_sessions(&operator).await?;
            info!(closed, "Cleanup finished");
        }
    }

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    use shopngo::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            info!(path = %path.display(), "Using RocksDB storage");
            Ok(RocksDBStore::open(path)?.stores())
        }
        None => Ok(Stores::in_memory()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    if let Some(path) = db_path {
        warn!(
            path = %path.display(),
            "Built without the storage-rocksdb feature, falling back to in-memory storage"
        );
    }
    Ok(Stores::in_memory())
}

async fn prepare(
    service: &ShopService,
    operator: &str,
    catalog: Option<&Path>,
    carts: u32,
) -> Result<()> {
    service.provision_carts(operator, carts).await?;

    if let Some(path) = catalog {
        let file = File::open(path).into_diagnostic()?;
        let mut products: Vec<Product> = Vec::new();
        for product in CatalogReader::new(file).products() {
            match product {
                Ok(product) => products.push(product),
                Err(e) => warn!(error = %e, "Error reading product"),
            }
        }
        service.seed_catalog(operator, products).await?;
    }
    Ok(())
}

async fn replay(service: &ShopService, outbox: &OutboxNotifier, script: &Path) -> Result<()> {
    let file = File::open(script).into_diagnostic()?;
    for row in CommandReader::new(file).commands() {
        match row {
            Ok(scripted) => {
                if let Err(e) = run(service, outbox, &scripted).await {
                    warn!(credential = %scripted.credential, command = ?scripted.command, error = %e, "Error processing command");
                }
            }
            Err(e) => warn!(error = %e, "Error reading command"),
        }
    }
    Ok(())
}

async fn run(
    service: &ShopService,
    outbox: &OutboxNotifier,
    scripted: &ScriptedCommand,
) -> shopngo::error::Result<()> {
    let credential = scripted.credential.as_str();
    match &scripted.command {
        CartCommand::Start { cart_barcode } => {
            service.start_session(credential, cart_barcode).await?;
        }
        CartCommand::End => {
            service.end_session(credential).await?;
        }
        CartCommand::Scan { rfid_tag } => {
            service.scan_product(credential, rfid_tag).await?;
        }
        CartCommand::Toggle { rfid_tag } => {
            let (outcome, view) = service.toggle_product(credential, rfid_tag).await?;
            info!(credential, ?outcome, total = %view.total_amount, "Toggled product");
        }
        CartCommand::Remove { product_id } => {
            service.remove_from_cart(credential, product_id).await?;
        }
        CartCommand::View => {
            let view = service.get_session(credential).await?;
            info!(credential, items = view.items.len(), total = %view.total_amount, "Cart contents");
        }
        CartCommand::Checkout {
            payment_method,
            card_number,
        } => {
            let initiated = service
                .initiate_checkout(credential, payment_method, card_number.as_deref())
                .await?;
            info!(credential, expires_at = %initiated.expires_at, "Awaiting one-time code");
        }
        CartCommand::Verify { code } => {
            let code = match code {
                Some(code) => code.clone(),
                None => outbox
                    .last_code(&service.shopper(credential).await?)
                    .await
                    .ok_or(CartError::TicketNotFound)?
                    .as_str()
                    .to_string(),
            };
            service.verify_checkout(credential, &code).await?;
        }
        CartCommand::Orders => {
            let orders = service.order_history(credential).await?;
            info!(credential, orders = orders.len(), "Order history");
        }
    }
    Ok(())
}
