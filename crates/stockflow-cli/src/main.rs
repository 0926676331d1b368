//! StockFlow CLI
//!
//! Command-line interface for StockFlow - products, orders, inventory and a
//! live view of changes made by other users.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stockflow_core::models::{AdjustmentType, OrderStatus, Role};
use stockflow_core::{Config, StockFlow};

mod commands;
mod output;
mod prompt;

use output::{AlreadyReported, Output, OutputFormat};

#[derive(Parser)]
#[command(name = "stockflow")]
#[command(about = "StockFlow - Inventory and order management client")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Password (read from STOCKFLOW_PASSWORD or stdin if omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account and log in
    Register {
        /// Account email
        #[arg(short, long)]
        email: String,
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Password (read from STOCKFLOW_PASSWORD or stdin if omitted)
        #[arg(short, long)]
        password: Option<String>,
        /// Role (ADMIN or STAFF)
        #[arg(long, value_parser = parse_role)]
        role: Option<Role>,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Manage products
    #[command(alias = "product")]
    Products {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Manage orders
    #[command(alias = "order")]
    Orders {
        #[command(subcommand)]
        command: OrderCommands,
    },
    /// Inventory adjustments
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },
    /// Show dashboard statistics
    Dashboard,
    /// Follow realtime changes until Ctrl-C
    Watch,
}

#[derive(Args, Clone, Debug)]
struct PageArgs {
    /// Page number
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Items per page (defaults to page_size from config)
    #[arg(long)]
    limit: Option<u32>,
}

#[derive(Args, Clone, Debug, Default)]
struct ProductFields {
    /// Product name
    #[arg(long)]
    name: Option<String>,
    /// Stock keeping unit
    #[arg(long)]
    sku: Option<String>,
    /// Description
    #[arg(long)]
    description: Option<String>,
    /// Unit price
    #[arg(long)]
    price: Option<f64>,
    /// Stock level
    #[arg(long)]
    stock: Option<i64>,
    /// Low-stock threshold
    #[arg(long)]
    threshold: Option<i64>,
}

#[derive(Subcommand)]
enum ProductCommands {
    /// List products
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        page: PageArgs,
        /// Search name or SKU
        #[arg(short, long)]
        search: Option<String>,
        /// Sort field (e.g. name, price, stockLevel)
        #[arg(long)]
        sort_by: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },
    /// Show product details
    Show {
        /// Product ID
        id: String,
    },
    /// List products at or below their low-stock threshold
    LowStock,
    /// Create a product
    #[command(alias = "add")]
    Create {
        #[command(flatten)]
        fields: ProductFields,
    },
    /// Update a product
    Update {
        /// Product ID
        id: String,
        #[command(flatten)]
        fields: ProductFields,
    },
    /// Delete a product
    #[command(alias = "rm")]
    Delete {
        /// Product ID
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum OrderCommands {
    /// List orders
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        page: PageArgs,
        /// Filter by status
        #[arg(long, value_parser = parse_status)]
        status: Option<OrderStatus>,
        /// Filter by user ID
        #[arg(long)]
        user: Option<String>,
    },
    /// Show order details
    Show {
        /// Order ID
        id: String,
    },
    /// Show today's orders and revenue
    Today,
    /// Place an order
    Create {
        /// Item as PRODUCT_ID:QUANTITY (repeatable)
        #[arg(short, long = "item", required = true)]
        items: Vec<String>,
    },
    /// Change an order's status
    Status {
        /// Order ID
        id: String,
        /// New status (PENDING, COMPLETED, CANCELLED)
        #[arg(value_parser = parse_status)]
        status: OrderStatus,
    },
}

#[derive(Subcommand)]
enum InventoryCommands {
    /// List inventory adjustments
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        page: PageArgs,
        /// Filter by product ID
        #[arg(long)]
        product: Option<String>,
        /// Filter by type (IN or OUT)
        #[arg(long = "type", value_parser = parse_kind)]
        kind: Option<AdjustmentType>,
    },
    /// Show adjustment history of one product
    Product {
        /// Product ID
        id: String,
    },
    /// Add or remove stock
    Adjust {
        /// Product ID
        product_id: String,
        /// IN or OUT
        #[arg(value_parser = parse_kind)]
        kind: AdjustmentType,
        /// Number of units
        quantity: i64,
        /// Reason for the adjustment
        #[arg(short, long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, realtime_url, data_dir, stale_time_secs, page_size, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn parse_status(s: &str) -> Result<OrderStatus, String> {
    s.parse()
}

fn parse_kind(s: &str) -> Result<AdjustmentType, String> {
    s.parse()
}

fn parse_role(s: &str) -> Result<Role, String> {
    match s.to_ascii_uppercase().as_str() {
        "ADMIN" => Ok(Role::Admin),
        "STAFF" => Ok(Role::Staff),
        other => Err(format!("Unknown role '{}'. Use ADMIN or STAFF.", other)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match run(cli, output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !e.is::<AlreadyReported>() {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let config_path = cli.config.as_ref();

    // Config commands work without a usable API
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);
    let client = StockFlow::open_with_config(config);

    match cli.command {
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Login { email, password } => {
            commands::auth::login(&client, email, password, &output).await
        }
        Commands::Register {
            email,
            name,
            password,
            role,
        } => commands::auth::register(&client, email, name, password, role, &output).await,
        Commands::Logout => commands::auth::logout(&client, &output),
        Commands::Whoami => commands::auth::whoami(&client, &output),
        Commands::Products { command } => handle_product_command(command, &client, &output).await,
        Commands::Orders { command } => handle_order_command(command, &client, &output).await,
        Commands::Inventory { command } => {
            handle_inventory_command(command, &client, &output).await
        }
        Commands::Dashboard => commands::dashboard::show(&client, &output).await,
        Commands::Watch => commands::watch::run(&client, &output).await,
    }
}

async fn handle_product_command(
    command: ProductCommands,
    client: &StockFlow,
    output: &Output,
) -> Result<()> {
    use commands::products;

    match command {
        ProductCommands::List {
            page,
            search,
            sort_by,
            desc,
        } => {
            let limit = page.limit.unwrap_or(client.config().page_size);
            products::list(client, page.page, limit, search, sort_by, desc, output).await
        }
        ProductCommands::Show { id } => products::show(client, id, output).await,
        ProductCommands::LowStock => products::low_stock(client, output).await,
        ProductCommands::Create { fields } => {
            products::create(client, fields.into(), output).await
        }
        ProductCommands::Update { id, fields } => {
            products::update(client, id, fields.into(), output).await
        }
        ProductCommands::Delete { id, yes } => products::delete(client, id, yes, output).await,
    }
}

async fn handle_order_command(
    command: OrderCommands,
    client: &StockFlow,
    output: &Output,
) -> Result<()> {
    use commands::orders;

    match command {
        OrderCommands::List { page, status, user } => {
            let limit = page.limit.unwrap_or(client.config().page_size);
            orders::list(client, page.page, limit, status, user, output).await
        }
        OrderCommands::Show { id } => orders::show(client, id, output).await,
        OrderCommands::Today => orders::today(client, output).await,
        OrderCommands::Create { items } => orders::create(client, items, output).await,
        OrderCommands::Status { id, status } => {
            orders::set_status(client, id, status, output).await
        }
    }
}

async fn handle_inventory_command(
    command: InventoryCommands,
    client: &StockFlow,
    output: &Output,
) -> Result<()> {
    use commands::inventory;

    match command {
        InventoryCommands::List {
            page,
            product,
            kind,
        } => {
            let limit = page.limit.unwrap_or(client.config().page_size);
            inventory::list(client, page.page, limit, product, kind, output).await
        }
        InventoryCommands::Product { id } => inventory::product(client, id, output).await,
        InventoryCommands::Adjust {
            product_id,
            kind,
            quantity,
            reason,
        } => inventory::adjust(client, product_id, kind, quantity, reason, output).await,
    }
}

impl From<ProductFields> for commands::products::ProductInput {
    fn from(fields: ProductFields) -> Self {
        Self {
            name: fields.name,
            sku: fields.sku,
            description: fields.description,
            price: fields.price,
            stock_level: fields.stock,
            low_stock_threshold: fields.threshold,
        }
    }
}

/// Initialize logging
///
/// The level comes from STOCKFLOW_LOG (default: warn); RUST_LOG replaces the
/// whole filter when set. Logs go to config.log_file if set, else stderr.
fn init_logging(config: &Config) {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(filter) if !filter.is_empty() => EnvFilter::new(filter),
        _ => {
            let log_level = std::env::var("STOCKFLOW_LOG").unwrap_or_else(|_| "warn".to_string());
            EnvFilter::new(format!(
                "stockflow_core={},stockflow_cli={}",
                log_level, log_level
            ))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let Some(ref log_path) = config.log_file else {
        let _ = builder.with_writer(std::io::stderr).try_init();
        return;
    };

    match File::create(log_path) {
        Ok(log_file) => {
            let _ = builder.with_ansi(false).with_writer(log_file).try_init();
        }
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_adjust() {
        let cli = Cli::try_parse_from([
            "stockflow", "inventory", "adjust", "p1", "out", "3", "--reason", "damaged",
        ])
        .unwrap();
        match cli.command {
            Commands::Inventory {
                command:
                    InventoryCommands::Adjust {
                        product_id,
                        kind,
                        quantity,
                        reason,
                    },
            } => {
                assert_eq!(product_id, "p1");
                assert_eq!(kind, AdjustmentType::Out);
                assert_eq!(quantity, 3);
                assert_eq!(reason.as_deref(), Some("damaged"));
            }
            _ => panic!("Expected inventory adjust"),
        }
    }

    #[test]
    fn test_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["stockflow", "orders", "status", "o1", "SHIPPED"]).is_err());
    }

    #[test]
    fn test_order_create_requires_items() {
        assert!(Cli::try_parse_from(["stockflow", "orders", "create"]).is_err());
        assert!(
            Cli::try_parse_from(["stockflow", "orders", "create", "-i", "p1:2", "-i", "p2:1"])
                .is_ok()
        );
    }
}
