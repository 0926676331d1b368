//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::fmt;

use serde::Serialize;

use stockflow_core::models::{
    DashboardData, InventoryAdjustment, LowStockProducts, Order, OrdersPage, Pagination, Product,
    ProductsPage, TodaysOrders, User,
};
use stockflow_core::{Notification, NotificationLevel};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Error already shown to the user through a notification
///
/// Commands return it so the process exits non-zero without printing the
/// same failure twice.
#[derive(Debug)]
pub struct AlreadyReported;

impl fmt::Display for AlreadyReported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation failed")
    }
}

impl std::error::Error for AlreadyReported {}

/// Output helper for consistent formatting
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Check if output is JSON
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print any serializable value as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to encode output: {}", e),
        }
    }

    /// Print a user
    pub fn print_user(&self, user: &User) {
        match self.format {
            OutputFormat::Human => {
                println!("Name:   {}", user.name);
                println!("Email:  {}", user.email);
                println!("Role:   {:?}", user.role);
                println!("Joined: {}", user.created_at.format("%Y-%m-%d"));
            }
            OutputFormat::Json => self.print_json(user),
            OutputFormat::Quiet => println!("{}", user.email),
        }
    }

    /// Print a single product
    pub fn print_product(&self, product: &Product) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", product.id);
                println!("Name:        {}", product.name);
                println!("SKU:         {}", product.sku);
                if let Some(ref desc) = product.description {
                    println!("Description: {}", desc);
                }
                println!("Price:       ${:.2}", product.price);
                println!(
                    "Stock:       {}{}",
                    product.stock_level,
                    if product.is_low_stock() { " (low)" } else { "" }
                );
                println!("Threshold:   {}", product.low_stock_threshold);
                println!("Updated:     {}", product.updated_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => self.print_json(product),
            OutputFormat::Quiet => println!("{}", product.id),
        }
    }

    /// Print a page of products
    pub fn print_products(&self, page: &ProductsPage) {
        match self.format {
            OutputFormat::Human => {
                if page.products.is_empty() {
                    println!("No products found.");
                    return;
                }
                for product in &page.products {
                    print_product_row(product);
                }
                print_pagination(&page.pagination, "product");
            }
            OutputFormat::Json => self.print_json(page),
            OutputFormat::Quiet => {
                for product in &page.products {
                    println!("{}", product.id);
                }
            }
        }
    }

    /// Print products at or below their threshold
    pub fn print_low_stock(&self, low: &LowStockProducts) {
        match self.format {
            OutputFormat::Human => {
                if low.products.is_empty() {
                    println!("No products are low on stock.");
                    return;
                }
                for product in &low.products {
                    print_product_row(product);
                }
                println!("\n{} product(s) low on stock", low.count);
            }
            OutputFormat::Json => self.print_json(low),
            OutputFormat::Quiet => {
                for product in &low.products {
                    println!("{}", product.id);
                }
            }
        }
    }

    /// Print a single order with its items
    pub fn print_order(&self, order: &Order) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", order.id);
                println!("Status:   {}", order.status.as_str());
                println!("Customer: {}", order.user.name);
                println!("Total:    ${:.2}", order.total_amount);
                println!("Placed:   {}", order.created_at.format("%Y-%m-%d %H:%M"));

                if !order.order_items.is_empty() {
                    println!();
                    println!("── Items ({}) ──", order.item_count());
                    for item in &order.order_items {
                        println!(
                            "{} x {} @ ${:.2}",
                            item.quantity, item.product.name, item.price_at_time
                        );
                    }
                }
            }
            OutputFormat::Json => self.print_json(order),
            OutputFormat::Quiet => println!("{}", order.id),
        }
    }

    /// Print a page of orders
    pub fn print_orders(&self, page: &OrdersPage) {
        match self.format {
            OutputFormat::Human => {
                if page.orders.is_empty() {
                    println!("No orders found.");
                    return;
                }
                for order in &page.orders {
                    print_order_row(order);
                }
                print_pagination(&page.pagination, "order");
            }
            OutputFormat::Json => self.print_json(page),
            OutputFormat::Quiet => {
                for order in &page.orders {
                    println!("{}", order.id);
                }
            }
        }
    }

    /// Print today's orders with revenue
    pub fn print_todays_orders(&self, today: &TodaysOrders) {
        match self.format {
            OutputFormat::Human => {
                for order in &today.orders {
                    print_order_row(order);
                }
                println!(
                    "\n{} order(s) today, ${:.2} revenue",
                    today.count, today.total_revenue
                );
            }
            OutputFormat::Json => self.print_json(today),
            OutputFormat::Quiet => {
                for order in &today.orders {
                    println!("{}", order.id);
                }
            }
        }
    }

    /// Print inventory adjustments
    pub fn print_adjustments(
        &self,
        adjustments: &[InventoryAdjustment],
        pagination: Option<&Pagination>,
    ) {
        match self.format {
            OutputFormat::Human => {
                if adjustments.is_empty() {
                    println!("No adjustments found.");
                    return;
                }
                for adj in adjustments {
                    println!(
                        "{} | {:<3} | {:>+6} | {} | {} | {}",
                        adj.created_at.format("%Y-%m-%d %H:%M"),
                        adj.kind.as_str(),
                        adj.quantity,
                        truncate(&adj.product.name, 25),
                        adj.user.name,
                        adj.reason.as_deref().unwrap_or("-")
                    );
                }
                match pagination {
                    Some(p) => print_pagination(p, "adjustment"),
                    None => println!("\n{} adjustment(s)", adjustments.len()),
                }
            }
            OutputFormat::Json => self.print_json(adjustments),
            OutputFormat::Quiet => {
                for adj in adjustments {
                    println!("{}", adj.id);
                }
            }
        }
    }

    /// Print the dashboard
    pub fn print_dashboard(&self, data: &DashboardData) {
        match self.format {
            OutputFormat::Human => {
                let stats = &data.stats;
                println!("Dashboard");
                println!("=========");
                println!("  Products:       {}", stats.total_products);
                println!("  Active orders:  {}", stats.active_orders);
                println!("  Low stock:      {}", stats.low_stock_items);
                println!("  Revenue (month): ${:.2}", stats.revenue_this_month);

                if !data.recent_orders.is_empty() {
                    println!();
                    println!("Recent orders:");
                    for order in &data.recent_orders {
                        println!(
                            "  {} | {:<9} | {} | ${:.2}",
                            short_id(&order.id),
                            order.status.as_str(),
                            order.user.name,
                            order.total_amount
                        );
                    }
                }

                if !data.low_stock_products.is_empty() {
                    println!();
                    println!("Low stock:");
                    for product in &data.low_stock_products {
                        println!(
                            "  {} ({}): {} / {}",
                            product.name,
                            product.sku,
                            product.stock_level,
                            product.low_stock_threshold
                        );
                    }
                }
            }
            OutputFormat::Json => self.print_json(data),
            OutputFormat::Quiet => {
                let stats = &data.stats;
                println!(
                    "{} {} {} {:.2}",
                    stats.total_products,
                    stats.active_orders,
                    stats.low_stock_items,
                    stats.revenue_this_month
                );
            }
        }
    }

    /// Print a notification
    ///
    /// Errors go to stderr in every format, so quiet mode still reports them.
    pub fn notification(&self, notification: &Notification) {
        if notification.level == NotificationLevel::Error {
            eprintln!("✗ {}", notification.text());
            return;
        }

        match self.format {
            OutputFormat::Human => {
                let marker = match notification.level {
                    NotificationLevel::Success => "✓",
                    _ => "•",
                };
                println!("{} {}", marker, notification.title);
                if let Some(ref description) = notification.description {
                    println!("  {}", description);
                }
            }
            OutputFormat::Json => match serde_json::to_string(notification) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to encode output: {}", e),
            },
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_product_row(product: &Product) {
    println!(
        "{} | {:<30} | {:<12} | {:>9} | {:>5}{}",
        short_id(&product.id),
        truncate(&product.name, 30),
        truncate(&product.sku, 12),
        format!("${:.2}", product.price),
        product.stock_level,
        if product.is_low_stock() { " !" } else { "" }
    );
}

fn print_order_row(order: &Order) {
    println!(
        "{} | {:<9} | {:<20} | {:>3} item(s) | {:>10} | {}",
        short_id(&order.id),
        order.status.as_str(),
        truncate(&order.user.name, 20),
        order.item_count(),
        format!("${:.2}", order.total_amount),
        order.created_at.format("%Y-%m-%d %H:%M")
    );
}

fn print_pagination(pagination: &Pagination, noun: &str) {
    println!(
        "\nPage {} of {} ({} {}(s))",
        pagination.page,
        pagination.total_pages.max(1),
        pagination.total,
        noun
    );
    if pagination.has_next() {
        println!("Next page: --page {}", pagination.page + 1);
    }
}

/// First eight characters of an id
fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
