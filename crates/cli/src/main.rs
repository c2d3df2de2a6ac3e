//! Cartwheel CLI - catalog and cart management tools.
//!
//! # Usage
//!
//! ```bash
//! # Write products from a YAML file to the catalog
//! cartwheel-cli catalog seed products.yaml
//!
//! # List the catalog in storefront order
//! cartwheel-cli catalog list
//!
//! # Inspect or empty a shopper's stored cart
//! cartwheel-cli cart show user_k3j9x0abc
//! cartwheel-cli cart clear user_k3j9x0abc
//! ```
//!
//! All commands talk to Firestore using the `FIRESTORE_*` variables the
//! storefront reads.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "cartwheel-cli")]
#[command(author, version, about = "Cartwheel CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the product catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Inspect and reset stored carts
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Write products from a YAML file
    Seed {
        /// Path to the YAML catalog file
        file: String,
    },
    /// List products, newest first
    List,
}

#[derive(Subcommand)]
enum CartAction {
    /// Print a shopper's stored cart
    Show {
        /// Shopper identity (the `store_user_id` cookie value)
        user_id: String,
    },
    /// Overwrite a shopper's stored cart with an empty one
    Clear {
        /// Shopper identity (the `store_user_id` cookie value)
        user_id: String,
    },
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartwheel_cli=info,cartwheel_storefront=warn".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Catalog { action } => match action {
            CatalogAction::Seed { file } => commands::catalog::seed(&file).await?,
            CatalogAction::List => commands::catalog::list().await?,
        },
        Commands::Cart { action } => match action {
            CartAction::Show { user_id } => commands::cart::show(&user_id).await?,
            CartAction::Clear { user_id } => commands::cart::clear(&user_id).await?,
        },
    }
    Ok(())
}
