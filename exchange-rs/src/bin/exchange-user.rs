//! CLI tool for managing exchange users
//!
//! Users are registered by a sentinel row in the storage file. The tool
//! takes the same file lock as the server, so it is safe to run against a
//! live server; send the server SIGHUP afterwards so it reloads the file.
//!
//! # Usage
//!
//! ```bash
//! # Create an empty storage file
//! exchange-user init --file data/storage.csv
//!
//! # Register a user
//! exchange-user add user@example.com --file data/storage.csv
//!
//! # List all users with their mail count
//! exchange-user list --file data/storage.csv
//!
//! # Check if user exists
//! exchange-user exists user@example.com --file data/storage.csv
//! ```

use clap::{Parser, Subcommand};
use exchange_rs::storage::CsvStorage;
use exchange_rs::store::{is_valid_address, normalize_address};

#[derive(Parser)]
#[command(name = "exchange-user")]
#[command(about = "Manage exchange user accounts", long_about = None)]
struct Cli {
    /// Storage file path
    #[arg(short, long, default_value = "data/storage.csv")]
    file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the storage file with its header row
    Init,
    /// Register a new user
    Add {
        /// User email address
        email: String,
    },
    /// List all users
    List,
    /// Check if user exists
    Exists {
        /// User email address
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let storage = CsvStorage::new(&cli.file);

    match cli.command {
        Commands::Init => {
            if storage.init().await? {
                println!("✓ Created {}", cli.file);
            } else {
                println!("{} already exists", cli.file);
            }
        }
        Commands::Add { email } => {
            let email = normalize_address(&email);
            if !is_valid_address(&email) {
                eprintln!("Error: invalid address {:?}", email);
                std::process::exit(1);
            }

            println!("Adding user: {}", email);
            if !storage.register_user(&email).await? {
                eprintln!("Error: User {} already exists", email);
                std::process::exit(1);
            }
            println!("✓ User {} added successfully", email);
        }
        Commands::List => {
            let mailboxes = storage.load().await?;

            if mailboxes.is_empty() {
                println!("No users found.");
            } else {
                let mut users: Vec<_> = mailboxes.iter().collect();
                users.sort_by(|a, b| a.0.cmp(b.0));

                println!("{:<40} {:>10}", "Email", "Messages");
                println!("{:-<51}", "");
                for (email, mailbox) in &users {
                    println!("{:<40} {:>10}", email, mailbox.len());
                }
                println!("\nTotal: {} user(s)", users.len());
            }
        }
        Commands::Exists { email } => {
            let email = normalize_address(&email);
            if storage.load().await?.contains_key(&email) {
                println!("✓ User {} exists", email);
            } else {
                println!("✗ User {} does not exist", email);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
