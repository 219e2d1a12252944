//! utxo-ledger CLI
//!
//! Command-line interface for creating wallets, bootstrapping the chain
//! and moving value between addresses.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use utxo_ledger::cli::commands;

#[derive(Parser)]
#[command(name = "utxo-ledger")]
#[command(version = "0.1.0")]
#[command(about = "A single-node UTXO ledger with proof-of-work mining", long_about = None)]
struct Cli {
    /// Data directory for chain and wallet storage
    #[arg(short, long, default_value = ".ledger_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair and save it into the wallet file
    #[command(name = "createwallet")]
    CreateWallet,

    /// Print all stored wallet addresses
    #[command(name = "listaddresses")]
    ListAddresses,

    /// Create a chain and send the genesis block reward to ADDRESS
    #[command(name = "createblockchain")]
    CreateBlockchain {
        /// Address receiving the genesis subsidy
        #[arg(long)]
        address: String,
    },

    /// Get the balance of ADDRESS
    #[command(name = "getbalance")]
    GetBalance {
        /// Wallet address to query
        #[arg(long)]
        address: String,
    },

    /// Send AMOUNT of units from FROM to TO
    Send {
        /// Sender's wallet address
        #[arg(long)]
        from: String,

        /// Recipient's address
        #[arg(long)]
        to: String,

        /// Amount to send
        #[arg(long)]
        amount: u64,
    },

    /// Print all the blocks of the chain
    #[command(name = "printchain")]
    PrintChain,

    /// Rebuild the UTXO index from a full chain scan
    #[command(name = "reindexutxo")]
    ReindexUtxo,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::CreateWallet => commands::create_wallet(&cli.data_dir),
        Commands::ListAddresses => commands::list_addresses(&cli.data_dir),
        Commands::CreateBlockchain { address } => {
            commands::create_blockchain(&cli.data_dir, &address)
        }
        Commands::GetBalance { address } => commands::get_balance(&cli.data_dir, &address),
        Commands::Send { from, to, amount } => commands::send(&cli.data_dir, &from, &to, amount),
        Commands::PrintChain => commands::print_chain(&cli.data_dir),
        Commands::ReindexUtxo => commands::reindex_utxo(&cli.data_dir),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
