// CLI commands

use crate::config::Config;
use crate::core::Block;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::storage::LedgerStore;
use crate::wallet::{Address, Wallets};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "utxo-ledger")]
#[command(about = "Single-node UTXO ledger sealed by proof of work", long_about = None)]
pub struct Cli {
    /// Directory holding the block store, wallets and config
    #[arg(long, global = true, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Override the proof-of-work difficulty (leading zero bits)
    #[arg(long, global = true)]
    pub difficulty: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a blockchain whose genesis rewards ADDRESS
    Init {
        address: String,
    },

    /// Open the existing blockchain and show its tip
    Continue,

    /// Send AMOUNT from one address to another
    Send {
        /// Sender address; must be in the wallet file
        from: String,
        /// Recipient address
        to: String,
        amount: u64,
    },

    /// Print every block from tip to genesis
    PrintChain,

    /// Get balance for an address
    GetBalance {
        address: String,
    },

    /// Rebuild the UTXO index from the chain
    ReindexUtxo,

    /// Generate a new key pair and print its address
    CreateWallet,

    /// List the addresses in the wallet file
    ListAddresses,
}

impl Cli {
    /// Config file from the data directory with command-line overrides applied
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::load(&self.data_dir)?;
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
            config.validate()?;
        }
        Ok(config)
    }
}

/// CLI handler
pub struct CliHandler {
    config: Config,
    store: LedgerStore,
}

impl CliHandler {
    /// Open the store once for the lifetime of the process
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = LedgerStore::open(config.blocks_path())?;
        log::debug!("Opened ledger store at {}", config.blocks_path().display());
        Ok(Self { config, store })
    }

    /// Handle CLI command
    pub fn handle(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { address } => self.init(&address),
            Commands::Continue => self.continue_chain(),
            Commands::Send { from, to, amount } => self.send(&from, &to, amount),
            Commands::PrintChain => self.print_chain(),
            Commands::GetBalance { address } => self.get_balance(&address),
            Commands::ReindexUtxo => self.reindex_utxo(),
            Commands::CreateWallet => self.create_wallet(),
            Commands::ListAddresses => self.list_addresses(),
        }
    }

    fn open_ledger(&self) -> Result<Ledger> {
        Ledger::open(self.store.clone(), &self.config)
    }

    fn init(&self, address: &str) -> Result<()> {
        let key_hash = Address::parse(address)?.key_hash()?;
        println!("Initializing blockchain (difficulty {})...", self.config.difficulty);

        let ledger = Ledger::init(self.store.clone(), &self.config, &key_hash)?;

        println!("Genesis block created");
        println!("  Hash: {}", ledger.chain().tip());
        println!("  Reward: {} to {}", self.config.coinbase_reward, address);
        Ok(())
    }

    fn continue_chain(&self) -> Result<()> {
        let ledger = self.open_ledger()?;
        println!("Blockchain loaded");
        println!("  Tip: {}", ledger.chain().tip());
        println!("  Indexed transactions: {}", ledger.utxo_set().count_transactions()?);
        Ok(())
    }

    fn send(&self, from: &str, to: &str, amount: u64) -> Result<()> {
        let from = Address::parse(from)?;
        let to_key_hash = Address::parse(to)?.key_hash()?;

        let wallets = Wallets::load_or_default(self.config.wallets_path())?;
        let sender = wallets.get(&from)?;

        let mut ledger = self.open_ledger()?;
        let block = ledger.send(sender, &to_key_hash, amount)?;

        println!("Success!");
        println!("  Block: {}", block.hash);
        println!("  Transaction: {}", block.transactions[0].id);
        Ok(())
    }

    fn print_chain(&self) -> Result<()> {
        let ledger = self.open_ledger()?;
        for (block, valid) in ledger.blocks()? {
            print_block(&block, valid);
        }
        Ok(())
    }

    fn get_balance(&self, address: &str) -> Result<()> {
        let key_hash = Address::parse(address)?.key_hash()?;
        let balance = self.open_ledger()?.balance(&key_hash)?;
        println!("Balance of '{}': {}", address, balance);
        Ok(())
    }

    fn reindex_utxo(&self) -> Result<()> {
        let count = self.open_ledger()?.reindex_utxo()?;
        println!("Done! There are {} transactions in the UTXO set.", count);
        Ok(())
    }

    fn create_wallet(&self) -> Result<()> {
        let path = self.config.wallets_path();
        let mut wallets = Wallets::load_or_default(&path)?;
        let address = wallets.create_wallet();
        wallets.save(&path)?;

        println!("New address: {}", address);
        Ok(())
    }

    fn list_addresses(&self) -> Result<()> {
        let wallets = Wallets::load_or_default(self.config.wallets_path())?;
        let addresses = wallets.addresses();
        println!("Addresses ({}):", addresses.len());
        for address in addresses {
            println!("  {}", address);
        }
        Ok(())
    }
}

fn print_block(block: &Block, valid: bool) {
    println!("============ Block {} ============", block.hash);
    match &block.prev_hash {
        Some(prev_hash) => println!("Prev. block: {}", prev_hash),
        None => println!("Prev. block: (genesis)"),
    }
    println!("Nonce: {}", block.nonce);
    println!("PoW: {}", valid);
    for tx in &block.transactions {
        println!("{}", tx);
    }
    println!();
}
