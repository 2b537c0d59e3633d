// UTXO ledger - CLI

use clap::Parser;
use utxo_ledger::{Cli, CliHandler};

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let handler = match cli.config().and_then(CliHandler::new) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error initializing: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = handler.handle(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
