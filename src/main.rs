/// Main entry point for the order engine
///
/// Thin wrapper around `interfaces::cli`.

use order_engine::interfaces::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("order-engine: {}", e);
        std::process::exit(1);
    }
}
