use clap::Parser;
use webster_scrape::schedule::forward_interrupts;
use webster_scrape::{cli, logger, Result, Shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();
    let cli = cli::Cli::parse();

    let (stop_tx, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        if forward_interrupts(tokio::signal::ctrl_c, stop_tx).await {
            log::error!("Second interrupt, exiting without saving.");
            std::process::exit(130);
        }
    });

    cli::run(cli, shutdown).await
}
