use std::error::Error;

use clap::Parser;
use log::LevelFilter;

use ringtalk::config::{Cli, NodeConfig};
use ringtalk::supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    simple_logger::SimpleLogger::new()
        .env()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    let config = NodeConfig::from_cli(args);
    supervisor::run(config).await
}
