use std::path::Path;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "text-to-image-rust",
    version,
    about = "HTTP API for text-to-image generation and text overlays"
)]
struct Cli {
    /// Address to listen on (default: [server].addr from settings)
    #[arg(short = 'a', long = "addr")]
    addr: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings =
        text_to_image_rust::settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;
    text_to_image_rust::logging::init(cli.verbose || settings.debug)?;
    let addr = cli.addr.unwrap_or_else(|| settings.server_addr.clone());
    text_to_image_rust::server::run_server(settings, addr).await
}
