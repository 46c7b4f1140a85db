mod args;

use args::Args;

mod core;
mod map;
mod reduce;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    crate::core::run(args).await
}
