use clap::Parser;

mod args;
mod boot;
mod conf;
mod screen;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = args::Cli::parse();
    boot::init_logging(&cli);
    boot::run(cli).await
}
