use airsync::{cli::Cli, registry};
use airsync_core::entrypoint;
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    entrypoint::init_logging();
    let cli = Cli::parse();
    let registry = registry();

    if cli.list {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let name = cli.source.as_deref().unwrap_or_default();
    let source = registry.create(name)?;
    info!(source = name, "Launching source");
    entrypoint::launch(source.as_ref(), cli.source_args()).await?;
    Ok(())
}
