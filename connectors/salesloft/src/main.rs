use airsync_core::entrypoint;
use airsync_salesloft::SourceSalesloft;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    entrypoint::init_logging();
    entrypoint::launch(&SourceSalesloft::new(), std::env::args_os()).await?;
    Ok(())
}
