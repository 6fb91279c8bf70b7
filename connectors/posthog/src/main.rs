use airsync_core::entrypoint;
use airsync_posthog::SourcePosthog;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    entrypoint::init_logging();
    entrypoint::launch(&SourcePosthog::new(), std::env::args_os()).await?;
    Ok(())
}
