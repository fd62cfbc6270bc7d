use peerhost_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Storage, inbox, perimeter, worker pool and routes
    let app = peerhost_api::setup::initialize_app(config.clone()).await?;

    peerhost_api::setup::server::start_server(&config, app).await?;

    Ok(())
}
