use mimalloc::MiMalloc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use vitalsync::db::HealthStorage;
use vitalsync::providers::{FitbitClient, HealthPlanetClient};
use vitalsync::{Config, SyncService};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        fitbit_api = %cfg.fitbit_api_base,
        healthplanet_api = %cfg.healthplanet_api_base,
        loglevel = %cfg.loglevel,
        "starting vitalsync pass"
    );

    let storage = HealthStorage::connect(&cfg.database_url).await?;
    storage.init_schema().await?;

    let fitbit = FitbitClient::new(&cfg);
    let healthplanet = HealthPlanetClient::new(&cfg);

    let service = SyncService::new(storage, fitbit, healthplanet);
    service.run_pass().await?;

    Ok(())
}
