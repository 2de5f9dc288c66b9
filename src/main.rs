use log::{info, warn};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use visitor_hub::app::{self, AppState};
use visitor_hub::config::{Config, StoreBackend, StoreConfig};
use visitor_hub::lookup::HttpLookup;
use visitor_hub::remote::RemoteStore;
use visitor_hub::settings::SettingsStore;
use visitor_hub::store::{FileStore, RecordStore};

fn config_path() -> Option<PathBuf> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn open_store(
    config: &StoreConfig,
    timeout: Duration,
) -> Result<Arc<dyn RecordStore>, Box<dyn std::error::Error>> {
    match (config.backend, &config.remote_url) {
        (StoreBackend::Remote, Some(url)) => {
            info!("Using remote record store at {url}");
            let key = config.remote_key.clone().unwrap_or_default();
            if key.is_empty() {
                warn!("No remote_key configured, requests will be anonymous");
            }
            Ok(Arc::new(RemoteStore::new(
                url.as_str(),
                key,
                config.table.as_str(),
                config.cells_table.as_str(),
                timeout,
            )?))
        }
        (StoreBackend::Remote, None) => {
            Err("store.backend is \"remote\" but store.remote_url is not set".into())
        }
        (StoreBackend::File, _) => {
            info!("Using file record store in {}", config.data_dir.display());
            Ok(Arc::new(FileStore::open(&config.data_dir)?))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path().as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    let timeout = Duration::from_secs(config.lookup.timeout_secs);
    let store = open_store(&config.store, timeout)?;
    let settings = SettingsStore::open(&config.store.data_dir)?;
    let lookup = Arc::new(HttpLookup::new(&config.lookup)?);

    let state = Arc::new(AppState::new(store, lookup, settings, config));
    app::run(state).await?;

    Ok(())
}
