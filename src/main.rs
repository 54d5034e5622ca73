use tracing::{error, info};

use folderkeep::{Config, Store};

#[tokio::main]
async fn main() {
    // Load configuration
    let mut config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = folderkeep::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        folderkeep::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    info!("folderkeep - hierarchical password-protected file store");

    let store = match Store::from_config(&config) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open store");
            std::process::exit(1);
        }
    };

    match store.ensure_root().await {
        Ok(true) => info!(root = %store.root().display(), "provisioned public root folder"),
        Ok(false) => info!(root = %store.root().display(), "using existing root folder"),
        Err(e) => {
            error!(error = %e, root = %store.root().display(), "failed to provision root folder");
            std::process::exit(1);
        }
    }

    info!(
        cache = config.cache.enabled,
        cache_ttl_secs = config.cache.ttl_secs,
        thumbnail_width = config.thumbnails.max_width,
        thumbnail_retry_secs = config.thumbnails.retry_after_secs,
        min_write_score = config.passwords.min_write_score,
        "store ready"
    );
}
