use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;

mod checker;
mod config;
mod error;
mod layout;
mod lifecycle;
mod mission;
mod routes;
mod status;
mod store;
mod util;
mod watcher;

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for shutdown signal: {}", error);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .unwrap();

    let Ok(config_path) = config::Config::get_path() else {
        error!("Could not determine configuration path");
        return;
    };
    let config = match config::Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(error) => {
            error!("Could not load configuration: {}", error);
            return;
        }
    };
    let root = match config.root() {
        Ok(root) => root,
        Err(error) => {
            error!("Could not determine data root: {}", error);
            return;
        }
    };

    let layout = layout::Layout::new(&root);
    if let Err(error) = layout.create_dirs() {
        error!("Could not create data directories under {}: {}", root.display(), error);
        return;
    }
    let store = store::Store::load(layout);

    // Reload students, missions and checkers when their files change.
    let watcher = match watcher::Watcher::start(store.clone()) {
        Ok(watcher) => Some(watcher),
        Err(error) => {
            warn!("Can't monitor {} for changes: {}", root.display(), error);
            None
        }
    };

    let app = routes::router(store);
    let listener = match tokio::net::TcpListener::bind(&config.listen).await {
        Ok(listener) => listener,
        Err(error) => {
            error!("Could not listen on {}: {}", config.listen, error);
            return;
        }
    };
    info!("Launching server on {}", config.listen);
    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", error);
    }
    drop(watcher);
}
