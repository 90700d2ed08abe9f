use std::{net::SocketAddr, sync::Arc};

use nearest_station::{
    app_state::AppState, config::Config, dataset::load_stations, routes::make_router,
    tracing::setup_tracing,
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let _guard = setup_tracing();

    let config = Config::from_env().expect("invalid configuration");

    let index = load_stations(&config.data_path).expect("failed to load the station dataset");
    tracing::info!(
        stations = index.len(),
        path = ?config.data_path,
        "loaded stations"
    );
    if index.is_empty() {
        tracing::warn!("the dataset has no stations, every lookup will be a 404");
    }

    let state = Arc::new(AppState::new(index, &config));
    let maintenance = state.spawn_maintenance(config.maintenance_interval);

    let app = make_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("failed to bind");
    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    maintenance.abort();
    tracing::info!("shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
