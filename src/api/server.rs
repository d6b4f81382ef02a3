use crate::api::routes;
use crate::config::SharedConfig;
use crate::store::SharedStore;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: SharedConfig,
    pub store: SharedStore,
}

/// The API router, exposed separately from the bound server so tests can drive it
/// without a socket.
pub fn router(config: SharedConfig, store: SharedStore) -> Router {
    routes::router(AppState { config, store })
}

pub fn new(
    config: SharedConfig,
    store: SharedStore,
) -> impl Future<Output = hyper::Result<()>> {
    let bind_addr = config.api_bind_addr;
    axum::Server::bind(&bind_addr)
        .serve(router(config, store).into_make_service_with_connect_info::<SocketAddr>())
}
