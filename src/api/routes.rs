use crate::account::{validate_txt_value, Account};
use crate::api::api_error::APIError;
use crate::api::model::{RegisterRequest, RegisterResponse, UpdateRequest, UpdateResponse};
use crate::api::server::AppState;
use crate::auth;
use crate::config::Config;
use crate::error::Error;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use std::net::SocketAddr;
use std::str::FromStr;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use trust_dns_server::client::rr::{LowerName, Name};

/// Header carrying the account identifier on `/update`.
const API_USER_HEADER: &str = "x-api-user";
/// Header carrying the account secret on `/update`.
const API_KEY_HEADER: &str = "x-api-key";

/// Bound on identifier-collision retries at registration.
const REGISTRATION_ATTEMPTS: usize = 3;

pub(super) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/register", post(register))
        .route("/update", post(update))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RegisterResponse>, APIError> {
    if !state.config.registration_enabled {
        return Err(Error::RegistrationDisabled.into());
    }
    // An absent body means "no allow-list". A present body must parse, so that a
    // client asking for an IP restriction never silently ends up without one.
    let allowed_subnets = if body.is_empty() {
        Vec::new()
    } else {
        let payload: RegisterRequest =
            serde_json::from_slice(&body).map_err(Error::InvalidJson)?;
        payload.allowfrom
    };

    for _ in 0..REGISTRATION_ATTEMPTS {
        let (account, secret) =
            Account::generate(&state.config.domain, allowed_subnets.clone())?;
        match state.store.create(account.clone()).await {
            Ok(()) => {
                tracing::info!(subdomain = %account.subdomain, "registered account");
                let subdomain = account.label();
                let fulldomain = Name::from(&account.subdomain).to_string();
                return Ok(Json(RegisterResponse {
                    id: account.id,
                    secret,
                    subdomain,
                    fulldomain,
                    allowed_subnets: account.allowed_subnets,
                }));
            }
            // Identifier collision; mint a fresh one and try again.
            Err(Error::Conflict) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(Error::Conflict.into())
}

async fn update(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateRequest>, APIError>,
) -> Result<Json<UpdateResponse>, APIError> {
    let client_addr = client_addr.ip();
    let (Some(claimed_id), Some(secret)) = (
        header_str(&headers, API_USER_HEADER),
        header_str(&headers, API_KEY_HEADER),
    ) else {
        tracing::warn!(%client_addr, "update denied: missing credential headers");
        return Err(Error::Unauthorized.into());
    };

    let account = auth::authorize(&state.store, claimed_id, secret, client_addr).await?;

    let fqdn = request_fqdn(&state.config, &payload.subdomain)?;
    if fqdn != account.subdomain {
        tracing::warn!(
            %client_addr,
            account = %account.id,
            subdomain = %fqdn,
            "update denied: subdomain not owned by account"
        );
        return Err(Error::Unauthorized.into());
    }

    validate_txt_value(&payload.txt)?;
    let record = state.store.update(&fqdn, payload.txt.clone()).await?;
    tracing::info!(%client_addr, subdomain = %fqdn, "accepted update");
    Ok(Json(UpdateResponse {
        subdomain: payload.subdomain,
        values: record.values.into_iter().collect(),
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Resolve the request's `subdomain` field, given as a bare label or the full
/// validation name, to the fully qualified name it is served at.
fn request_fqdn(config: &Config, subdomain: &str) -> Result<LowerName, Error> {
    let name = Name::from_str(subdomain).map_err(|_| Error::InvalidSubdomain)?;
    let lower = LowerName::from(name.clone());
    if config.domain.zone_of(&lower) && lower != config.domain {
        Ok(lower)
    } else {
        config.fqdn(&name)
    }
}
