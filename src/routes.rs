use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::info;

use crate::{
    auth::{AuthResolver, BrokerRegistry},
    config::Config,
    error::{ApiError, AuthFailure},
    homework::{self, DayCount},
    models::*,
    portal::PortalClient,
};

pub struct AppState {
    pub config: Config,
    pub resolver: AuthResolver,
}

impl AppState {
    pub fn new(config: Config, portal: Arc<dyn PortalClient>) -> Self {
        let registry = BrokerRegistry::resolve(&config.brokers, portal.as_ref());
        let resolver = AuthResolver::new(portal, registry, config.direct_first);
        Self { config, resolver }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/homework", get(get_homework))
        .route("/test-connection", get(test_connection))
        .with_state(state)
}

async fn index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "Pronote homework API running",
        "endpoints": {
            "/homework": "GET - fetch homework",
            "/test-connection": "GET - check portal credentials",
            "/health": "GET - service status"
        },
        "ent_brokers": state.resolver.registry().len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Local::now().to_rfc3339(),
    }))
}

async fn get_homework(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HomeworkQuery>,
) -> Result<Json<AggregateResult>, ApiError> {
    let cfg = &state.config;
    let (locator, credentials) = credentials_from_query(&q, cfg)?;
    let days = DayCount::parse(q.days.as_deref(), cfg.default_days, cfg.max_days)?;

    info!(url = %locator, credentials = ?credentials, days = days.get(), "homework request");
    let (session, method) = state.resolver.resolve(&locator, &credentials).await?;
    let result = homework::aggregate(session.as_ref(), days, method).await;

    Ok(Json(result))
}

async fn test_connection(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HomeworkQuery>,
) -> Result<Json<ProbeResult>, ApiError> {
    let (locator, credentials) = credentials_from_query(&q, &state.config)?;
    let (session, method) = state.resolver.resolve(&locator, &credentials).await?;

    Ok(Json(ProbeResult {
        success: true,
        message: "Pronote connection succeeded".into(),
        student: homework::student_info(session.as_ref()),
        method_used: method,
    }))
}

// --- helpers ---

fn pick(query: &Option<String>, fallback: &Option<String>) -> String {
    query
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .or(fallback.as_deref())
        .unwrap_or_default()
        .to_string()
}

/// Decide which credential variant the request is using and fill the gaps
/// from the configured defaults.
fn credentials_from_query(q: &HomeworkQuery, cfg: &Config) -> Result<(String, CredentialBundle), AuthFailure> {
    let d = &cfg.defaults;
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

    let mode = match q.mode.as_deref().filter(|m| !m.trim().is_empty()) {
        Some(m) => AuthMode::parse(m).ok_or_else(|| AuthFailure::MissingParameters {
            missing: vec!["mode".into()],
        })?,
        None if present(&q.qr_payload) => AuthMode::QrCode,
        None if present(&q.ent) => AuthMode::Ent,
        None => cfg.auth_mode,
    };

    let locator = pick(&q.url, &d.url);
    let credentials = match mode {
        AuthMode::Direct => CredentialBundle::Direct {
            username: pick(&q.username, &d.username),
            password: pick(&q.password, &d.password),
        },
        AuthMode::Ent => CredentialBundle::Brokered {
            username: pick(&q.username, &d.username),
            password: pick(&q.password, &d.password),
            broker_id: Some(pick(&q.ent, &d.ent)).filter(|b| !b.trim().is_empty()),
        },
        AuthMode::QrCode => CredentialBundle::ScannedCode {
            payload: pick(&q.qr_payload, &None),
            confirmation_code: pick(&q.pin, &None),
        },
    };
    Ok((locator, credentials))
}
