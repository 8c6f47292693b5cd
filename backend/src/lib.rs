use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use wheel_core::{random_wish, Catalog, DrawOutcome, DrawRecord, Prize, PrizeId, PrizeUpdate};

pub mod config;
pub mod error;
pub mod store;

use config::{AppConfig, DEFAULT_ADMIN_KEY};
use error::ApiError;
use store::Store;

/// Shared handle to the draw service. The catalog and the store sit behind
/// one lock so every load-mutate-save cycle runs alone.
#[derive(Clone)]
pub struct AppState {
    service: Arc<Mutex<DrawService>>,
    admin_key: Arc<str>,
}

struct DrawService {
    catalog: Catalog,
    store: Store,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Catalog::builtin(), Store::memory(), DEFAULT_ADMIN_KEY)
    }
}

impl AppState {
    pub fn new(catalog: Catalog, store: Store, admin_key: impl Into<Arc<str>>) -> Self {
        Self {
            service: Arc::new(Mutex::new(DrawService { catalog, store })),
            admin_key: admin_key.into(),
        }
    }

    pub fn from_config(config: &AppConfig, catalog: Catalog) -> Self {
        Self::new(
            catalog,
            Store::file(&config.data_file),
            config.admin_key.as_str(),
        )
    }

    fn authorize(&self, params: &AdminParams) -> Result<(), ApiError> {
        match params.key.as_deref() {
            Some(key) if key == &*self.admin_key => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/prizes", get(list_prizes))
        .route("/api/draws", get(list_draws))
        .route("/api/draw", post(draw))
        .route("/api/admin/draws", get(admin_draws))
        .route("/api/admin/config", get(admin_config).post(update_config))
        .route("/api/admin/reset", post(admin_reset))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrizeView {
    id: PrizeId,
    name: String,
    color: String,
    tier: u32,
    tier_name: String,
    visual_weight: f64,
}

async fn list_prizes(State(state): State<AppState>) -> Json<Vec<PrizeView>> {
    let service = state.service.lock().await;
    Json(
        service
            .catalog
            .prizes()
            .iter()
            .map(|p| PrizeView {
                id: p.id,
                name: p.name.clone(),
                color: p.color.clone(),
                tier: p.tier,
                tier_name: p.tier_name.clone(),
                visual_weight: p.visual_weight,
            })
            .collect(),
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DrawView {
    nickname: String,
    tier_name: String,
    prize_name: String,
    time: String,
}

async fn list_draws(State(state): State<AppState>) -> Result<Json<Vec<DrawView>>, ApiError> {
    let service = state.service.lock().await;
    let ledger = service.store.load(&service.catalog).await?;
    Ok(Json(
        ledger
            .draws
            .into_iter()
            .map(|d| DrawView {
                nickname: d.nickname,
                tier_name: d.tier_name,
                prize_name: d.prize_name,
                time: d.time,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
struct DrawRequest {
    nickname: Option<String>,
}

/// The prize as shown to the winner, with their redemption code.
#[derive(Serialize)]
struct AwardedPrize {
    #[serde(flatten)]
    prize: Prize,
    code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DrawResponse {
    prize: AwardedPrize,
    tier_name: String,
    tier: u32,
    message: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RepeatResponse {
    already: bool,
    prize: AwardedPrize,
    tier_name: String,
}

async fn draw(
    State(state): State<AppState>,
    payload: Result<Json<DrawRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let nickname = payload
        .ok()
        .and_then(|Json(req)| req.nickname)
        .unwrap_or_default();

    let mut guard = state.service.lock().await;
    let service = &mut *guard;
    let mut ledger = service.store.load(&service.catalog).await?;

    let mut rng = ChaCha8Rng::from_entropy();
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    match ledger.draw(&nickname, now, &mut rng)? {
        DrawOutcome::Repeat { record } => {
            debug!(nickname = %record.nickname, prize_id = record.prize_id, "repeat draw");
            let prize = service
                .catalog
                .get(record.prize_id)
                .cloned()
                .unwrap_or_else(|| snapshot_prize(&record));
            Ok(Json(RepeatResponse {
                already: true,
                tier_name: record.tier_name.clone(),
                prize: AwardedPrize {
                    prize,
                    code: record.code,
                },
            })
            .into_response())
        }
        DrawOutcome::Won { prize, record } => {
            service.store.save(&ledger).await?;
            info!(
                nickname = %record.nickname,
                prize_id = prize.id,
                remaining = ledger.remaining.len(),
                "prize drawn"
            );
            Ok(Json(DrawResponse {
                tier_name: prize.tier_name.clone(),
                tier: prize.tier,
                message: random_wish(&mut rng),
                prize: AwardedPrize {
                    prize,
                    code: record.code,
                },
            })
            .into_response())
        }
    }
}

/// Rebuilds a prize from a draw record when the catalog no longer has it.
fn snapshot_prize(record: &DrawRecord) -> Prize {
    Prize {
        id: record.prize_id,
        name: record.prize_name.clone(),
        desc: String::new(),
        tier: record.tier,
        tier_name: record.tier_name.clone(),
        color: String::new(),
        visual_weight: 1.0,
        prob: 0.0,
        count: 1,
    }
}

#[derive(Deserialize)]
struct AdminParams {
    key: Option<String>,
}

async fn admin_draws(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
) -> Result<Response, ApiError> {
    state.authorize(&params)?;
    let service = state.service.lock().await;
    let ledger = service.store.load(&service.catalog).await?;
    Ok(Json(ledger).into_response())
}

#[derive(Serialize)]
struct CatalogEntry {
    #[serde(flatten)]
    prize: Prize,
    drawn: bool,
}

async fn admin_config(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
) -> Result<Json<Vec<CatalogEntry>>, ApiError> {
    state.authorize(&params)?;
    let service = state.service.lock().await;
    let ledger = service.store.load(&service.catalog).await?;
    Ok(Json(
        service
            .catalog
            .prizes()
            .iter()
            .map(|p| CatalogEntry {
                prize: p.clone(),
                drawn: ledger.is_drawn(p.id),
            })
            .collect(),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WeightView {
    id: PrizeId,
    prob: f64,
    visual_weight: f64,
}

async fn update_config(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    state.authorize(&params)?;
    let Ok(Json(Value::Array(items))) = payload else {
        return Err(ApiError::Validation("expected a list of prize updates".into()));
    };
    let updates: Vec<PrizeUpdate> = items.iter().filter_map(PrizeUpdate::from_json).collect();

    let mut guard = state.service.lock().await;
    let service = &mut *guard;

    // the live catalog only changes once the synced pool is on disk
    let mut catalog = service.catalog.clone();
    let applied = catalog.apply_updates(updates);
    let mut ledger = service.store.load(&catalog).await?;
    ledger.apply_updates(&applied);
    service.store.save(&ledger).await?;
    service.catalog = catalog;
    info!(updated = applied.len(), "catalog edited");

    let prizes: Vec<WeightView> = service
        .catalog
        .prizes()
        .iter()
        .map(|p| WeightView {
            id: p.id,
            prob: p.prob,
            visual_weight: p.visual_weight,
        })
        .collect();
    Ok(Json(json!({ "ok": true, "prizes": prizes })).into_response())
}

async fn admin_reset(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
) -> Result<Response, ApiError> {
    state.authorize(&params)?;
    state.service.lock().await.store.reset().await?;
    info!("draws reset");
    Ok(Json(json!({ "ok": true })).into_response())
}
