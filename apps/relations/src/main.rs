mod config;
pub mod core;
mod docs;
mod features;

use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

use config::{Config, ModelsFile, StoreKind};
use features::attachable::controller::ResourceController;
use features::models::memory::MemoryRelationStore;
use features::models::repo::{PgRelationStore, RelationStore};
use features::models::schema::ModelRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: ModelRegistry,
    pub store: Arc<dyn RelationStore>,
    pub per_page: u64,
}

impl AppState {
    pub fn controller(&self, resource: &str) -> Option<ResourceController> {
        let model = self.registry.get(resource)?;
        Some(ResourceController::new(
            model,
            Arc::clone(&self.store),
            self.per_page,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let models = ModelsFile::load(&config.models_path).await?;
    let registry = ModelRegistry::from_config(&models.models)?;

    let store: Arc<dyn RelationStore> = match config.store {
        StoreKind::Memory => Arc::new(MemoryRelationStore::seeded(&models.seed)),
        StoreKind::Postgres => {
            if !models.seed.rows.is_empty() || !models.seed.pivots.is_empty() {
                warn!("seed data is only loaded into the memory store; ignoring it");
            }
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            let db = PgPool::connect(url).await?;
            Arc::new(PgRelationStore::new(db))
        }
    };
    info!(
        models = registry.iter().count(),
        store = ?config.store,
        per_page = config.per_page,
        "model registry loaded"
    );

    let state = AppState {
        registry,
        store,
        per_page: config.per_page,
    };

    let openapi = docs::ApiDoc::openapi();
    if config.write_openapi {
        docs::write_openapi_yaml(&openapi).await?;
    }

    let app = features::router(state)
        .merge(docs::router(openapi))
        .layer(CorsLayer::permissive());
    info!(bind = %config.bind, "relations listening");
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
