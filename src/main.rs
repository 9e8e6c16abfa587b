use actix_web::{middleware::Compress, web, App, HttpResponse, HttpServer};
use actix_cors::Cors;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use utoipa_swagger_ui::SwaggerUi;

use blackbike::cache::InMemoryCache;
use blackbike::notify::ChannelNotifier;
use blackbike::openapi::ApiDoc;
use blackbike::protocol::TextProtocolRenderer;
use blackbike::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use blackbike::storage::build_photo_store;
use blackbike::{config, AppState, OrderLifecycle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

async fn metrics_endpoint(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok().body(handle.render())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker, etc.)
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping blackbike server");

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = blackbike::repo::inmem::InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        blackbike::repo::pg::PgRepo::new(pool)
    };

    let cache = Arc::new(InMemoryCache::new());
    let notifier = Arc::new(ChannelNotifier::spawn());
    let lifecycle = Arc::new(OrderLifecycle::new(Arc::new(repo), cache, notifier));

    let dashboard_ttl = Duration::from_secs(
        std::env::var("DASHBOARD_CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
    );
    let portal_url =
        std::env::var("PORTAL_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let rate_enabled = std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(true);
    let rate =
        RateLimiterFacade::new(InMemoryRateLimiter::new(rate_enabled), RateLimitConfig::from_env());

    let state = AppState {
        lifecycle,
        photo_store: build_photo_store(),
        renderer: Arc::new(TextProtocolRenderer),
        rate,
        dashboard_ttl,
        portal_url,
    };

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated, dashboard TTL {dashboard_ttl:?}");

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .route("/metrics", web::get().to(metrics_endpoint))
            .app_data(web::Data::new(prometheus.clone()))
            .app_data(web::Data::new(state.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080 (all interfaces)");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let required = vec!["JWT_SECRET"];

    let mut missing = Vec::new();
    for var in required {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {:?}", missing);
        eprintln!("Set them in the environment or a .env file");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }

    #[cfg(feature = "postgres-store")]
    if env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL must be set when the postgres-store feature is enabled");
        std::process::exit(1);
    }
}
