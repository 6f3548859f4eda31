use actix_web::{middleware::Compress, web, App, HttpServer};
use actix_cors::Cors;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use kudos::config::Config;
use kudos::openapi::ApiDoc;
use kudos::routes::{config as api_routes, AppState};
use kudos::security::SecurityHeaders;

use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

// Dev fallback when CORS_ORIGIN is not configured.
const DEV_ORIGINS: &[&str] = &[
    "http://localhost:5501",
    "http://127.0.0.1:5500",
    "http://localhost:3001",
];

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables come from the deployment (shell, systemd,
    // Docker); load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // Admin credentials and the signing secret are mandatory; there are no
    // built-in defaults to fall back to.
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("bootstrapping kudos server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = {
        info!("using in-memory repository backend");
        kudos::repo::inmem::InMemRepo::new()
    };

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url = match std::env::var("DATABASE_URL") {
            Ok(v) => v,
            Err(_) => {
                eprintln!("DATABASE_URL must be set for the postgres backend");
                std::process::exit(1);
            }
        };
        let pool = match PgPoolOptions::new().max_connections(5).connect_lazy(&db_url) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("invalid DATABASE_URL: {e}");
                std::process::exit(1);
            }
        };
        info!("using Postgres repository backend");
        kudos::repo::pg::PgRepo::new(pool)
    };

    // The service stays up when the database is unreachable; /api/health
    // reports the connectivity state.
    #[cfg(feature = "postgres-store")]
    if let Err(e) = repo.ensure_schema().await {
        warn!(error = %e, "could not prepare the messages table; storage operations will fail until the database is reachable");
    }

    use kudos::repo::MessageRepo;
    let db_ok = repo.ping().await;
    info!(
        port = config.port,
        environment = %config.environment,
        database = if db_ok { "connected" } else { "disconnected" },
        admin = %config.admin_email,
        "startup complete"
    );

    let openapi = ApiDoc::openapi();
    let port = config.port;

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .max_age(3600);
            if config.cors_origins.is_empty() {
                for origin in DEV_ORIGINS {
                    c = c.allowed_origin(origin);
                }
            } else {
                for origin in &config.cors_origins {
                    c = c.allowed_origin(origin);
                }
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(api_routes)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
            .app_data(web::Data::new(AppState {
                repo: Arc::new(repo.clone()),
                config: config.clone(),
            }))
    })
    .bind(("0.0.0.0", port))?;

    info!("listening on http://0.0.0.0:{port}");

    server.run().await
}
