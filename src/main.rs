use axum::http::{HeaderValue, Method, header};
use mentorlink::{AppState, chat::RoomRegistry, db};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mentorlink=info")),
        )
        .init();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:mentorlink.db?mode=rwc".to_owned());
    let db_pool = db::connect(&database_url).await?;
    db::init(&db_pool).await?;
    tracing::info!(%database_url, "database ready");

    let app_state = AppState {
        db_pool,
        rooms: RoomRegistry::new(),
    };

    let cors_origin =
        dotenv::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_owned());
    let cors = CorsLayer::new()
        .allow_origin(cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = mentorlink::app(app_state).layer(cors);

    let port: u16 = dotenv::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(9000);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "server running");
    axum::serve(listener, app).await?;
    Ok(())
}
