use std::net::SocketAddr;

use axum::{routing, Router};
use needblood::app::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use needblood::api::v1::{auth, blog, donation, geo, payment, user};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "needblood=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::new_from_env().await.unwrap();
    app_state.run_migration().await.unwrap();

    let app = Router::new()
        .route("/", routing::get(index))
        // identity
        .route("/users", routing::post(user::register).get(user::index))
        .route("/users/role/:email", routing::get(user::role))
        .route("/users/:email", routing::get(user::show))
        .route("/user/:email", routing::put(user::update_profile))
        .route("/status/:id", routing::patch(user::update_status))
        .route("/role/:id", routing::patch(user::update_role))
        .route("/users-count", routing::get(user::count))
        .route("/search-donors", routing::get(user::search_donors))
        // sessions
        .route("/jwt", routing::post(auth::login))
        .route("/logout", routing::get(auth::logout))
        // donation requests
        .route("/donation-request", routing::post(donation::create))
        .route(
            "/donation-request/:email",
            routing::get(donation::index_by_requester).delete(donation::delete),
        )
        .route("/donation/:id", routing::get(donation::show))
        .route("/donation-update/:id", routing::put(donation::update))
        .route("/blood-req-status/:id", routing::patch(donation::claim))
        .route("/blood-status/:id", routing::patch(donation::update_status))
        .route("/all-donation-req", routing::get(donation::index_all))
        .route("/donation-req", routing::get(donation::index_pending))
        // blogs
        .route("/add-blog", routing::post(blog::create))
        .route("/blogs", routing::get(blog::index_published))
        .route("/all-blogs", routing::get(blog::index_all))
        .route("/blog/:id", routing::get(blog::show).delete(blog::delete))
        .route("/blog-published/:id", routing::patch(blog::toggle_published))
        // reference geography
        .route("/districts", routing::get(geo::districts))
        .route("/upazilas", routing::get(geo::upazilas))
        // payments
        .route("/create-payment-intent", routing::post(payment::create_intent))
        .route(
            "/payments",
            routing::post(payment::record),
        )
        .route("/all-payments", routing::get(payment::index))
        .route("/overview/donors-requests", routing::get(payment::overview))
        .fallback(fallback)
        .with_state(app_state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(5000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::debug!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}

async fn index() -> &'static str {
    "server is running"
}

async fn fallback(uri: axum::http::Uri) -> needblood::error::Error {
    needblood::error::Error::NotFound(uri)
}
