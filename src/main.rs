#[macro_use]
extern crate rocket;

mod config;
mod db;
mod fairings;
mod guards;
mod models;
mod routes;
mod services;
mod utils;

use dotenvy::dotenv;
use rocket::http::Status;
use rocket::serde::json::{Value, json};
use rocket::{Build, Request, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

use crate::config::Config;
use crate::fairings::{Cors, RateLimit, SecurityHeaders};

/* ----------------------------- ERRORS ----------------------------- */

fn error_body(message: &str) -> Value {
    json!({
        "success": false,
        "message": message,
    })
}

#[catch(400)]
fn bad_request() -> Value {
    error_body("Bad request")
}

#[catch(401)]
fn unauthorized() -> Value {
    error_body("Access denied. Invalid or missing token.")
}

#[catch(403)]
fn forbidden() -> Value {
    error_body("Access denied. Insufficient permissions.")
}

#[catch(404)]
fn not_found(req: &Request) -> Value {
    error_body(&format!("Route {} not found", req.uri().path()))
}

#[catch(422)]
fn unprocessable() -> Value {
    error_body("Invalid request body")
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> Value {
    if status.code >= 500 {
        error_body("Internal server error")
    } else {
        error_body(status.reason().unwrap_or("Request failed"))
    }
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- LAUNCH ----------------------------- */

/// Everything except the database connection.
fn app(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(Cors::from_config())
        .attach(SecurityHeaders::from_config())
        .attach(RateLimit::from_config())
        .mount("/", routes![fairings::options_handler, routes::health::health])
        .mount("/api", routes![fairings::rate_limited])
        .mount(
            "/api",
            openapi_get_routes![
                routes::health::api_test,
                // Auth
                routes::auth::register,
                routes::auth::login,
                routes::auth::get_profile,
                routes::auth::update_profile,
                routes::auth::change_password,
                // Users (admin)
                routes::user::list_users,
                routes::user::update_user_status,
                // Workers
                routes::worker::create_worker_profile,
                routes::worker::get_my_profile,
                routes::worker::update_worker_profile,
                routes::worker::update_availability,
                routes::worker::search_workers,
                routes::worker::get_worker_by_id,
                routes::worker::get_all_workers,
                routes::worker::verify_worker,
                // Bookings
                routes::booking::create_booking,
                routes::booking::get_my_bookings,
                routes::booking::get_booking_by_id,
                routes::booking::update_booking_status,
                routes::booking::cancel_booking,
                routes::booking::get_all_bookings,
                // Categories
                routes::category::get_all_categories,
                routes::category::get_category_by_id,
                routes::category::create_category,
                routes::category::update_category,
                routes::category::delete_category,
                // Reviews
                routes::review::create_review,
                routes::review::get_worker_reviews,
                // Messages
                routes::message::send_message,
                routes::message::get_conversations,
                routes::message::get_conversation,
                routes::message::mark_as_read,
                routes::message::get_unread_count,
                // Admin
                routes::admin::get_dashboard,
                routes::admin::get_analytics,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![bad_request, unauthorized, forbidden, not_found, unprocessable, default_catcher],
        )
}

fn rocket() -> Rocket<Build> {
    app(rocket::custom(Config::figment())).attach(db::init())
}

async fn seed() -> Result<(), String> {
    let database = db::connect().await.map_err(|e| format!("MongoDB connection failed: {}", e))?;
    db::seed::run(&database).await.map_err(|e| e.message)
}

#[rocket::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    if std::env::args().nth(1).as_deref() == Some("seed") {
        if let Err(e) = seed().await {
            log::error!("Seeding failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    log::info!("SafeHire Kenya API starting ({} profile)", Config::profile());
    log::info!("Swagger UI at /api/docs");

    if let Err(e) = rocket().launch().await {
        log::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Header;
    use rocket::local::asynchronous::Client;

    /// The driver connects lazily, so guards can be exercised without a server.
    async fn client() -> Client {
        let database = mongodb::Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap()
            .database("safehire-test");
        Client::tracked(app(rocket::custom(Config::figment())).manage(database))
            .await
            .unwrap()
    }

    #[rocket::async_test]
    async fn health_reports_environment() {
        let client = client().await;
        let res = client.get("/health").dispatch().await;
        assert_eq!(res.status(), Status::Ok);

        let body: serde_json::Value = res.into_json().await.unwrap();
        assert_eq!(body["status"], "success");
        assert!(body["environment"].is_string());
    }

    #[rocket::async_test]
    async fn api_test_route_is_mounted() {
        let client = client().await;
        let res = client.get("/api/test").dispatch().await;
        assert_eq!(res.status(), Status::Ok);

        let body: serde_json::Value = res.into_json().await.unwrap();
        assert_eq!(body["message"], "API is working");
        assert_eq!(body["data"]["test"], true);
    }

    #[rocket::async_test]
    async fn unknown_route_uses_error_envelope() {
        let client = client().await;
        let res = client.get("/api/nope").dispatch().await;
        assert_eq!(res.status(), Status::NotFound);

        let body: serde_json::Value = res.into_json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Route /api/nope not found");
    }

    #[rocket::async_test]
    async fn protected_route_without_token_is_401() {
        let client = client().await;
        let res = client.get("/api/auth/profile").dispatch().await;
        assert_eq!(res.status(), Status::Unauthorized);

        let body: serde_json::Value = res.into_json().await.unwrap();
        assert_eq!(body["success"], false);
    }

    #[rocket::async_test]
    async fn admin_route_rejects_unverifiable_token() {
        let client = client().await;
        let res = client
            .get("/api/admin/dashboard")
            .header(Header::new("Authorization", "Bearer not.a.jwt"))
            .dispatch()
            .await;
        assert_eq!(res.status(), Status::Unauthorized);

        let body: serde_json::Value = res.into_json().await.unwrap();
        assert_eq!(body["message"], "Access denied. Invalid or missing token.");
    }

    #[rocket::async_test]
    async fn openapi_document_is_served() {
        let client = client().await;
        let res = client.get("/api/openapi.json").dispatch().await;
        assert_eq!(res.status(), Status::Ok);

        let body: serde_json::Value = res.into_json().await.unwrap();
        assert!(body["paths"]["/bookings/{booking_id}/status"].is_object());
    }
}
