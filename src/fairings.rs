use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::uri::Origin;
use rocket::http::{Header, Method};
use rocket::{Data, Request, Response};

use crate::config::Config;
use crate::services::RateLimiter;
use crate::utils::ApiError;

const RATE_LIMITED_PATH: &str = "/api/rate-limited";

/* ----------------------------- CORS ----------------------------- */

pub struct Cors {
    allowed_origins: Vec<String>,
}

impl Cors {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Cors { allowed_origins }
    }

    pub fn from_config() -> Self {
        Self::new(Config::allowed_origins())
    }

    fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let Some(origin) = request.headers().get_one("Origin") else {
            return;
        };
        if !self.allows(origin) {
            return;
        }

        response.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        response.set_header(Header::new("Vary", "Origin"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));
        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- SECURITY HEADERS ----------------------------- */

pub struct SecurityHeaders {
    hsts: bool,
}

impl SecurityHeaders {
    pub fn new(hsts: bool) -> Self {
        SecurityHeaders { hsts }
    }

    pub fn from_config() -> Self {
        Self::new(!Config::is_development())
    }
}

#[rocket::async_trait]
impl Fairing for SecurityHeaders {
    fn info(&self) -> Info {
        Info {
            name: "Security headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("X-Content-Type-Options", "nosniff"));
        response.set_header(Header::new("X-Frame-Options", "DENY"));
        response.set_header(Header::new("Referrer-Policy", "no-referrer"));
        response.set_header(Header::new("X-XSS-Protection", "0"));
        if self.hsts {
            response.set_header(Header::new(
                "Strict-Transport-Security",
                "max-age=15552000; includeSubDomains",
            ));
        }
    }
}

/* ----------------------------- RATE LIMIT ----------------------------- */

/// Counts `/api` requests per client IP and reroutes the excess to a 429 route.
pub struct RateLimit {
    limiter: RateLimiter,
}

impl RateLimit {
    pub fn new(limiter: RateLimiter) -> Self {
        RateLimit { limiter }
    }

    pub fn from_config() -> Self {
        Self::new(RateLimiter::from_config())
    }
}

#[rocket::async_trait]
impl Fairing for RateLimit {
    fn info(&self) -> Info {
        Info {
            name: "Rate limit",
            kind: Kind::Request,
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        if req.method() == Method::Options || !req.uri().path().starts_with("/api") {
            return;
        }
        let Some(client) = req.client_ip() else {
            return;
        };

        if self.limiter.check(client, chrono::Utc::now().timestamp_millis()) {
            return;
        }

        log::warn!("Rate limit exceeded for {} on {}", client, req.uri());
        if let Ok(uri) = Origin::parse(RATE_LIMITED_PATH) {
            req.set_method(Method::Get);
            req.set_uri(uri);
        }
    }
}

#[get("/rate-limited")]
pub fn rate_limited() -> ApiError {
    ApiError::too_many_requests("Too many requests from this IP, please try again later.")
}

/* ----------------------------- PREFLIGHT ----------------------------- */

#[options("/<_..>")]
pub fn options_handler() {}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;
    use std::net::SocketAddr;

    #[get("/api/ping")]
    fn ping() -> &'static str {
        "pong"
    }

    #[get("/outside")]
    fn outside() -> &'static str {
        "free"
    }

    async fn client(max_requests: u32) -> Client {
        let rocket = rocket::build()
            .attach(Cors::new(vec!["http://localhost:5173".to_string()]))
            .attach(SecurityHeaders::new(true))
            .attach(RateLimit::new(RateLimiter::new(max_requests, 60_000)))
            .mount("/", routes![ping, outside, options_handler])
            .mount("/api", routes![rate_limited]);
        Client::tracked(rocket).await.unwrap()
    }

    fn remote() -> SocketAddr {
        "10.0.0.7:41000".parse().unwrap()
    }

    #[rocket::async_test]
    async fn allowed_origin_is_reflected() {
        let client = client(10).await;
        let res = client
            .get("/api/ping")
            .header(Header::new("Origin", "http://localhost:5173"))
            .dispatch()
            .await;

        assert_eq!(
            res.headers().get_one("Access-Control-Allow-Origin"),
            Some("http://localhost:5173")
        );
        assert_eq!(res.headers().get_one("Access-Control-Allow-Credentials"), Some("true"));
    }

    #[rocket::async_test]
    async fn foreign_origin_gets_no_cors_headers() {
        let client = client(10).await;
        let res = client
            .get("/api/ping")
            .header(Header::new("Origin", "https://evil.example"))
            .dispatch()
            .await;

        assert_eq!(res.status(), Status::Ok);
        assert!(res.headers().get_one("Access-Control-Allow-Origin").is_none());
    }

    #[rocket::async_test]
    async fn preflight_is_answered() {
        let client = client(10).await;
        let res = client
            .options("/api/anything/at/all")
            .header(Header::new("Origin", "http://localhost:5173"))
            .dispatch()
            .await;

        assert_eq!(res.status(), Status::Ok);
        assert!(res.headers().get_one("Access-Control-Allow-Methods").is_some());
    }

    #[rocket::async_test]
    async fn security_headers_are_always_set() {
        let client = client(10).await;
        let res = client.get("/outside").dispatch().await;

        assert_eq!(res.headers().get_one("X-Content-Type-Options"), Some("nosniff"));
        assert_eq!(res.headers().get_one("X-Frame-Options"), Some("DENY"));
        assert!(res.headers().get_one("Strict-Transport-Security").is_some());
    }

    #[rocket::async_test]
    async fn excess_api_requests_get_429() {
        let client = client(2).await;

        for _ in 0..2 {
            let res = client.get("/api/ping").remote(remote()).dispatch().await;
            assert_eq!(res.status(), Status::Ok);
        }

        let res = client.get("/api/ping").remote(remote()).dispatch().await;
        assert_eq!(res.status(), Status::TooManyRequests);
        let body = res.into_string().await.unwrap();
        assert!(body.contains("Too many requests from this IP"));

        // Paths outside /api are not counted
        let res = client.get("/outside").remote(remote()).dispatch().await;
        assert_eq!(res.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn limits_are_per_client() {
        let client = client(1).await;
        let other: SocketAddr = "10.0.0.8:41000".parse().unwrap();

        let res = client.get("/api/ping").remote(remote()).dispatch().await;
        assert_eq!(res.status(), Status::Ok);
        let res = client.get("/api/ping").remote(other).dispatch().await;
        assert_eq!(res.status(), Status::Ok);
        let res = client.get("/api/ping").remote(remote()).dispatch().await;
        assert_eq!(res.status(), Status::TooManyRequests);
    }
}
