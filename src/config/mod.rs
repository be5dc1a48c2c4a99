use rocket::Config as RocketConfig;
use rocket::figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;

const DEV_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];
const PROD_ORIGINS: [&str; 1] = ["https://safehire-kenya.com"];

pub struct Config;

impl Config {
    pub fn profile() -> String {
        env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string())
    }

    pub fn figment() -> Figment {
        Figment::from(RocketConfig::default())
            .merge(Serialized::defaults(Defaults::default()))
            .merge(Toml::file("Rocket.toml").nested())
            .select(Self::profile())
            .merge(Env::prefixed("ROCKET_").ignore(&["PROFILE"]).global())
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret".to_string())
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment().extract_inner("jwt_expiry").unwrap_or(604800)
    }

    pub fn bcrypt_cost() -> u32 {
        Self::figment()
            .extract_inner("bcrypt_cost")
            .unwrap_or(bcrypt::DEFAULT_COST)
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn database_name() -> String {
        Self::figment()
            .extract_inner("database_name")
            .unwrap_or_else(|_| "safehire-kenya".to_string())
    }

    pub fn rate_limit_window_ms() -> i64 {
        Self::figment()
            .extract_inner("rate_limit_window_ms")
            .unwrap_or(15 * 60 * 1000)
    }

    pub fn rate_limit_max_requests() -> u32 {
        Self::figment()
            .extract_inner("rate_limit_max_requests")
            .unwrap_or(100)
    }

    pub fn allowed_origins() -> Vec<String> {
        Self::figment()
            .extract_inner("allowed_origins")
            .unwrap_or_else(|_| {
                let defaults: &[&str] = if Self::is_development() {
                    &DEV_ORIGINS
                } else {
                    &PROD_ORIGINS
                };
                defaults.iter().map(|o| o.to_string()).collect()
            })
    }

    pub fn is_development() -> bool {
        Self::profile() == "development"
    }
}

/// Values used when neither Rocket.toml nor the environment set a key.
#[derive(serde::Serialize)]
struct Defaults {
    mongodb_uri: &'static str,
    database_name: &'static str,
    jwt_expiry: i64,
    rate_limit_window_ms: i64,
    rate_limit_max_requests: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            mongodb_uri: "mongodb://localhost:27017",
            database_name: "safehire-kenya",
            jwt_expiry: 604800,
            rate_limit_window_ms: 15 * 60 * 1000,
            rate_limit_max_requests: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_extractable_without_rocket_toml() {
        let figment = Figment::from(Serialized::defaults(Defaults::default()));
        let window: i64 = figment.extract_inner("rate_limit_window_ms").unwrap();
        let max: u32 = figment.extract_inner("rate_limit_max_requests").unwrap();
        let db: String = figment.extract_inner("database_name").unwrap();

        assert_eq!(window, 900_000);
        assert_eq!(max, 100);
        assert_eq!(db, "safehire-kenya");
    }

    #[test]
    fn profile_keys_override_defaults() {
        let figment = Figment::from(Serialized::defaults(Defaults::default()))
            .merge(Serialized::default("rate_limit_max_requests", 5));
        let max: u32 = figment.extract_inner("rate_limit_max_requests").unwrap();
        assert_eq!(max, 5);
    }
}
