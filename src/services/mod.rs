pub mod jwt;
pub mod lookup;
pub mod password;
pub mod rate_limiter;
pub mod stats;

pub use jwt::JwtService;
pub use password::PasswordService;
pub use rate_limiter::RateLimiter;
