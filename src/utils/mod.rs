pub mod pagination;
pub mod response;
pub mod validation;

pub use pagination::Page;
pub use response::{ApiError, ApiResponse};
pub use validation::*;

use mongodb::bson::{DateTime, oid::ObjectId};

pub fn iso(dt: DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}

pub fn hex(id: &Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

pub fn bson_from_chrono(dt: chrono::DateTime<chrono::Utc>) -> DateTime {
    DateTime::from_millis(dt.timestamp_millis())
}
