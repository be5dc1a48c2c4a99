use mongodb::bson::{DateTime, oid::ObjectId};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::{hex, iso, validate_phone};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employer,
    Worker,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employer => "employer",
            Role::Worker => "worker",
            Role::Admin => "admin",
        }
    }
}

/// GeoJSON point, `[longitude, latitude]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub geo_type: String,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        GeoPoint {
            geo_type: "Point".to_string(),
            coordinates: [longitude, latitude],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct UserLocation {
    pub county: String,
    pub city: String,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: Role,
    pub location: UserLocation,
    pub profile_image: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct LocationDto {
    #[validate(length(min = 1, message = "county is required"))]
    pub county: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

impl From<&LocationDto> for UserLocation {
    fn from(dto: &LocationDto) -> Self {
        UserLocation {
            county: dto.county.trim().to_string(),
            city: dto.city.trim().to_string(),
            coordinates: match (dto.longitude, dto.latitude) {
                (Some(lng), Some(lat)) => Some(GeoPoint::new(lng, lat)),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct RegisterDto {
    #[validate(length(min = 2, max = 50))]
    pub first_name: String,
    #[validate(length(min = 2, max = 50))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
    pub role: Role,
    #[validate]
    pub location: LocationDto,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct LoginDto {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateProfileDto {
    #[validate(length(min = 2, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 2, max = 50))]
    pub last_name: Option<String>,
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
    #[validate]
    pub location: Option<LocationDto>,
    #[validate(url)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct ChangePasswordDto {
    #[validate(length(min = 1, message = "current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateUserStatusDto {
    pub is_active: bool,
}

/// Everything about a user except the password hash.
#[derive(Debug, Serialize, JsonSchema)]
pub struct UserResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub location: UserLocation,
    pub profile_image: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: hex(&user.id),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            role: user.role,
            location: user.location,
            profile_image: user.profile_image,
            is_verified: user.is_verified,
            is_active: user.is_active,
            last_login_at: user.last_login_at.map(iso),
            created_at: iso(user.created_at),
        }
    }
}

/// The subset of a user attached to bookings, messages and reviews.
#[derive(Debug, Serialize, Clone, JsonSchema)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub profile_image: Option<String>,
    pub city: String,
    pub county: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: hex(&user.id),
            name: user.full_name(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            profile_image: user.profile_image.clone(),
            city: user.location.city.clone(),
            county: user.location.county.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(phone: &str, password: &str) -> RegisterDto {
        RegisterDto {
            first_name: "Jane".into(),
            last_name: "Wanjiku".into(),
            email: "jane@example.com".into(),
            phone: phone.into(),
            password: password.into(),
            role: Role::Worker,
            location: LocationDto {
                county: "Nairobi".into(),
                city: "Kilimani".into(),
                latitude: Some(-1.29),
                longitude: Some(36.81),
            },
        }
    }

    #[test]
    fn registration_accepts_valid_payload() {
        assert!(register("+254712345678", "secret1").validate().is_ok());
    }

    #[test]
    fn registration_rejects_bad_phone_and_short_password() {
        let errors = register("12345", "abc").validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("phone"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::Employer).unwrap(), "employer");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn location_needs_both_coordinates() {
        let dto = LocationDto {
            county: " Mombasa ".into(),
            city: "Nyali".into(),
            latitude: Some(-4.04),
            longitude: None,
        };
        let location = UserLocation::from(&dto);
        assert_eq!(location.county, "Mombasa");
        assert!(location.coordinates.is_none());
    }
}
