use mongodb::bson::{DateTime, oid::ObjectId};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::UserSummary;
use crate::utils::{hex, iso, validate_object_id};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAspect {
    Punctuality,
    Quality,
    Communication,
    Professionalism,
    Value,
}

/// An employer's review of a worker; at most one per booking.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub booking_id: ObjectId,
    pub worker_id: ObjectId,
    pub employer_id: ObjectId,
    pub rating: i32,
    pub comment: String,
    pub aspects: Vec<ReviewAspect>,
    pub is_anonymous: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateReviewDto {
    #[validate(custom = "validate_object_id")]
    pub booking_id: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(min = 1, max = 500, message = "Review cannot exceed 500 characters"))]
    pub comment: String,
    #[serde(default)]
    pub aspects: Vec<ReviewAspect>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ReviewResponse {
    pub id: String,
    pub booking_id: String,
    pub worker_id: String,
    pub rating: i32,
    pub comment: String,
    pub aspects: Vec<ReviewAspect>,
    pub is_anonymous: bool,
    pub reviewer: Option<UserSummary>,
    pub created_at: String,
}

impl ReviewResponse {
    /// Drops the reviewer when the review was left anonymously.
    pub fn new(review: Review, reviewer: Option<UserSummary>) -> Self {
        ReviewResponse {
            id: hex(&review.id),
            booking_id: review.booking_id.to_hex(),
            worker_id: review.worker_id.to_hex(),
            rating: review.rating,
            comment: review.comment,
            aspects: review.aspects,
            reviewer: if review.is_anonymous { None } else { reviewer },
            is_anonymous: review.is_anonymous,
            created_at: iso(review.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(anonymous: bool) -> Review {
        Review {
            id: Some(ObjectId::new()),
            booking_id: ObjectId::new(),
            worker_id: ObjectId::new(),
            employer_id: ObjectId::new(),
            rating: 5,
            comment: "Arrived early and did a clean job".into(),
            aspects: vec![ReviewAspect::Punctuality, ReviewAspect::Quality],
            is_anonymous: anonymous,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    fn reviewer() -> UserSummary {
        UserSummary {
            id: ObjectId::new().to_hex(),
            name: "John Doe".into(),
            email: "john.doe@example.com".into(),
            phone: "+254700123456".into(),
            profile_image: None,
            city: "Westlands".into(),
            county: "Nairobi".into(),
        }
    }

    #[test]
    fn anonymous_reviews_hide_the_reviewer() {
        assert!(ReviewResponse::new(review(true), Some(reviewer())).reviewer.is_none());
        assert!(ReviewResponse::new(review(false), Some(reviewer())).reviewer.is_some());
    }

    #[test]
    fn rating_must_be_one_to_five() {
        let dto = CreateReviewDto {
            booking_id: ObjectId::new().to_hex(),
            rating: 6,
            comment: "ok".into(),
            aspects: vec![],
            is_anonymous: false,
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn unknown_aspects_are_rejected() {
        let parsed: Result<CreateReviewDto, _> = serde_json::from_str(
            r#"{"booking_id":"507f1f77bcf86cd799439011","rating":4,"comment":"good","aspects":["speed"]}"#,
        );
        assert!(parsed.is_err());
    }
}
