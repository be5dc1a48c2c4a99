use mongodb::bson::{DateTime, oid::ObjectId};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use super::GeoPoint;
use crate::utils::{hex, iso, validate_clock_time, validate_object_id};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::InProgress => "in-progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            BookingStatus::Pending,
            BookingStatus::Accepted,
            BookingStatus::Rejected,
            BookingStatus::InProgress,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ]
        .into_iter()
        .find(|s| s.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Completed | BookingStatus::Cancelled
        )
    }

    /// Single transition table for every writer of `status`.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Accepted, InProgress)
                | (Accepted, Cancelled)
                | (InProgress, Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Mpesa,
    Card,
    BankTransfer,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct JobLocation {
    pub address: String,
    pub coordinates: Option<GeoPoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerReply {
    pub accepted: bool,
    pub responded_at: DateTime,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct CompletionImage {
    pub url: String,
    pub caption: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Completion {
    pub completed_at: DateTime,
    pub completed_by: ObjectId,
    pub notes: Option<String>,
    pub images: Vec<CompletionImage>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Cancellation {
    pub cancelled_by: ObjectId,
    pub cancelled_at: DateTime,
    pub reason: Option<String>,
    pub refund_amount: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SideRating {
    pub rating: i32,
    pub review: Option<String>,
    pub rated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BookingRatings {
    /// Employer's rating of the worker.
    pub employer_rating: Option<SideRating>,
    /// Worker's rating of the employer.
    pub worker_rating: Option<SideRating>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub employer_id: ObjectId,
    pub worker_id: ObjectId,
    pub worker_user_id: ObjectId,
    pub category_id: ObjectId,
    pub title: String,
    pub description: String,
    pub location: JobLocation,
    pub scheduled_date: DateTime,
    pub start_time: String,
    pub end_time: String,
    pub duration_hours: i32,
    pub hourly_rate: f64,
    pub total_amount: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub worker_response: Option<WorkerReply>,
    pub completion: Option<Completion>,
    pub cancellation: Option<Cancellation>,
    pub ratings: BookingRatings,
    pub special_requirements: Vec<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    pub fn total_for(hourly_rate: f64, duration_hours: i32) -> f64 {
        hourly_rate * duration_hours as f64
    }

    pub fn is_party(&self, user_id: &ObjectId) -> bool {
        &self.employer_id == user_id || &self.worker_user_id == user_id
    }

    /// An in-progress job past its scheduled end.
    pub fn is_overdue(&self, now: DateTime) -> bool {
        if self.status != BookingStatus::InProgress {
            return false;
        }
        let end = self.scheduled_date.timestamp_millis()
            + i64::from(self.duration_hours) * 60 * 60 * 1000;
        now.timestamp_millis() > end
    }

    pub fn millis_until_scheduled(&self, now: DateTime) -> i64 {
        self.scheduled_date.timestamp_millis() - now.timestamp_millis()
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct JobLocationDto {
    #[validate(length(min = 1, message = "Job location is required"))]
    pub address: String,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

impl From<&JobLocationDto> for JobLocation {
    fn from(dto: &JobLocationDto) -> Self {
        JobLocation {
            address: dto.address.trim().to_string(),
            coordinates: match (dto.longitude, dto.latitude) {
                (Some(lng), Some(lat)) => Some(GeoPoint::new(lng, lat)),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateBookingDto {
    #[validate(custom = "validate_object_id")]
    pub worker_id: String,
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    #[validate]
    pub location: JobLocationDto,
    pub scheduled_date: chrono::DateTime<chrono::Utc>,
    #[validate(custom = "validate_clock_time")]
    pub start_time: String,
    #[validate(custom = "validate_clock_time")]
    pub end_time: String,
    #[validate(range(min = 1, max = 24, message = "must be between 1 and 24 hours"))]
    pub duration_hours: i32,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub special_requirements: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateBookingStatusDto {
    pub status: BookingStatus,
    #[validate(length(max = 500))]
    pub message: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub images: Vec<CompletionImage>,
    #[validate(length(max = 500))]
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CancelBookingDto {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
    #[validate(range(min = 0.0))]
    pub refund_amount: Option<f64>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SideRatingResponse {
    pub rating: i32,
    pub review: Option<String>,
    pub rated_at: String,
}

impl From<SideRating> for SideRatingResponse {
    fn from(r: SideRating) -> Self {
        SideRatingResponse {
            rating: r.rating,
            review: r.review,
            rated_at: iso(r.rated_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BookingResponse {
    pub id: String,
    pub employer_id: String,
    pub worker_id: String,
    pub worker_user_id: String,
    pub category_id: String,
    pub title: String,
    pub description: String,
    pub location: JobLocation,
    pub scheduled_date: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_hours: i32,
    pub hourly_rate: f64,
    pub total_amount: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub is_overdue: bool,
    /// Negative once the scheduled date has passed.
    pub millis_until_scheduled: i64,
    pub worker_message: Option<String>,
    pub responded_at: Option<String>,
    pub completed_at: Option<String>,
    pub completion_notes: Option<String>,
    pub completion_images: Vec<CompletionImage>,
    pub cancelled_at: Option<String>,
    pub cancellation_reason: Option<String>,
    pub refund_amount: Option<f64>,
    pub employer_rating: Option<SideRatingResponse>,
    pub worker_rating: Option<SideRatingResponse>,
    pub special_requirements: Vec<String>,
    pub created_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        let now = DateTime::now();
        let is_overdue = b.is_overdue(now);
        let millis_until_scheduled = b.millis_until_scheduled(now);
        let (worker_message, responded_at) = match b.worker_response {
            Some(r) => (r.message, Some(iso(r.responded_at))),
            None => (None, None),
        };
        let (completed_at, completion_notes, completion_images) = match b.completion {
            Some(c) => (Some(iso(c.completed_at)), c.notes, c.images),
            None => (None, None, vec![]),
        };
        let (cancelled_at, cancellation_reason, refund_amount) = match b.cancellation {
            Some(c) => (Some(iso(c.cancelled_at)), c.reason, Some(c.refund_amount)),
            None => (None, None, None),
        };

        BookingResponse {
            id: hex(&b.id),
            employer_id: b.employer_id.to_hex(),
            worker_id: b.worker_id.to_hex(),
            worker_user_id: b.worker_user_id.to_hex(),
            category_id: b.category_id.to_hex(),
            title: b.title,
            description: b.description,
            location: b.location,
            scheduled_date: iso(b.scheduled_date),
            start_time: b.start_time,
            end_time: b.end_time,
            duration_hours: b.duration_hours,
            hourly_rate: b.hourly_rate,
            total_amount: b.total_amount,
            status: b.status,
            payment_status: b.payment_status,
            payment_method: b.payment_method,
            is_overdue,
            millis_until_scheduled,
            worker_message,
            responded_at,
            completed_at,
            completion_notes,
            completion_images,
            cancelled_at,
            cancellation_reason,
            refund_amount,
            employer_rating: b.ratings.employer_rating.map(Into::into),
            worker_rating: b.ratings.worker_rating.map(Into::into),
            special_requirements: b.special_requirements,
            created_at: iso(b.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 6] = [Pending, Accepted, Rejected, InProgress, Completed, Cancelled];

    fn booking(status: BookingStatus, scheduled_ms: i64, hours: i32) -> Booking {
        Booking {
            id: Some(ObjectId::new()),
            employer_id: ObjectId::new(),
            worker_id: ObjectId::new(),
            worker_user_id: ObjectId::new(),
            category_id: ObjectId::new(),
            title: "Fix kitchen sink".into(),
            description: "Leaking pipe under the sink".into(),
            location: JobLocation {
                address: "Westlands, Nairobi".into(),
                coordinates: None,
            },
            scheduled_date: DateTime::from_millis(scheduled_ms),
            start_time: "09:00".into(),
            end_time: "11:00".into(),
            duration_hours: hours,
            hourly_rate: 500.0,
            total_amount: Booking::total_for(500.0, hours),
            status,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Mpesa,
            worker_response: None,
            completion: None,
            cancellation: None,
            ratings: BookingRatings::default(),
            special_requirements: vec![],
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn happy_path_transitions() {
        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn cancellation_only_before_work_starts() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Accepted.can_transition_to(Cancelled));
        assert!(!InProgress.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn no_skipping_or_self_loops() {
        assert!(!Pending.can_transition_to(InProgress));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Accepted.can_transition_to(Completed));
        for s in ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn status_strings_round_trip_through_serde() {
        assert_eq!(serde_json::to_value(InProgress).unwrap(), "in-progress");
        for s in ALL {
            assert_eq!(BookingStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(BookingStatus::parse("done"), None);
        assert_eq!(
            serde_json::to_value(PaymentMethod::BankTransfer).unwrap(),
            "bank-transfer"
        );
    }

    #[test]
    fn total_is_rate_times_hours() {
        assert_eq!(Booking::total_for(750.0, 4), 3000.0);
    }

    #[test]
    fn overdue_only_when_in_progress_past_end() {
        let hour = 60 * 60 * 1000;
        let start = 1_700_000_000_000;
        let now = DateTime::from_millis(start + 3 * hour);

        assert!(booking(InProgress, start, 2).is_overdue(now));
        assert!(!booking(InProgress, start, 4).is_overdue(now));
        assert!(!booking(Accepted, start, 2).is_overdue(now));
    }

    #[test]
    fn parties_are_employer_and_worker_owner() {
        let b = booking(Pending, 0, 1);
        assert!(b.is_party(&b.employer_id));
        assert!(b.is_party(&b.worker_user_id));
        assert!(!b.is_party(&b.worker_id));
    }
}
