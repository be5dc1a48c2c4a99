use chrono::{Datelike, Weekday};
use mongodb::bson::{DateTime, oid::ObjectId};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::utils::{hex, iso, normalize_clock_time, validate_clock_time, validate_object_id};

const EAT_OFFSET_HOURS: i64 = 3;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Expert,
}

impl Default for SkillLevel {
    fn default() -> Self {
        SkillLevel::Intermediate
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, Validate)]
pub struct Skill {
    #[validate(length(min = 1, max = 60))]
    pub name: String,
    #[serde(default)]
    pub level: SkillLevel,
    #[serde(default)]
    #[validate(range(min = 0, max = 60))]
    pub years_of_experience: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema, Validate)]
pub struct DayAvailability {
    pub available: bool,
    #[validate(custom = "validate_clock_time")]
    pub start_time: String,
    #[validate(custom = "validate_clock_time")]
    pub end_time: String,
}

impl DayAvailability {
    fn working() -> Self {
        DayAvailability {
            available: true,
            start_time: "08:00".to_string(),
            end_time: "17:00".to_string(),
        }
    }

    fn off() -> Self {
        DayAvailability {
            available: false,
            ..Self::working()
        }
    }

    pub fn covers(&self, time: &str) -> bool {
        let time = normalize_clock_time(time);
        self.available
            && time >= normalize_clock_time(&self.start_time)
            && time <= normalize_clock_time(&self.end_time)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema, Validate)]
#[validate(schema(function = "validate_day_ranges"))]
pub struct WeeklyAvailability {
    #[validate]
    pub monday: DayAvailability,
    #[validate]
    pub tuesday: DayAvailability,
    #[validate]
    pub wednesday: DayAvailability,
    #[validate]
    pub thursday: DayAvailability,
    #[validate]
    pub friday: DayAvailability,
    #[validate]
    pub saturday: DayAvailability,
    #[validate]
    pub sunday: DayAvailability,
}

impl Default for WeeklyAvailability {
    fn default() -> Self {
        WeeklyAvailability {
            monday: DayAvailability::working(),
            tuesday: DayAvailability::working(),
            wednesday: DayAvailability::working(),
            thursday: DayAvailability::working(),
            friday: DayAvailability::working(),
            saturday: DayAvailability::off(),
            sunday: DayAvailability::off(),
        }
    }
}

impl WeeklyAvailability {
    pub fn day(&self, weekday: Weekday) -> &DayAvailability {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    pub fn is_available_at(&self, weekday: Weekday, time: &str) -> bool {
        self.day(weekday).covers(time)
    }

    /// Checked against East Africa Time, which has no daylight saving.
    pub fn is_available_now(&self) -> bool {
        let now = chrono::Utc::now() + chrono::Duration::hours(EAT_OFFSET_HOURS);
        self.is_available_at(now.weekday(), &now.format("%H:%M").to_string())
    }

    fn days(&self) -> [&DayAvailability; 7] {
        [
            &self.monday,
            &self.tuesday,
            &self.wednesday,
            &self.thursday,
            &self.friday,
            &self.saturday,
            &self.sunday,
        ]
    }
}

fn validate_day_ranges(week: &WeeklyAvailability) -> Result<(), ValidationError> {
    let inverted = week.days().iter().any(|d| {
        d.available && normalize_clock_time(&d.start_time) >= normalize_clock_time(&d.end_time)
    });
    if inverted {
        return Err(ValidationError::new("start_time must be before end_time"));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, Validate)]
pub struct PortfolioItem {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(url)]
    pub project_url: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
pub struct Certificate {
    pub name: String,
    pub url: String,
    pub issued_by: Option<String>,
    pub issued_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, Validate)]
pub struct WorkerDocuments {
    #[validate(length(min = 1, message = "ID card is required for verification"))]
    pub id_card: String,
    #[validate(length(min = 1, message = "Police clearance is required for verification"))]
    pub police_clearance: String,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Verification {
    pub is_verified: bool,
    pub verified_at: Option<DateTime>,
    pub verified_by: Option<ObjectId>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
}

/// Running star tally. `breakdown[0]` counts 1-star ratings.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, JsonSchema)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i32,
    pub breakdown: [i32; 5],
}

/// Index into `RatingSummary::breakdown` for a 1-5 star rating.
pub fn star_slot(stars: i32) -> Option<usize> {
    (1..=5).contains(&stars).then(|| (stars - 1) as usize)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerProfile {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub category_id: ObjectId,
    pub skills: Vec<Skill>,
    pub hourly_rate: f64,
    pub daily_rate: Option<f64>,
    pub availability: WeeklyAvailability,
    pub bio: Option<String>,
    pub portfolio: Vec<PortfolioItem>,
    pub documents: WorkerDocuments,
    pub verification: Verification,
    pub status: WorkerStatus,
    pub rating: RatingSummary,
    pub completed_jobs: i32,
    pub total_earnings: f64,
    pub preferred_locations: Vec<String>,
    pub languages: Vec<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl WorkerProfile {
    pub fn total_experience(&self) -> i32 {
        self.skills.iter().map(|s| s.years_of_experience).sum()
    }

    pub fn is_bookable(&self) -> bool {
        self.verification.is_verified && self.status == WorkerStatus::Active
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateWorkerProfileDto {
    #[validate(custom = "validate_object_id")]
    pub category_id: String,
    #[validate(length(min = 1, message = "at least one skill is required"))]
    #[validate]
    pub skills: Vec<Skill>,
    #[validate(range(min = 100.0, max = 10000.0, message = "must be between KES 100 and KES 10,000"))]
    pub hourly_rate: f64,
    #[validate(range(min = 500.0))]
    pub daily_rate: Option<f64>,
    #[validate]
    pub availability: Option<WeeklyAvailability>,
    #[validate(length(max = 1000))]
    pub bio: Option<String>,
    #[serde(default)]
    #[validate]
    pub portfolio: Vec<PortfolioItem>,
    #[validate]
    pub documents: WorkerDocuments,
    #[serde(default)]
    pub preferred_locations: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateWorkerProfileDto {
    #[validate(custom = "validate_object_id")]
    pub category_id: Option<String>,
    #[validate(length(min = 1))]
    pub skills: Option<Vec<Skill>>,
    #[validate(range(min = 100.0, max = 10000.0, message = "must be between KES 100 and KES 10,000"))]
    pub hourly_rate: Option<f64>,
    #[validate(range(min = 500.0))]
    pub daily_rate: Option<f64>,
    #[validate(length(max = 1000))]
    pub bio: Option<String>,
    pub portfolio: Option<Vec<PortfolioItem>>,
    pub preferred_locations: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
}

impl UpdateWorkerProfileDto {
    /// Field validation plus the per-item checks on replaced lists.
    pub fn validate_all(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        for skill in self.skills.iter().flatten() {
            skill.validate()?;
        }
        for item in self.portfolio.iter().flatten() {
            item.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateAvailabilityDto {
    #[validate]
    pub availability: WeeklyAvailability,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct VerifyWorkerDto {
    pub is_verified: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct WorkerResponse {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub skills: Vec<Skill>,
    pub total_experience: i32,
    pub hourly_rate: f64,
    pub daily_rate: Option<f64>,
    pub availability: WeeklyAvailability,
    pub bio: Option<String>,
    pub portfolio: Vec<PortfolioItem>,
    pub status: WorkerStatus,
    pub is_verified: bool,
    pub is_available_now: bool,
    pub rating: RatingSummary,
    pub completed_jobs: i32,
    pub total_earnings: f64,
    pub preferred_locations: Vec<String>,
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<WorkerDocuments>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_notes: Option<String>,
    pub created_at: String,
}

impl WorkerResponse {
    /// Owner and admin view, documents and verification included.
    pub fn full(worker: WorkerProfile) -> Self {
        let documents = Some(worker.documents.clone());
        let verified_at = worker.verification.verified_at.map(iso);
        let notes = worker.verification.notes.clone();
        let mut response = Self::public(worker);
        response.documents = documents;
        response.verified_at = verified_at;
        response.verification_notes = notes;
        response
    }

    pub fn public(worker: WorkerProfile) -> Self {
        let is_available_now = worker.availability.is_available_now();
        WorkerResponse {
            id: hex(&worker.id),
            user_id: worker.user_id.to_hex(),
            category_id: worker.category_id.to_hex(),
            total_experience: worker.total_experience(),
            skills: worker.skills,
            hourly_rate: worker.hourly_rate,
            daily_rate: worker.daily_rate,
            availability: worker.availability,
            bio: worker.bio,
            portfolio: worker.portfolio,
            status: worker.status,
            is_verified: worker.verification.is_verified,
            is_available_now,
            rating: worker.rating,
            completed_jobs: worker.completed_jobs,
            total_earnings: worker.total_earnings,
            preferred_locations: worker.preferred_locations,
            languages: worker.languages,
            documents: None,
            verified_at: None,
            verification_notes: None,
            created_at: iso(worker.created_at),
        }
    }
}
