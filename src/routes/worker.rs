use mongodb::bson::{self, Bson, DateTime, Document, Regex, doc, oid::ObjectId};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use std::collections::HashMap;
use validator::Validate;

use crate::db::{self, DbConn};
use crate::guards::{AdminGuard, WorkerGuard};
use crate::models::{
    Category, CategoryRef, CreateWorkerProfileDto, RatingSummary, UpdateAvailabilityDto,
    UpdateWorkerProfileDto, User, Verification, VerifyWorkerDto, WorkerProfile, WorkerResponse,
    WorkerStatus,
};
use crate::services::{lookup, stats};
use crate::utils::{ApiError, ApiResponse, Page, parse_id};

fn to_bson<T: serde::Serialize>(value: &T) -> Result<Bson, ApiError> {
    bson::to_bson(value).map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))
}

fn updated_after() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

async fn active_category(db: &DbConn, category_id: ObjectId) -> Result<Category, ApiError> {
    db.collection::<Category>(db::CATEGORIES)
        .find_one(doc! { "_id": category_id, "is_active": true }, None)
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid category"))
}

async fn category_refs(
    db: &DbConn,
    ids: impl IntoIterator<Item = ObjectId>,
) -> Result<HashMap<ObjectId, CategoryRef>, ApiError> {
    let mut ids: Vec<ObjectId> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();

    let categories: Vec<Category> = db
        .collection::<Category>(db::CATEGORIES)
        .find(doc! { "_id": { "$in": ids } }, None)
        .await?
        .try_collect()
        .await?;

    Ok(categories
        .iter()
        .filter_map(|c| c.id.map(|id| (id, CategoryRef::from(c))))
        .collect())
}

/// Renders workers with their owner summary and category attached.
async fn with_owners(
    db: &DbConn,
    workers: Vec<WorkerProfile>,
    full: bool,
) -> Result<Vec<serde_json::Value>, ApiError> {
    let users = lookup::user_summaries(db, workers.iter().map(|w| w.user_id)).await?;
    let categories = category_refs(db, workers.iter().map(|w| w.category_id)).await?;

    Ok(workers
        .into_iter()
        .map(|worker| {
            let user = users.get(&worker.user_id).cloned();
            let category = categories.get(&worker.category_id).cloned();
            let profile = if full {
                WorkerResponse::full(worker)
            } else {
                WorkerResponse::public(worker)
            };
            serde_json::json!({
                "profile": profile,
                "user": user,
                "category": category,
            })
        })
        .collect())
}

async fn own_profile(db: &DbConn, user_id: ObjectId) -> Result<WorkerProfile, ApiError> {
    lookup::worker_for_user(db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Worker profile not found"))
}

/// --------------------
/// Own profile
/// --------------------
#[openapi(tag = "Worker")]
#[post("/workers/profile", data = "<dto>")]
pub async fn create_worker_profile(
    db: &State<DbConn>,
    worker: WorkerGuard,
    dto: Json<CreateWorkerProfileDto>,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    dto.validate()?;
    let user_id = worker.auth.user_id;

    if lookup::worker_for_user(db, user_id).await?.is_some() {
        return Err(ApiError::bad_request("Worker profile already exists"));
    }

    let category_id = parse_id(&dto.category_id, "category")?;
    active_category(db, category_id).await?;

    let dto = dto.into_inner();
    let now = DateTime::now();
    let mut profile = WorkerProfile {
        id: None,
        user_id,
        category_id,
        skills: dto.skills,
        hourly_rate: dto.hourly_rate,
        daily_rate: dto.daily_rate,
        availability: dto.availability.unwrap_or_default(),
        bio: dto.bio,
        portfolio: dto.portfolio,
        documents: dto.documents,
        verification: Verification::default(),
        status: WorkerStatus::Pending,
        rating: RatingSummary::default(),
        completed_jobs: 0,
        total_earnings: 0.0,
        preferred_locations: dto.preferred_locations,
        languages: dto.languages,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<WorkerProfile>(db::WORKERS)
        .insert_one(&profile, None)
        .await?;
    profile.id = result.inserted_id.as_object_id();

    log::info!("Worker profile created for user {}, awaiting verification", user_id);

    Ok(Json(ApiResponse::success_with_message(
        "Worker profile created successfully. Awaiting verification.",
        WorkerResponse::full(profile),
    )))
}

#[openapi(tag = "Worker")]
#[get("/workers/profile/me")]
pub async fn get_my_profile(
    db: &State<DbConn>,
    worker: WorkerGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let profile = own_profile(db, worker.auth.user_id).await?;
    let mut rendered = with_owners(db, vec![profile], true).await?;

    Ok(Json(ApiResponse::success(rendered.remove(0))))
}

#[openapi(tag = "Worker")]
#[put("/workers/profile", data = "<dto>")]
pub async fn update_worker_profile(
    db: &State<DbConn>,
    worker: WorkerGuard,
    dto: Json<UpdateWorkerProfileDto>,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    dto.validate_all()?;
    let current = own_profile(db, worker.auth.user_id).await?;

    let mut update = Document::new();
    let new_category = match &dto.category_id {
        Some(id) => {
            let id = parse_id(id, "category")?;
            active_category(db, id).await?;
            update.insert("category_id", id);
            Some(id)
        }
        None => None,
    };

    if let Some(skills) = &dto.skills {
        update.insert("skills", to_bson(skills)?);
    }
    if let Some(rate) = dto.hourly_rate {
        update.insert("hourly_rate", rate);
    }
    if let Some(rate) = dto.daily_rate {
        update.insert("daily_rate", rate);
    }
    if let Some(bio) = &dto.bio {
        update.insert("bio", bio.as_str());
    }
    if let Some(portfolio) = &dto.portfolio {
        update.insert("portfolio", to_bson(portfolio)?);
    }
    if let Some(locations) = &dto.preferred_locations {
        update.insert("preferred_locations", locations.clone());
    }
    if let Some(languages) = &dto.languages {
        update.insert("languages", languages.clone());
    }

    if update.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    update.insert("updated_at", DateTime::now());

    let updated = db
        .collection::<WorkerProfile>(db::WORKERS)
        .find_one_and_update(
            doc! { "_id": current.id },
            doc! { "$set": update },
            updated_after(),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Worker profile not found"))?;

    if updated.is_bookable() && (new_category.is_some() || dto.hourly_rate.is_some()) {
        stats::refresh_category_stats(db, updated.category_id).await?;
        if updated.category_id != current.category_id {
            stats::refresh_category_stats(db, current.category_id).await?;
        }
    }

    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully",
        WorkerResponse::full(updated),
    )))
}

#[openapi(tag = "Worker")]
#[put("/workers/availability", data = "<dto>")]
pub async fn update_availability(
    db: &State<DbConn>,
    worker: WorkerGuard,
    dto: Json<UpdateAvailabilityDto>,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    dto.validate()?;

    let availability = to_bson(&dto.availability)?;

    let updated = db
        .collection::<WorkerProfile>(db::WORKERS)
        .find_one_and_update(
            doc! { "user_id": worker.auth.user_id },
            doc! { "$set": { "availability": availability, "updated_at": DateTime::now() } },
            updated_after(),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Worker profile not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Availability updated successfully",
        WorkerResponse::full(updated),
    )))
}

/// --------------------
/// Search
/// --------------------
#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct WorkerSearchQuery {
    pub category: Option<String>,
    pub location: Option<String>,
    pub min_rate: Option<f64>,
    pub max_rate: Option<f64>,
    /// Comma separated skill names.
    pub skills: Option<String>,
    /// Weekday name, e.g. `saturday`.
    pub available_on: Option<String>,
    pub sort_by: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

fn contains_ci(value: &str) -> Bson {
    Bson::RegularExpression(Regex {
        pattern: regex::escape(value.trim()),
        options: "i".to_string(),
    })
}

fn search_sort(sort_by: Option<&str>) -> Document {
    match sort_by {
        Some("rate") => doc! { "hourly_rate": 1, "rating.average": -1 },
        Some("experience") => doc! { "total_experience": -1, "rating.average": -1 },
        _ => doc! { "rating.average": -1, "rating.count": -1 },
    }
}

/// Filter over worker fields only; `location` needs a user lookup first.
fn search_filter(query: &WorkerSearchQuery) -> Result<Document, ApiError> {
    let mut filter = doc! {
        "verification.is_verified": true,
        "status": "active",
    };

    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        filter.insert("category_id", parse_id(category, "category")?);
    }

    let mut rate = Document::new();
    if let Some(min) = query.min_rate {
        rate.insert("$gte", min);
    }
    if let Some(max) = query.max_rate {
        rate.insert("$lte", max);
    }
    if !rate.is_empty() {
        filter.insert("hourly_rate", rate);
    }

    if let Some(skills) = query.skills.as_deref() {
        let patterns: Vec<Bson> = skills
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(contains_ci)
            .collect();
        if !patterns.is_empty() {
            filter.insert("skills.name", doc! { "$in": patterns });
        }
    }

    if let Some(day) = query.available_on.as_deref() {
        let day = day.trim().to_lowercase();
        if !WEEKDAYS.contains(&day.as_str()) {
            return Err(ApiError::bad_request("available_on must be a weekday name"));
        }
        filter.insert(format!("availability.{}.available", day), true);
    }

    Ok(filter)
}

#[openapi(tag = "Worker")]
#[get("/workers/search?<query..>")]
pub async fn search_workers(
    db: &State<DbConn>,
    query: WorkerSearchQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit, 10);
    let mut filter = search_filter(&query)?;

    if let Some(location) = query.location.as_deref().filter(|l| !l.trim().is_empty()) {
        let owners: Vec<ObjectId> = db
            .collection::<User>(db::USERS)
            .find(
                doc! {
                    "role": "worker",
                    "$or": [
                        { "location.city": contains_ci(location) },
                        { "location.county": contains_ci(location) },
                    ]
                },
                None,
            )
            .await?
            .try_collect::<Vec<User>>()
            .await?
            .into_iter()
            .filter_map(|u| u.id)
            .collect();
        filter.insert("user_id", doc! { "$in": owners });
    }

    let workers = db.collection::<WorkerProfile>(db::WORKERS);
    let pipeline = vec![
        doc! { "$match": filter.clone() },
        doc! { "$addFields": { "total_experience": { "$sum": "$skills.years_of_experience" } } },
        doc! { "$sort": search_sort(query.sort_by.as_deref()) },
        doc! { "$skip": page.skip() as i64 },
        doc! { "$limit": page.limit },
    ];

    let mut cursor = workers.aggregate(pipeline, None).await?;
    let mut found = Vec::new();
    while cursor.advance().await? {
        let document = cursor.deserialize_current()?;
        let worker: WorkerProfile = bson::from_document(document)
            .map_err(|e| ApiError::internal_error(format!("Deserialization error: {}", e)))?;
        found.push(worker);
    }

    let total = workers.count_documents(filter, None).await?;
    let found = with_owners(db, found, false).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "workers": found,
        "pagination": page.summary(total),
    }))))
}

#[openapi(tag = "Worker")]
#[get("/workers/<worker_id>", rank = 2)]
pub async fn get_worker_by_id(
    db: &State<DbConn>,
    worker_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let worker_id = parse_id(&worker_id, "worker")?;

    let worker = db
        .collection::<WorkerProfile>(db::WORKERS)
        .find_one(doc! { "_id": worker_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Worker not found"))?;

    let mut rendered = with_owners(db, vec![worker], false).await?;
    Ok(Json(ApiResponse::success(rendered.remove(0))))
}

/// --------------------
/// Admin
/// --------------------
#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct AdminWorkersQuery {
    /// `verified` or `unverified`.
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn verification_filter(status: Option<&str>) -> Result<Document, ApiError> {
    match status {
        None | Some("") => Ok(doc! {}),
        Some("verified") => Ok(doc! { "verification.is_verified": true }),
        Some("unverified") => Ok(doc! { "verification.is_verified": false }),
        Some(_) => Err(ApiError::bad_request("status must be verified or unverified")),
    }
}

#[openapi(tag = "Admin")]
#[get("/workers/admin/all?<query..>")]
pub async fn get_all_workers(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: AdminWorkersQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit, 20);
    let filter = verification_filter(query.status.as_deref())?;
    let workers = db.collection::<WorkerProfile>(db::WORKERS);

    let found: Vec<WorkerProfile> = workers
        .find(filter.clone(), page.find_options(doc! { "created_at": -1 }))
        .await?
        .try_collect()
        .await?;
    let total = workers.count_documents(filter, None).await?;
    let found = with_owners(db, found, true).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "workers": found,
        "pagination": page.summary(total),
    }))))
}

#[openapi(tag = "Admin")]
#[put("/workers/admin/verify/<worker_id>", data = "<dto>")]
pub async fn verify_worker(
    db: &State<DbConn>,
    admin: AdminGuard,
    worker_id: String,
    dto: Json<VerifyWorkerDto>,
) -> Result<Json<ApiResponse<WorkerResponse>>, ApiError> {
    let worker_id = parse_id(&worker_id, "worker")?;

    let verification = Verification {
        is_verified: dto.is_verified,
        verified_at: dto.is_verified.then(DateTime::now),
        verified_by: Some(admin.auth.user_id),
        notes: dto.notes.clone(),
    };
    let verification = to_bson(&verification)?;
    let status = if dto.is_verified { "active" } else { "pending" };

    let worker = db
        .collection::<WorkerProfile>(db::WORKERS)
        .find_one_and_update(
            doc! { "_id": worker_id },
            doc! {
                "$set": {
                    "verification": verification,
                    "status": status,
                    "updated_at": DateTime::now(),
                }
            },
            updated_after(),
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Worker not found"))?;

    stats::refresh_category_stats(db, worker.category_id).await?;

    log::info!(
        "Worker {} {} by admin {}",
        worker_id,
        if dto.is_verified { "verified" } else { "unverified" },
        admin.auth.user_id
    );

    let message = if dto.is_verified {
        "Worker verified successfully"
    } else {
        "Worker verification revoked"
    };
    Ok(Json(ApiResponse::success_with_message(message, WorkerResponse::full(worker))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> WorkerSearchQuery {
        WorkerSearchQuery {
            category: None,
            location: None,
            min_rate: None,
            max_rate: None,
            skills: None,
            available_on: None,
            sort_by: None,
            page: None,
            limit: None,
        }
    }

    #[test]
    fn search_only_lists_verified_active_workers() {
        let filter = search_filter(&query()).unwrap();
        assert_eq!(filter.get_bool("verification.is_verified").unwrap(), true);
        assert_eq!(filter.get_str("status").unwrap(), "active");
    }

    #[test]
    fn search_filter_builds_rate_skill_and_day_clauses() {
        let mut q = query();
        q.min_rate = Some(500.0);
        q.max_rate = Some(1500.0);
        q.skills = Some("plumbing, , Tiling".into());
        q.available_on = Some("Saturday".into());

        let filter = search_filter(&q).unwrap();
        let rate = filter.get_document("hourly_rate").unwrap();
        assert_eq!(rate.get_f64("$gte").unwrap(), 500.0);
        assert_eq!(rate.get_f64("$lte").unwrap(), 1500.0);
        let skills = filter.get_document("skills.name").unwrap();
        assert_eq!(skills.get_array("$in").unwrap().len(), 2);
        assert!(filter.get_bool("availability.saturday.available").unwrap());
    }

    #[test]
    fn search_filter_rejects_bad_input() {
        let mut q = query();
        q.category = Some("nope".into());
        assert_eq!(search_filter(&q).unwrap_err().message, "Invalid category ID");

        let mut q = query();
        q.available_on = Some("someday".into());
        assert!(search_filter(&q).is_err());
    }

    #[test]
    fn skill_patterns_are_escaped() {
        match contains_ci("C++") {
            Bson::RegularExpression(re) => {
                assert_eq!(re.pattern, r"C\+\+");
                assert_eq!(re.options, "i");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sort_modes() {
        assert_eq!(search_sort(None), doc! { "rating.average": -1, "rating.count": -1 });
        assert_eq!(search_sort(Some("rate")).keys().next().unwrap(), "hourly_rate");
        assert_eq!(
            search_sort(Some("experience")).keys().next().unwrap(),
            "total_experience"
        );
    }

    #[test]
    fn admin_status_filter() {
        assert_eq!(
            verification_filter(Some("unverified")).unwrap(),
            doc! { "verification.is_verified": false }
        );
        assert!(verification_filter(Some("maybe")).is_err());
    }
}
