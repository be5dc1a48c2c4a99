use crate::db::{self, DbConn};
use crate::guards::AdminGuard;
use crate::models::{Booking, BookingResponse, Category, Message, User, WorkerProfile, WorkerResponse};
use crate::services::lookup;
use crate::utils::{ApiError, ApiResponse, bson_from_chrono};
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use mongodb::options::FindOptions;
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use serde::Serialize;
use std::collections::HashMap;

const ACTIVE_STATUSES: [&str; 2] = ["pending", "accepted"];
const MAX_PERIOD_DAYS: i64 = 365;

/// Reads a numeric aggregate output whatever width the server chose.
fn number(document: &Document, key: &str) -> f64 {
    match document.get(key) {
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        Some(Bson::Double(v)) => *v,
        _ => 0.0,
    }
}

async fn aggregate(
    db: &DbConn,
    collection: &str,
    pipeline: Vec<Document>,
) -> Result<Vec<Document>, ApiError> {
    Ok(db
        .collection::<Document>(collection)
        .aggregate(pipeline, None)
        .await?
        .try_collect()
        .await?)
}

fn latest(limit: i64) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .limit(limit)
        .build()
}

#[derive(Debug, Serialize)]
struct DashboardStats {
    total_users: u64,
    total_workers: u64,
    total_bookings: u64,
    total_messages: u64,
    pending_workers: u64,
    active_bookings: u64,
    completed_bookings: u64,
    total_revenue: f64,
}

#[openapi(tag = "Admin")]
#[get("/admin/dashboard")]
pub async fn get_dashboard(
    db: &State<DbConn>,
    _admin: AdminGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let users = db.collection::<User>(db::USERS);
    let workers = db.collection::<WorkerProfile>(db::WORKERS);
    let bookings = db.collection::<Booking>(db::BOOKINGS);
    let messages = db.collection::<Message>(db::MESSAGES);

    let revenue_pipeline = vec![
        doc! { "$match": { "status": "completed" } },
        doc! { "$group": { "_id": null, "total": { "$sum": "$total_amount" } } },
    ];

    let (
        total_users,
        total_workers,
        total_bookings,
        total_messages,
        pending_workers,
        active_bookings,
        completed_bookings,
        revenue,
    ) = tokio::try_join!(
        users.count_documents(None, None),
        workers.count_documents(None, None),
        bookings.count_documents(None, None),
        messages.count_documents(None, None),
        workers.count_documents(doc! { "verification.is_verified": false }, None),
        bookings.count_documents(doc! { "status": { "$in": ACTIVE_STATUSES.to_vec() } }, None),
        bookings.count_documents(doc! { "status": "completed" }, None),
        async {
            bookings
                .aggregate(revenue_pipeline, None)
                .await?
                .try_collect::<Vec<Document>>()
                .await
        },
    )?;

    let stats = DashboardStats {
        total_users,
        total_workers,
        total_bookings,
        total_messages,
        pending_workers,
        active_bookings,
        completed_bookings,
        total_revenue: revenue.first().map(|d| number(d, "total")).unwrap_or(0.0),
    };

    let recent_bookings: Vec<Booking> = bookings.find(None, latest(5)).await?.try_collect().await?;
    let recent_workers: Vec<WorkerProfile> = workers.find(None, latest(5)).await?.try_collect().await?;

    let people = lookup::user_summaries(
        db,
        recent_bookings
            .iter()
            .flat_map(|b| [b.employer_id, b.worker_user_id])
            .chain(recent_workers.iter().map(|w| w.user_id)),
    )
    .await?;

    let recent_bookings: Vec<serde_json::Value> = recent_bookings
        .into_iter()
        .map(|b| {
            let employer = people.get(&b.employer_id).map(|u| u.name.clone());
            let worker = people.get(&b.worker_user_id).map(|u| u.name.clone());
            serde_json::json!({
                "booking": BookingResponse::from(b),
                "employer_name": employer,
                "worker_name": worker,
            })
        })
        .collect();

    let recent_workers: Vec<serde_json::Value> = recent_workers
        .into_iter()
        .map(|w| {
            let user = people.get(&w.user_id).cloned();
            serde_json::json!({
                "profile": WorkerResponse::public(w),
                "user": user,
            })
        })
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "stats": stats,
        "recent_bookings": recent_bookings,
        "recent_workers": recent_workers,
    }))))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct AnalyticsQuery {
    /// Days to look back, default 30.
    pub period: Option<i64>,
}

fn per_day(since: mongodb::bson::DateTime, extra: Document) -> Vec<Document> {
    let mut group = doc! {
        "_id": { "$dateToString": { "format": "%Y-%m-%d", "date": "$created_at" } },
        "count": { "$sum": 1 },
    };
    for (key, value) in extra {
        group.insert(key, value);
    }
    vec![
        doc! { "$match": { "created_at": { "$gte": since } } },
        doc! { "$group": group },
        doc! { "$sort": { "_id": 1 } },
    ]
}

fn count_by(field: &str) -> Vec<Document> {
    vec![
        doc! { "$group": { "_id": format!("${}", field), "count": { "$sum": 1 } } },
        doc! { "$sort": { "count": -1 } },
    ]
}

#[openapi(tag = "Admin")]
#[get("/admin/analytics?<query..>")]
pub async fn get_analytics(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: AnalyticsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let days = query.period.unwrap_or(30).clamp(1, MAX_PERIOD_DAYS);
    let since = bson_from_chrono(chrono::Utc::now() - chrono::Duration::days(days));

    let (user_trends, booking_trends, worker_categories, booking_statuses) = tokio::try_join!(
        aggregate(db, db::USERS, per_day(since, Document::new())),
        aggregate(
            db,
            db::BOOKINGS,
            per_day(since, doc! { "revenue": { "$sum": "$total_amount" } })
        ),
        aggregate(db, db::WORKERS, count_by("category_id")),
        aggregate(db, db::BOOKINGS, count_by("status")),
    )?;

    let category_ids: Vec<ObjectId> = worker_categories
        .iter()
        .filter_map(|d| d.get_object_id("_id").ok())
        .collect();
    let names: HashMap<ObjectId, String> = db
        .collection::<Category>(db::CATEGORIES)
        .find(doc! { "_id": { "$in": category_ids } }, None)
        .await?
        .try_collect::<Vec<Category>>()
        .await?
        .into_iter()
        .filter_map(|c| c.id.map(|id| (id, c.name)))
        .collect();

    let user_trends: Vec<serde_json::Value> = user_trends
        .iter()
        .map(|d| {
            serde_json::json!({
                "date": d.get_str("_id").unwrap_or_default(),
                "count": number(d, "count") as i64,
            })
        })
        .collect();

    let booking_trends: Vec<serde_json::Value> = booking_trends
        .iter()
        .map(|d| {
            serde_json::json!({
                "date": d.get_str("_id").unwrap_or_default(),
                "count": number(d, "count") as i64,
                "revenue": number(d, "revenue"),
            })
        })
        .collect();

    let worker_categories: Vec<serde_json::Value> = worker_categories
        .iter()
        .map(|d| {
            let id = d.get_object_id("_id").ok();
            serde_json::json!({
                "category_id": id.map(|id| id.to_hex()),
                "category": id.and_then(|id| names.get(&id).cloned()),
                "count": number(d, "count") as i64,
            })
        })
        .collect();

    let booking_statuses: Vec<serde_json::Value> = booking_statuses
        .iter()
        .map(|d| {
            serde_json::json!({
                "status": d.get_str("_id").unwrap_or_default(),
                "count": number(d, "count") as i64,
            })
        })
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "period_days": days,
        "user_trends": user_trends,
        "booking_trends": booking_trends,
        "worker_categories": worker_categories,
        "booking_statuses": booking_statuses,
    }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_outputs_of_any_width() {
        let d = doc! { "a": 3_i32, "b": 4_i64, "c": 2.5, "d": "x" };
        assert_eq!(number(&d, "a"), 3.0);
        assert_eq!(number(&d, "b"), 4.0);
        assert_eq!(number(&d, "c"), 2.5);
        assert_eq!(number(&d, "d"), 0.0);
        assert_eq!(number(&d, "missing"), 0.0);
    }

    #[test]
    fn daily_pipeline_adds_extra_accumulators() {
        let since = mongodb::bson::DateTime::now();
        let pipeline = per_day(since, doc! { "revenue": { "$sum": "$total_amount" } });
        assert_eq!(pipeline.len(), 3);
        let group = pipeline[1].get_document("$group").unwrap();
        assert!(group.contains_key("count"));
        assert!(group.contains_key("revenue"));
    }

    #[test]
    fn grouping_by_field_prefixes_dollar() {
        let pipeline = count_by("status");
        let group = pipeline[0].get_document("$group").unwrap();
        assert_eq!(group.get_str("_id").unwrap(), "$status");
    }
}
