use mongodb::bson::{self, Bson, DateTime, Document, doc, oid::ObjectId};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::{self, DbConn};
use crate::guards::{AdminGuard, AuthGuard, EmployerGuard, WorkerGuard};
use crate::models::{
    Booking, BookingRatings, BookingResponse, BookingStatus, CancelBookingDto, Cancellation,
    Completion, CreateBookingDto, JobLocation, PaymentStatus, Role, UpdateBookingStatusDto,
    WorkerProfile, WorkerReply,
};
use crate::services::lookup;
use crate::utils::{
    ApiError, ApiResponse, Page, bson_from_chrono, normalize_clock_time, parse_id,
};

fn to_bson<T: serde::Serialize>(value: &T) -> Result<Bson, ApiError> {
    bson::to_bson(value).map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))
}

fn status_filter(status: Option<&str>) -> Result<Option<BookingStatus>, ApiError> {
    match status {
        None | Some("") => Ok(None),
        Some(s) => BookingStatus::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown booking status '{}'", s))),
    }
}

fn check_transition(from: BookingStatus, to: BookingStatus) -> Result<(), ApiError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Cannot change booking status from {} to {}",
            from, to
        )))
    }
}

fn status_message(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Accepted => "Booking accepted",
        BookingStatus::Rejected => "Booking rejected",
        BookingStatus::InProgress => "Job started",
        BookingStatus::Completed => "Job marked as completed",
        BookingStatus::Cancelled => "Booking cancelled",
        BookingStatus::Pending => "Booking updated",
    }
}

async fn load_booking(db: &DbConn, booking_id: ObjectId) -> Result<Booking, ApiError> {
    db.collection::<Booking>(db::BOOKINGS)
        .find_one(doc! { "_id": booking_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))
}

/// Filter and update for a status write guarded on the current status.
fn transition_update(
    booking_id: Option<ObjectId>,
    expected: BookingStatus,
    mut set: Document,
    now: DateTime,
) -> (Document, Document) {
    set.insert("updated_at", now);
    (
        doc! { "_id": booking_id, "status": expected.as_str() },
        doc! { "$set": set },
    )
}

/// Writes `set` only if the booking still has status `expected`.
async fn apply_transition(
    db: &DbConn,
    booking: &Booking,
    expected: BookingStatus,
    set: Document,
) -> Result<Booking, ApiError> {
    let (filter, update) = transition_update(booking.id, expected, set, DateTime::now());
    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    db.collection::<Booking>(db::BOOKINGS)
        .find_one_and_update(filter, update, options)
        .await?
        .ok_or_else(|| {
            log::warn!(
                "Booking {:?} left {} before the update was applied",
                booking.id,
                expected
            );
            ApiError::conflict("Booking was modified by another request, please retry")
        })
}

/// Renders bookings with employer and worker-owner summaries attached.
async fn with_parties(db: &DbConn, bookings: Vec<Booking>) -> Result<Vec<serde_json::Value>, ApiError> {
    let users = lookup::user_summaries(
        db,
        bookings
            .iter()
            .flat_map(|b| [b.employer_id, b.worker_user_id]),
    )
    .await?;

    Ok(bookings
        .into_iter()
        .map(|booking| {
            let employer = users.get(&booking.employer_id).cloned();
            let worker = users.get(&booking.worker_user_id).cloned();
            serde_json::json!({
                "booking": BookingResponse::from(booking),
                "employer": employer,
                "worker": worker,
            })
        })
        .collect())
}

async fn list_page(
    db: &DbConn,
    filter: Document,
    page: Page,
) -> Result<serde_json::Value, ApiError> {
    let bookings = db.collection::<Booking>(db::BOOKINGS);

    let found: Vec<Booking> = bookings
        .find(filter.clone(), page.find_options(doc! { "created_at": -1 }))
        .await?
        .try_collect()
        .await?;
    let total = bookings.count_documents(filter, None).await?;

    Ok(serde_json::json!({
        "bookings": with_parties(db, found).await?,
        "pagination": page.summary(total),
    }))
}

/// --------------------
/// Create
/// --------------------
#[openapi(tag = "Booking")]
#[post("/bookings", data = "<dto>")]
pub async fn create_booking(
    db: &State<DbConn>,
    employer: EmployerGuard,
    dto: Json<CreateBookingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    if dto.scheduled_date <= chrono::Utc::now() {
        return Err(ApiError::bad_request("Scheduled date must be in the future"));
    }
    if normalize_clock_time(&dto.start_time) >= normalize_clock_time(&dto.end_time) {
        return Err(ApiError::bad_request("End time must be after start time"));
    }

    let worker_id = parse_id(&dto.worker_id, "worker")?;
    let worker = db
        .collection::<WorkerProfile>(db::WORKERS)
        .find_one(doc! { "_id": worker_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Worker not found"))?;

    if !worker.is_bookable() {
        return Err(ApiError::bad_request("Worker is not available for booking"));
    }
    if worker.user_id == employer.auth.user_id {
        return Err(ApiError::bad_request("You cannot book yourself"));
    }

    let dto = dto.into_inner();
    let now = DateTime::now();
    let mut booking = Booking {
        id: None,
        employer_id: employer.auth.user_id,
        worker_id,
        worker_user_id: worker.user_id,
        category_id: worker.category_id,
        title: dto.title.trim().to_string(),
        description: dto.description.trim().to_string(),
        location: JobLocation::from(&dto.location),
        scheduled_date: bson_from_chrono(dto.scheduled_date),
        start_time: normalize_clock_time(&dto.start_time),
        end_time: normalize_clock_time(&dto.end_time),
        duration_hours: dto.duration_hours,
        hourly_rate: worker.hourly_rate,
        total_amount: Booking::total_for(worker.hourly_rate, dto.duration_hours),
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: dto.payment_method,
        worker_response: None,
        completion: None,
        cancellation: None,
        ratings: BookingRatings::default(),
        special_requirements: dto.special_requirements,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Booking>(db::BOOKINGS)
        .insert_one(&booking, None)
        .await?;
    booking.id = result.inserted_id.as_object_id();

    log::info!(
        "Booking {:?} created by employer {} for worker {} (KES {})",
        booking.id,
        employer.auth.user_id,
        worker_id,
        booking.total_amount
    );

    let mut rendered = with_parties(db, vec![booking]).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Booking created successfully",
        rendered.remove(0),
    )))
}

/// --------------------
/// Read
/// --------------------
#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct BookingListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn party_filter(auth: &AuthGuard, status: Option<BookingStatus>) -> Document {
    let mut filter = match auth.role {
        Role::Worker => doc! { "worker_user_id": auth.user_id },
        Role::Employer | Role::Admin => doc! { "employer_id": auth.user_id },
    };
    if let Some(status) = status {
        filter.insert("status", status.as_str());
    }
    filter
}

#[openapi(tag = "Booking")]
#[get("/bookings/my-bookings?<query..>")]
pub async fn get_my_bookings(
    db: &State<DbConn>,
    auth: AuthGuard,
    query: BookingListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit, 10);
    let filter = party_filter(&auth, status_filter(query.status.as_deref())?);

    Ok(Json(ApiResponse::success(list_page(db, filter, page).await?)))
}

#[openapi(tag = "Booking")]
#[get("/bookings/<booking_id>", rank = 2)]
pub async fn get_booking_by_id(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking = load_booking(db, parse_id(&booking_id, "booking")?).await?;

    if !booking.is_party(&auth.user_id) && !auth.is_admin() {
        return Err(ApiError::forbidden("Not authorized to view this booking"));
    }

    let mut rendered = with_parties(db, vec![booking]).await?;
    Ok(Json(ApiResponse::success(rendered.remove(0))))
}

/// --------------------
/// Status changes
/// --------------------
fn worker_transition_fields(
    next: BookingStatus,
    dto: &UpdateBookingStatusDto,
    actor: ObjectId,
    now: DateTime,
) -> Result<Document, ApiError> {
    let mut set = doc! { "status": next.as_str() };

    match next {
        BookingStatus::Accepted | BookingStatus::Rejected => {
            let reply = WorkerReply {
                accepted: next == BookingStatus::Accepted,
                responded_at: now,
                message: dto.message.clone(),
            };
            set.insert("worker_response", to_bson(&reply)?);
        }
        BookingStatus::Completed => {
            let completion = Completion {
                completed_at: now,
                completed_by: actor,
                notes: dto.notes.clone(),
                images: dto.images.clone(),
            };
            set.insert("completion", to_bson(&completion)?);
        }
        BookingStatus::Cancelled => {
            let cancellation = Cancellation {
                cancelled_by: actor,
                cancelled_at: now,
                reason: dto.cancellation_reason.clone().or_else(|| dto.message.clone()),
                refund_amount: 0.0,
            };
            set.insert("cancellation", to_bson(&cancellation)?);
        }
        BookingStatus::InProgress | BookingStatus::Pending => {}
    }

    Ok(set)
}

#[openapi(tag = "Booking")]
#[put("/bookings/<booking_id>/status", data = "<dto>")]
pub async fn update_booking_status(
    db: &State<DbConn>,
    worker: WorkerGuard,
    booking_id: String,
    dto: Json<UpdateBookingStatusDto>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    dto.validate()?;
    let booking = load_booking(db, parse_id(&booking_id, "booking")?).await?;

    if booking.worker_user_id != worker.auth.user_id {
        return Err(ApiError::forbidden("Not authorized to update this booking"));
    }
    check_transition(booking.status, dto.status)?;

    let set = worker_transition_fields(dto.status, &dto, worker.auth.user_id, DateTime::now())?;
    let updated = apply_transition(db, &booking, booking.status, set).await?;

    // The booking is already completed; a failed tally must not fail the request.
    if updated.status == BookingStatus::Completed {
        let tally = db
            .collection::<WorkerProfile>(db::WORKERS)
            .update_one(
                doc! { "_id": updated.worker_id },
                doc! {
                    "$inc": { "completed_jobs": 1, "total_earnings": updated.total_amount },
                    "$set": { "updated_at": DateTime::now() },
                },
                None,
            )
            .await;
        if let Err(e) = tally {
            log::error!(
                "Booking {} completed but worker {} counters were not updated: {}",
                booking_id,
                updated.worker_id,
                e
            );
        }
    }

    log::info!(
        "Booking {} moved {} -> {} by worker {}",
        booking_id,
        booking.status,
        updated.status,
        worker.auth.user_id
    );

    Ok(Json(ApiResponse::success_with_message(
        status_message(updated.status),
        BookingResponse::from(updated),
    )))
}

#[openapi(tag = "Booking")]
#[put("/bookings/<booking_id>/cancel", data = "<dto>")]
pub async fn cancel_booking(
    db: &State<DbConn>,
    employer: EmployerGuard,
    booking_id: String,
    dto: Json<CancelBookingDto>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    dto.validate()?;
    let booking = load_booking(db, parse_id(&booking_id, "booking")?).await?;

    if booking.employer_id != employer.auth.user_id {
        return Err(ApiError::forbidden("Not authorized to cancel this booking"));
    }
    if booking.status.is_terminal() {
        return Err(ApiError::bad_request(format!("Booking is already {}", booking.status)));
    }
    check_transition(booking.status, BookingStatus::Cancelled)?;

    let refund_amount = dto.refund_amount.unwrap_or(0.0);
    if refund_amount > booking.total_amount {
        return Err(ApiError::bad_request("Refund cannot exceed the booking total"));
    }

    let cancellation = Cancellation {
        cancelled_by: employer.auth.user_id,
        cancelled_at: DateTime::now(),
        reason: dto.reason.clone(),
        refund_amount,
    };
    let mut set = doc! {
        "status": BookingStatus::Cancelled.as_str(),
        "cancellation": to_bson(&cancellation)?,
    };
    if refund_amount > 0.0 {
        set.insert("payment_status", "refunded");
    }

    let updated = apply_transition(db, &booking, booking.status, set).await?;
    log::info!(
        "Booking {} cancelled by employer {} (refund KES {})",
        booking_id,
        employer.auth.user_id,
        refund_amount
    );

    Ok(Json(ApiResponse::success_with_message(
        "Booking cancelled successfully",
        BookingResponse::from(updated),
    )))
}

/// --------------------
/// Admin
/// --------------------
#[openapi(tag = "Admin")]
#[get("/bookings/admin/all?<query..>")]
pub async fn get_all_bookings(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: BookingListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit, 20);
    let mut filter = Document::new();
    if let Some(status) = status_filter(query.status.as_deref())? {
        filter.insert("status", status.as_str());
    }

    Ok(Json(ApiResponse::success(list_page(db, filter, page).await?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_dto(status: BookingStatus) -> UpdateBookingStatusDto {
        UpdateBookingStatusDto {
            status,
            message: Some("On my way".into()),
            notes: Some("All done".into()),
            images: vec![],
            cancellation_reason: None,
        }
    }

    #[test]
    fn status_writes_are_guarded_by_the_expected_status() {
        let id = ObjectId::new();
        let now = DateTime::now();
        let (filter, update) = transition_update(
            Some(id),
            BookingStatus::Accepted,
            doc! { "status": "in-progress" },
            now,
        );

        assert_eq!(filter.get_object_id("_id").unwrap(), id);
        assert_eq!(filter.get_str("status").unwrap(), "accepted");
        assert_eq!(filter.len(), 2);

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("status").unwrap(), "in-progress");
        assert_eq!(set.get_datetime("updated_at").unwrap(), &now);
    }

    #[test]
    fn status_filter_parses_kebab_case() {
        assert_eq!(status_filter(None).unwrap(), None);
        assert_eq!(
            status_filter(Some("in-progress")).unwrap(),
            Some(BookingStatus::InProgress)
        );
        assert!(status_filter(Some("in_progress")).is_err());
    }

    #[test]
    fn terminal_bookings_reject_further_changes() {
        let err = check_transition(BookingStatus::Completed, BookingStatus::Cancelled).unwrap_err();
        assert_eq!(err.message, "Cannot change booking status from completed to cancelled");
        assert!(check_transition(BookingStatus::Pending, BookingStatus::Accepted).is_ok());
        assert!(check_transition(BookingStatus::Pending, BookingStatus::Completed).is_err());
    }

    #[test]
    fn accept_records_worker_reply() {
        let actor = ObjectId::new();
        let set = worker_transition_fields(
            BookingStatus::Accepted,
            &status_dto(BookingStatus::Accepted),
            actor,
            DateTime::now(),
        )
        .unwrap();

        assert_eq!(set.get_str("status").unwrap(), "accepted");
        let reply = set.get_document("worker_response").unwrap();
        assert!(reply.get_bool("accepted").unwrap());
        assert_eq!(reply.get_str("message").unwrap(), "On my way");
        assert!(!set.contains_key("completion"));
    }

    #[test]
    fn completion_records_actor_and_notes() {
        let actor = ObjectId::new();
        let set = worker_transition_fields(
            BookingStatus::Completed,
            &status_dto(BookingStatus::Completed),
            actor,
            DateTime::now(),
        )
        .unwrap();

        let completion = set.get_document("completion").unwrap();
        assert_eq!(completion.get_object_id("completed_by").unwrap(), actor);
        assert_eq!(completion.get_str("notes").unwrap(), "All done");
    }

    #[test]
    fn worker_cancel_falls_back_to_message_as_reason() {
        let set = worker_transition_fields(
            BookingStatus::Cancelled,
            &status_dto(BookingStatus::Cancelled),
            ObjectId::new(),
            DateTime::now(),
        )
        .unwrap();
        let cancellation = set.get_document("cancellation").unwrap();
        assert_eq!(cancellation.get_str("reason").unwrap(), "On my way");
        assert_eq!(cancellation.get_f64("refund_amount").unwrap(), 0.0);
    }

    #[test]
    fn workers_list_by_owner_employers_by_themselves() {
        let id = ObjectId::new();
        let worker = AuthGuard {
            user_id: id,
            email: "w@example.com".into(),
            role: Role::Worker,
        };
        assert_eq!(party_filter(&worker, None), doc! { "worker_user_id": id });

        let employer = AuthGuard {
            user_id: id,
            email: "e@example.com".into(),
            role: Role::Employer,
        };
        assert_eq!(
            party_filter(&employer, Some(BookingStatus::Pending)),
            doc! { "employer_id": id, "status": "pending" }
        );
    }
}
