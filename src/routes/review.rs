use mongodb::bson::{self, Bson, DateTime, Document, doc, oid::ObjectId};
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::{self, DbConn};
use crate::guards::AuthGuard;
use crate::models::{
    Booking, BookingStatus, CreateReviewDto, Review, ReviewResponse, SideRating,
};
use crate::services::{lookup, stats};
use crate::utils::{ApiError, ApiResponse, Page, parse_id};

/// Which side of a booking is leaving the rating.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Reviewer {
    Employer,
    Worker,
}

impl Reviewer {
    fn of(booking: &Booking, user_id: &ObjectId) -> Option<Self> {
        if &booking.employer_id == user_id {
            Some(Reviewer::Employer)
        } else if &booking.worker_user_id == user_id {
            Some(Reviewer::Worker)
        } else {
            None
        }
    }

    fn rating_field(&self) -> &'static str {
        match self {
            Reviewer::Employer => "ratings.employer_rating",
            Reviewer::Worker => "ratings.worker_rating",
        }
    }

    /// Filter and update that write this side's rating only while its slot is empty.
    fn claim(&self, booking_id: ObjectId, rating: Bson, now: DateTime) -> (Document, Document) {
        let field = self.rating_field();
        let mut filter = doc! { "_id": booking_id };
        filter.insert(field, doc! { "$eq": null });
        let mut set = doc! { "updated_at": now };
        set.insert(field, rating);
        (filter, doc! { "$set": set })
    }

    fn has_rated(&self, booking: &Booking) -> bool {
        match self {
            Reviewer::Employer => booking.ratings.employer_rating.is_some(),
            Reviewer::Worker => booking.ratings.worker_rating.is_some(),
        }
    }
}

#[openapi(tag = "Review")]
#[post("/reviews", data = "<dto>")]
pub async fn create_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateReviewDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let booking_id = parse_id(&dto.booking_id, "booking")?;

    let bookings = db.collection::<Booking>(db::BOOKINGS);
    let booking = bookings
        .find_one(doc! { "_id": booking_id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;

    if booking.status != BookingStatus::Completed {
        return Err(ApiError::bad_request("Can only review completed bookings"));
    }

    let reviewer = Reviewer::of(&booking, &auth.user_id)
        .ok_or_else(|| ApiError::forbidden("Not authorized to review this booking"))?;
    if reviewer.has_rated(&booking) {
        return Err(ApiError::bad_request("Review already exists for this booking"));
    }

    let now = DateTime::now();
    let side = SideRating {
        rating: dto.rating,
        review: Some(dto.comment.clone()),
        rated_at: now,
    };
    let side_bson = bson::to_bson(&side)
        .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;

    let (filter, update) = reviewer.claim(booking_id, side_bson, now);
    let claimed = bookings.update_one(filter, update, None).await?;
    if claimed.modified_count == 0 {
        return Err(ApiError::bad_request("Review already exists for this booking"));
    }

    let mut data = serde_json::json!({
        "rating": side.rating,
        "review": side.review,
        "rated_at": crate::utils::iso(side.rated_at),
    });

    if reviewer == Reviewer::Employer {
        let mut review = Review {
            id: None,
            booking_id,
            worker_id: booking.worker_id,
            employer_id: booking.employer_id,
            rating: dto.rating,
            comment: dto.comment.trim().to_string(),
            aspects: dto.aspects.clone(),
            is_anonymous: dto.is_anonymous,
            created_at: now,
            updated_at: now,
        };
        let result = db
            .collection::<Review>(db::REVIEWS)
            .insert_one(&review, None)
            .await?;
        review.id = result.inserted_id.as_object_id();

        let summary = stats::record_worker_rating(db, booking.worker_id, dto.rating).await?;
        log::info!(
            "Worker {} rated {} (now {:.2} over {} reviews)",
            booking.worker_id,
            dto.rating,
            summary.average,
            summary.count
        );

        let reviewer = lookup::find_user(db, auth.user_id)
            .await?
            .map(|u| crate::models::UserSummary::from(&u));
        data = serde_json::json!({
            "review": ReviewResponse::new(review, reviewer),
            "worker_rating": summary,
        });
    }

    Ok(Json(ApiResponse::success_with_message(
        "Review submitted successfully",
        data,
    )))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct WorkerReviewsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[openapi(tag = "Review")]
#[get("/reviews/worker/<worker_id>?<query..>")]
pub async fn get_worker_reviews(
    db: &State<DbConn>,
    worker_id: String,
    query: WorkerReviewsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit, 10);
    let worker_id = parse_id(&worker_id, "worker")?;

    let filter = doc! { "worker_id": worker_id };
    let reviews = db.collection::<Review>(db::REVIEWS);

    let found: Vec<Review> = reviews
        .find(filter.clone(), page.find_options(doc! { "created_at": -1 }))
        .await?
        .try_collect()
        .await?;
    let total = reviews.count_documents(filter, None).await?;

    let reviewers = lookup::user_summaries(
        db,
        found.iter().filter(|r| !r.is_anonymous).map(|r| r.employer_id),
    )
    .await?;

    let found: Vec<ReviewResponse> = found
        .into_iter()
        .map(|review| {
            let reviewer = reviewers.get(&review.employer_id).cloned();
            ReviewResponse::new(review, reviewer)
        })
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "reviews": found,
        "pagination": page.summary(total),
    }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BookingRatings, JobLocation, PaymentMethod, PaymentStatus,
    };

    fn booking(employer: ObjectId, worker_user: ObjectId) -> Booking {
        let now = DateTime::now();
        Booking {
            id: Some(ObjectId::new()),
            employer_id: employer,
            worker_id: ObjectId::new(),
            worker_user_id: worker_user,
            category_id: ObjectId::new(),
            title: "Fix sink".into(),
            description: "Leaking kitchen sink".into(),
            location: JobLocation {
                address: "Kilimani, Nairobi".into(),
                coordinates: None,
            },
            scheduled_date: now,
            start_time: "09:00".into(),
            end_time: "11:00".into(),
            duration_hours: 2,
            hourly_rate: 800.0,
            total_amount: 1600.0,
            status: BookingStatus::Completed,
            payment_status: PaymentStatus::Paid,
            payment_method: PaymentMethod::Mpesa,
            worker_response: None,
            completion: None,
            cancellation: None,
            ratings: BookingRatings::default(),
            special_requirements: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reviewer_side_is_resolved_from_the_booking() {
        let employer = ObjectId::new();
        let worker = ObjectId::new();
        let b = booking(employer, worker);

        assert_eq!(Reviewer::of(&b, &employer), Some(Reviewer::Employer));
        assert_eq!(Reviewer::of(&b, &worker), Some(Reviewer::Worker));
        assert_eq!(Reviewer::of(&b, &ObjectId::new()), None);
    }

    #[test]
    fn rating_slot_is_claimed_only_while_empty() {
        let id = ObjectId::new();
        let now = DateTime::now();
        let (filter, update) = Reviewer::Worker.claim(id, Bson::Int32(4), now);

        assert_eq!(filter.get_object_id("_id").unwrap(), id);
        let slot = filter.get_document("ratings.worker_rating").unwrap();
        assert_eq!(slot.get("$eq"), Some(&Bson::Null));
        assert!(!filter.contains_key("ratings.employer_rating"));

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_i32("ratings.worker_rating").unwrap(), 4);
        assert_eq!(set.get_datetime("updated_at").unwrap(), &now);
    }

    #[test]
    fn each_side_rates_once() {
        let employer = ObjectId::new();
        let mut b = booking(employer, ObjectId::new());
        assert!(!Reviewer::Employer.has_rated(&b));

        b.ratings.employer_rating = Some(SideRating {
            rating: 5,
            review: None,
            rated_at: DateTime::now(),
        });
        assert!(Reviewer::Employer.has_rated(&b));
        assert!(!Reviewer::Worker.has_rated(&b));
        assert_eq!(Reviewer::Worker.rating_field(), "ratings.worker_rating");
    }
}
