use mongodb::bson::{DateTime, Document, doc, oid::ObjectId};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};

use crate::db::{self, DbConn};
use crate::models::{Category, RatingSummary, WorkerProfile, star_slot};
use crate::utils::ApiError;

fn listed_worker_filter(category_id: ObjectId) -> Document {
    doc! {
        "category_id": category_id,
        "status": "active",
        "verification.is_verified": true,
    }
}

/// Recomputes `worker_count` and `average_hourly_rate` from verified active workers.
pub async fn refresh_category_stats(db: &DbConn, category_id: ObjectId) -> Result<(), ApiError> {
    let workers = db.collection::<WorkerProfile>(db::WORKERS);

    let count = workers
        .count_documents(listed_worker_filter(category_id), None)
        .await?;

    let pipeline = vec![
        doc! { "$match": listed_worker_filter(category_id) },
        doc! { "$group": { "_id": null, "avg_rate": { "$avg": "$hourly_rate" } } },
    ];
    let mut cursor = workers.aggregate(pipeline, None).await?;
    let average = if cursor.advance().await? {
        cursor
            .deserialize_current()
            .ok()
            .and_then(|d| d.get_f64("avg_rate").ok())
            .map(f64::round)
            .unwrap_or(0.0)
    } else {
        0.0
    };

    db.collection::<Category>(db::CATEGORIES)
        .update_one(
            doc! { "_id": category_id },
            doc! {
                "$set": {
                    "worker_count": count as i32,
                    "average_hourly_rate": average,
                    "updated_at": DateTime::now(),
                }
            },
            None,
        )
        .await?;

    log::info!(
        "Category {} stats refreshed: {} workers, avg rate {}",
        category_id,
        count,
        average
    );
    Ok(())
}

/// Pipeline update that bumps one breakdown bucket and the count, then
/// derives `rating.average` from the bucket values the same write produced.
fn rating_update(slot: usize) -> Vec<Document> {
    let slot = slot as i32;
    vec![
        doc! {
            "$set": {
                "rating.count": { "$add": ["$rating.count", 1] },
                "rating.breakdown": {
                    "$map": {
                        "input": { "$range": [0, 5] },
                        "as": "i",
                        "in": {
                            "$add": [
                                { "$arrayElemAt": ["$rating.breakdown", "$$i"] },
                                { "$cond": [{ "$eq": ["$$i", slot] }, 1, 0] }
                            ]
                        }
                    }
                },
                "updated_at": DateTime::now(),
            }
        },
        doc! {
            "$set": {
                "rating.average": {
                    "$cond": [
                        { "$eq": [{ "$sum": "$rating.breakdown" }, 0] },
                        0.0,
                        {
                            "$divide": [
                                {
                                    "$sum": {
                                        "$map": {
                                            "input": { "$range": [0, 5] },
                                            "as": "i",
                                            "in": {
                                                "$multiply": [
                                                    { "$add": ["$$i", 1] },
                                                    { "$arrayElemAt": ["$rating.breakdown", "$$i"] }
                                                ]
                                            }
                                        }
                                    }
                                },
                                { "$sum": "$rating.breakdown" }
                            ]
                        }
                    ]
                }
            }
        }
    ]
}

/// Adds one star rating to a worker's summary in a single atomic write.
pub async fn record_worker_rating(
    db: &DbConn,
    worker_id: ObjectId,
    stars: i32,
) -> Result<RatingSummary, ApiError> {
    let slot = star_slot(stars).ok_or_else(|| ApiError::bad_request("Rating must be between 1 and 5"))?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let updated = db
        .collection::<WorkerProfile>(db::WORKERS)
        .find_one_and_update(doc! { "_id": worker_id }, rating_update(slot), options)
        .await?
        .ok_or_else(|| ApiError::not_found("Worker not found"))?;

    Ok(updated.rating)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_workers_are_verified_and_active() {
        let filter = listed_worker_filter(ObjectId::new());
        assert_eq!(filter.get_str("status").unwrap(), "active");
        assert!(filter.get_bool("verification.is_verified").unwrap());
    }

    #[test]
    fn rating_average_is_derived_in_the_same_write() {
        let pipeline = rating_update(3);
        assert_eq!(pipeline.len(), 2);

        let counters = pipeline[0].get_document("$set").unwrap();
        assert!(counters.contains_key("rating.count"));
        let bump = counters
            .get_document("rating.breakdown")
            .unwrap()
            .get_document("$map")
            .unwrap()
            .get_document("in")
            .unwrap();
        let cond = bump.get_array("$add").unwrap()[1].as_document().unwrap();
        let test = cond.get_array("$cond").unwrap()[0].as_document().unwrap();
        assert_eq!(test.get_array("$eq").unwrap()[1].as_i32(), Some(3));

        // The average reads the post-increment breakdown, not a value from the client.
        let average = pipeline[1].get_document("$set").unwrap();
        assert_eq!(average.keys().collect::<Vec<_>>(), vec!["rating.average"]);
        assert!(format!("{}", average).contains("$rating.breakdown"));
    }
}
