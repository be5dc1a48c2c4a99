use mongodb::bson::{doc, oid::ObjectId};
use rocket::futures::TryStreamExt;
use std::collections::HashMap;

use crate::db::{self, DbConn};
use crate::models::{User, UserSummary, WorkerProfile};
use crate::utils::ApiError;

/// Batch-loads user summaries for the given ids; unknown ids are skipped.
pub async fn user_summaries(
    db: &DbConn,
    ids: impl IntoIterator<Item = ObjectId>,
) -> Result<HashMap<ObjectId, UserSummary>, ApiError> {
    let mut ids: Vec<ObjectId> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users: Vec<User> = db
        .collection::<User>(db::USERS)
        .find(doc! { "_id": { "$in": ids } }, None)
        .await?
        .try_collect()
        .await?;

    Ok(users
        .iter()
        .filter_map(|u| u.id.map(|id| (id, UserSummary::from(u))))
        .collect())
}

pub async fn find_user(db: &DbConn, id: ObjectId) -> Result<Option<User>, ApiError> {
    Ok(db
        .collection::<User>(db::USERS)
        .find_one(doc! { "_id": id }, None)
        .await?)
}

pub async fn worker_for_user(db: &DbConn, user_id: ObjectId) -> Result<Option<WorkerProfile>, ApiError> {
    Ok(db
        .collection::<WorkerProfile>(db::WORKERS)
        .find_one(doc! { "user_id": user_id }, None)
        .await?)
}
