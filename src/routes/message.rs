use mongodb::bson::{self, DateTime, Document, doc, oid::ObjectId};
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::{self, DbConn};
use crate::guards::AuthGuard;
use crate::models::{Message, MessageResponse, SendMessageDto};
use crate::services::lookup;
use crate::utils::{ApiError, ApiResponse, Page, parse_id};

fn between(a: ObjectId, b: ObjectId) -> Document {
    doc! {
        "$or": [
            { "sender_id": a, "receiver_id": b },
            { "sender_id": b, "receiver_id": a },
        ]
    }
}

fn unread_from(sender: ObjectId, receiver: ObjectId) -> Document {
    doc! { "sender_id": sender, "receiver_id": receiver, "is_read": false }
}

async fn mark_read(db: &DbConn, sender: ObjectId, receiver: ObjectId) -> Result<u64, ApiError> {
    let result = db
        .collection::<Message>(db::MESSAGES)
        .update_many(
            unread_from(sender, receiver),
            doc! { "$set": { "is_read": true, "read_at": DateTime::now() } },
            None,
        )
        .await?;
    Ok(result.modified_count)
}

/// One group per counterpart, newest message first.
fn conversations_pipeline(me: ObjectId) -> Vec<Document> {
    vec![
        doc! { "$match": { "$or": [ { "sender_id": me }, { "receiver_id": me } ] } },
        doc! { "$sort": { "created_at": -1 } },
        doc! {
            "$group": {
                "_id": { "$cond": [ { "$eq": [ "$sender_id", me ] }, "$receiver_id", "$sender_id" ] },
                "last_message": { "$first": "$$ROOT" },
                "unread_count": {
                    "$sum": {
                        "$cond": [
                            { "$and": [ { "$eq": [ "$receiver_id", me ] }, { "$eq": [ "$is_read", false ] } ] },
                            1,
                            0
                        ]
                    }
                }
            }
        },
        doc! { "$sort": { "last_message.created_at": -1 } },
    ]
}

#[openapi(tag = "Message")]
#[post("/messages", data = "<dto>")]
pub async fn send_message(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<SendMessageDto>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    dto.validate()?;
    let receiver_id = parse_id(&dto.receiver_id, "receiver")?;

    if receiver_id == auth.user_id {
        return Err(ApiError::bad_request("You cannot send a message to yourself"));
    }
    lookup::find_user(db, receiver_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Receiver not found"))?;

    let booking_id = match &dto.booking_id {
        Some(id) => Some(parse_id(id, "booking")?),
        None => None,
    };

    let dto = dto.into_inner();
    let mut message = Message {
        id: None,
        sender_id: auth.user_id,
        receiver_id,
        content: dto.content.trim().to_string(),
        message_type: dto.message_type,
        file_url: dto.file_url,
        is_read: false,
        read_at: None,
        booking_id,
        created_at: DateTime::now(),
    };

    let result = db
        .collection::<Message>(db::MESSAGES)
        .insert_one(&message, None)
        .await?;
    message.id = result.inserted_id.as_object_id();

    Ok(Json(ApiResponse::success_with_message(
        "Message sent successfully",
        MessageResponse::from(message),
    )))
}

#[openapi(tag = "Message")]
#[get("/messages/conversations")]
pub async fn get_conversations(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<Vec<serde_json::Value>>>, ApiError> {
    let mut cursor = db
        .collection::<Message>(db::MESSAGES)
        .aggregate(conversations_pipeline(auth.user_id), None)
        .await?;

    let mut groups = Vec::new();
    while cursor.advance().await? {
        let group = cursor.deserialize_current()?;
        let Ok(counterpart) = group.get_object_id("_id") else {
            continue;
        };
        let last: Message = bson::from_document(group.get_document("last_message").cloned().unwrap_or_default())
            .map_err(|e| ApiError::internal_error(format!("Deserialization error: {}", e)))?;
        let unread = group.get_i32("unread_count").unwrap_or(0);
        groups.push((counterpart, last, unread));
    }

    let users = lookup::user_summaries(db, groups.iter().map(|(id, _, _)| *id)).await?;

    let conversations = groups
        .into_iter()
        .map(|(counterpart, last, unread)| {
            serde_json::json!({
                "user": users.get(&counterpart).cloned(),
                "user_id": counterpart.to_hex(),
                "last_message": MessageResponse::from(last),
                "unread_count": unread,
            })
        })
        .collect();

    Ok(Json(ApiResponse::success(conversations)))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct ConversationQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[openapi(tag = "Message")]
#[get("/messages/conversation/<user_id>?<query..>")]
pub async fn get_conversation(
    db: &State<DbConn>,
    auth: AuthGuard,
    user_id: String,
    query: ConversationQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit, 50);
    let other_id = parse_id(&user_id, "user")?;

    let other = lookup::find_user(db, other_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let filter = between(auth.user_id, other_id);
    let messages = db.collection::<Message>(db::MESSAGES);

    // Newest page first, then flipped into reading order
    let mut found: Vec<Message> = messages
        .find(filter.clone(), page.find_options(doc! { "created_at": -1 }))
        .await?
        .try_collect()
        .await?;
    found.reverse();
    let total = messages.count_documents(filter, None).await?;

    mark_read(db, other_id, auth.user_id).await?;

    let found: Vec<MessageResponse> = found.into_iter().map(MessageResponse::from).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "user": crate::models::UserSummary::from(&other),
        "messages": found,
        "pagination": page.summary(total),
    }))))
}

#[openapi(tag = "Message")]
#[put("/messages/read/<sender_id>")]
pub async fn mark_as_read(
    db: &State<DbConn>,
    auth: AuthGuard,
    sender_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let sender_id = parse_id(&sender_id, "sender")?;
    let updated = mark_read(db, sender_id, auth.user_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Messages marked as read",
        serde_json::json!({ "updated": updated }),
    )))
}

#[openapi(tag = "Message")]
#[get("/messages/unread-count")]
pub async fn get_unread_count(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let count = db
        .collection::<Message>(db::MESSAGES)
        .count_documents(doc! { "receiver_id": auth.user_id, "is_read": false }, None)
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!({ "unread_count": count }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_filter_covers_both_directions() {
        let (a, b) = (ObjectId::new(), ObjectId::new());
        let filter = between(a, b);
        let branches = filter.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[1].as_document().unwrap(),
            &doc! { "sender_id": b, "receiver_id": a }
        );
    }

    #[test]
    fn only_unread_messages_to_the_reader_are_marked() {
        let (sender, reader) = (ObjectId::new(), ObjectId::new());
        assert_eq!(
            unread_from(sender, reader),
            doc! { "sender_id": sender, "receiver_id": reader, "is_read": false }
        );
    }

    #[test]
    fn conversations_group_by_counterpart() {
        let me = ObjectId::new();
        let pipeline = conversations_pipeline(me);
        assert_eq!(pipeline.len(), 4);
        let group = pipeline[2].get_document("$group").unwrap();
        assert!(group.contains_key("last_message"));
        assert!(group.contains_key("unread_count"));
    }
}
