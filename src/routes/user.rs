use mongodb::bson::{DateTime, Document, doc};
use mongodb::options::{FindOneAndUpdateOptions, ReturnDocument};
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::db::{self, DbConn};
use crate::guards::AdminGuard;
use crate::models::{Role, UpdateUserStatusDto, User, UserResponse};
use crate::utils::{ApiError, ApiResponse, Page, parse_id};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn role_filter(role: Option<&str>) -> Result<Document, ApiError> {
    match role {
        None | Some("") => Ok(doc! {}),
        Some(role) => {
            let role: Role = serde_json::from_value(serde_json::Value::String(role.to_string()))
                .map_err(|_| ApiError::bad_request("Role must be employer, worker or admin"))?;
            Ok(doc! { "role": role.as_str() })
        }
    }
}

#[openapi(tag = "User")]
#[get("/users?<query..>")]
pub async fn list_users(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: UserListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Page::new(query.page, query.limit, 20);
    let filter = role_filter(query.role.as_deref())?;
    let users = db.collection::<User>(db::USERS);

    let found: Vec<User> = users
        .find(filter.clone(), page.find_options(doc! { "created_at": -1 }))
        .await?
        .try_collect()
        .await?;
    let total = users.count_documents(filter, None).await?;

    let found: Vec<UserResponse> = found.into_iter().map(UserResponse::from).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "users": found,
        "pagination": page.summary(total),
    }))))
}

#[openapi(tag = "User")]
#[put("/users/<user_id>/status", data = "<dto>")]
pub async fn update_user_status(
    db: &State<DbConn>,
    admin: AdminGuard,
    user_id: String,
    dto: Json<UpdateUserStatusDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user_id = parse_id(&user_id, "user")?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let user = db
        .collection::<User>(db::USERS)
        .find_one_and_update(
            doc! { "_id": user_id },
            doc! { "$set": { "is_active": dto.is_active, "updated_at": DateTime::now() } },
            options,
        )
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    log::info!(
        "User {} {} by admin {}",
        user.email,
        if dto.is_active { "activated" } else { "deactivated" },
        admin.auth.user_id
    );

    let message = if dto.is_active {
        "User activated successfully"
    } else {
        "User deactivated successfully"
    };
    Ok(Json(ApiResponse::success_with_message(message, UserResponse::from(user))))
}
