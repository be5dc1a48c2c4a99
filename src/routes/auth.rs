use mongodb::bson::{DateTime, Document, doc};
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::{self, DbConn};
use crate::guards::AuthGuard;
use crate::models::{
    ChangePasswordDto, LoginDto, RegisterDto, Role, UpdateProfileDto, User, UserLocation,
    UserResponse,
};
use crate::services::{JwtService, PasswordService, lookup};
use crate::utils::{ApiError, ApiResponse};

fn issue_token(user: &User) -> Result<String, ApiError> {
    let id = user
        .id
        .ok_or_else(|| ApiError::internal_error("User has no id"))?;
    JwtService::generate_token(&id, &user.email, user.role)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// --------------------
/// Register
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    if dto.role == Role::Admin {
        return Err(ApiError::bad_request("Role must be employer or worker"));
    }

    let email = normalize_email(&dto.email);
    let users = db.collection::<User>(db::USERS);

    if users
        .find_one(doc! { "email": &email }, None)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("User already exists with this email"));
    }

    let now = DateTime::now();
    let mut user = User {
        id: None,
        first_name: dto.first_name.trim().to_string(),
        last_name: dto.last_name.trim().to_string(),
        email,
        phone: dto.phone.clone(),
        password_hash: PasswordService::hash(&dto.password)?,
        role: dto.role,
        location: UserLocation::from(&dto.location),
        profile_image: None,
        is_verified: false,
        is_active: true,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    };

    let result = users.insert_one(&user, None).await.map_err(|e| {
        // E11000: duplicate key on the unique email index
        if e.to_string().contains("E11000") {
            ApiError::conflict("User already exists with this email")
        } else {
            ApiError::from(e)
        }
    })?;
    user.id = result.inserted_id.as_object_id();

    let token = issue_token(&user)?;
    log::info!("Registered {} as {}", user.email, user.role.as_str());

    Ok(Json(ApiResponse::success_with_message(
        "User registered successfully",
        serde_json::json!({
            "user": UserResponse::from(user),
            "token": token,
        }),
    )))
}

/// --------------------
/// Login
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    let users = db.collection::<User>(db::USERS);
    let mut user = users
        .find_one(doc! { "email": normalize_email(&dto.email) }, None)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !PasswordService::verify(&dto.password, &user.password_hash)? {
        log::warn!("Failed login for {}", user.email);
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    if !user.is_active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }

    let now = DateTime::now();
    users
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": { "last_login_at": now } },
            None,
        )
        .await?;
    user.last_login_at = Some(now);

    let token = issue_token(&user)?;

    Ok(Json(ApiResponse::success_with_message(
        "Login successful",
        serde_json::json!({
            "user": UserResponse::from(user),
            "token": token,
        }),
    )))
}

/// --------------------
/// Profile
/// --------------------
#[openapi(tag = "Auth")]
#[get("/auth/profile")]
pub async fn get_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = lookup::find_user(db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}

#[openapi(tag = "Auth")]
#[put("/auth/profile", data = "<dto>")]
pub async fn update_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<UpdateProfileDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    dto.validate()?;

    let mut update = Document::new();
    if let Some(first_name) = &dto.first_name {
        update.insert("first_name", first_name.trim());
    }
    if let Some(last_name) = &dto.last_name {
        update.insert("last_name", last_name.trim());
    }
    if let Some(phone) = &dto.phone {
        update.insert("phone", phone.as_str());
    }
    if let Some(location) = &dto.location {
        let location = mongodb::bson::to_bson(&UserLocation::from(location))
            .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;
        update.insert("location", location);
    }
    if let Some(image) = &dto.profile_image {
        update.insert("profile_image", image.as_str());
    }

    if update.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    update.insert("updated_at", DateTime::now());

    db.collection::<User>(db::USERS)
        .update_one(doc! { "_id": auth.user_id }, doc! { "$set": update }, None)
        .await?;

    let user = lookup::find_user(db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully",
        UserResponse::from(user),
    )))
}

#[openapi(tag = "Auth")]
#[put("/auth/change-password", data = "<dto>")]
pub async fn change_password(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<ChangePasswordDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    let user = lookup::find_user(db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !PasswordService::verify(&dto.current_password, &user.password_hash)? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    db.collection::<User>(db::USERS)
        .update_one(
            doc! { "_id": auth.user_id },
            doc! {
                "$set": {
                    "password_hash": PasswordService::hash(&dto.new_password)?,
                    "updated_at": DateTime::now(),
                }
            },
            None,
        )
        .await?;

    log::info!("Password changed for {}", auth.email);

    Ok(Json(ApiResponse::success_with_message(
        "Password changed successfully",
        serde_json::json!({}),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_matched_case_insensitively() {
        assert_eq!(normalize_email("  John.Doe@Example.COM "), "john.doe@example.com");
    }
}
