use mongodb::bson::{doc, oid::ObjectId};
use rocket::State;
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};

// === OpenAPI (compatible with rocket_okapi 0.8.0 / 0.8.1) ===
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::db::{self, DbConn};
use crate::models::{Role, User};

/// JWT-based authentication guard.
///
/// The token only names the account; role and active flag come from the
/// stored user, so deactivation and role changes apply immediately.
pub struct AuthGuard {
    pub user_id: ObjectId,
    pub email: String,
    pub role: Role,
}

impl AuthGuard {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves a verified token subject against its stored account.
fn authorize(user_id: ObjectId, account: Option<User>) -> Result<AuthGuard, Status> {
    let Some(user) = account else {
        return Err(Status::Unauthorized);
    };
    if !user.is_active {
        return Err(Status::Forbidden);
    }
    Ok(AuthGuard {
        user_id,
        email: user.email,
        role: user.role,
    })
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(token) = req.headers().get_one("Authorization").and_then(bearer_token) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let claims = match crate::services::JwtService::verify_token(token) {
            Ok(claims) => claims,
            Err(e) => {
                log::debug!("Rejected bearer token: {}", e);
                return Outcome::Error((Status::Unauthorized, ()));
            }
        };

        let Ok(user_id) = ObjectId::parse_str(&claims.sub) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let Outcome::Success(conn) = req.guard::<&State<DbConn>>().await else {
            log::error!("No database available to authenticate {}", req.uri());
            return Outcome::Error((Status::ServiceUnavailable, ()));
        };

        let account = match conn
            .collection::<User>(db::USERS)
            .find_one(doc! { "_id": user_id }, None)
            .await
        {
            Ok(account) => account,
            Err(e) => {
                log::error!("Account lookup for {} failed: {}", user_id, e);
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        match authorize(user_id, account) {
            Ok(auth) => Outcome::Success(auth),
            Err(status) => {
                log::warn!("Token for {} rejected with {}", user_id, status);
                Outcome::Error((status, ()))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserLocation;
    use mongodb::bson::DateTime;
    use rocket::http::Header;
    use rocket::local::asynchronous::Client;

    #[rocket::get("/whoami")]
    fn whoami(auth: AuthGuard) -> String {
        format!("{}:{}", auth.user_id.to_hex(), auth.role.as_str())
    }

    async fn client() -> Client {
        let rocket = rocket::build().mount("/", rocket::routes![whoami]);
        Client::tracked(rocket).await.unwrap()
    }

    fn account(role: Role, is_active: bool) -> User {
        User {
            id: Some(ObjectId::new()),
            first_name: "Jane".into(),
            last_name: "Smith".into(),
            email: "jane.smith@example.com".into(),
            phone: "0723456789".into(),
            password_hash: "hash".into(),
            role,
            location: UserLocation {
                county: "Nairobi".into(),
                city: "Westlands".into(),
                coordinates: None,
            },
            profile_image: None,
            is_verified: true,
            is_active,
            last_login_at: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("abc"), None);
        assert_eq!(bearer_token("Bearer   "), None);
    }

    #[test]
    fn role_comes_from_the_stored_account() {
        let id = ObjectId::new();
        let auth = authorize(id, Some(account(Role::Worker, true))).unwrap();
        assert_eq!(auth.user_id, id);
        assert_eq!(auth.role, Role::Worker);
        assert_eq!(auth.email, "jane.smith@example.com");
    }

    #[test]
    fn deactivated_account_is_forbidden() {
        let err = authorize(ObjectId::new(), Some(account(Role::Employer, false)))
            .err()
            .unwrap();
        assert_eq!(err, Status::Forbidden);
    }

    #[test]
    fn deleted_account_is_unauthorized() {
        let err = authorize(ObjectId::new(), None).err().unwrap();
        assert_eq!(err, Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn missing_token_is_unauthorized() {
        let client = client().await;
        let res = client.get("/whoami").dispatch().await;
        assert_eq!(res.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn garbage_token_is_unauthorized() {
        let client = client().await;
        let res = client
            .get("/whoami")
            .header(Header::new("Authorization", "Bearer not.a.jwt"))
            .dispatch()
            .await;
        assert_eq!(res.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn valid_token_without_database_is_unavailable() {
        let token = crate::services::JwtService::generate_token(
            &ObjectId::new(),
            "john.doe@example.com",
            Role::Employer,
        )
        .unwrap();

        let client = client().await;
        let res = client
            .get("/whoami")
            .header(Header::new("Authorization", format!("Bearer {}", token)))
            .dispatch()
            .await;
        assert_eq!(res.status(), Status::ServiceUnavailable);
    }
}
