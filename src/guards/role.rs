use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use super::AuthGuard;
use crate::models::Role;

fn check_role(auth: AuthGuard, role: Role) -> Result<AuthGuard, AuthGuard> {
    if auth.role == role {
        Ok(auth)
    } else {
        Err(auth)
    }
}

async fn require_role<'r>(req: &'r Request<'_>, role: Role) -> request::Outcome<AuthGuard, ()> {
    match req.guard::<AuthGuard>().await {
        Outcome::Success(auth) => match check_role(auth, role) {
            Ok(auth) => Outcome::Success(auth),
            Err(auth) => {
                log::warn!(
                    "{} {} denied: {} role required, caller is {}",
                    req.method(),
                    req.uri(),
                    role.as_str(),
                    auth.role.as_str()
                );
                Outcome::Error((Status::Forbidden, ()))
            }
        },
        Outcome::Error(e) => Outcome::Error(e),
        Outcome::Forward(f) => Outcome::Forward(f),
    }
}

macro_rules! role_guard {
    ($(#[$doc:meta])* $name:ident, $role:expr) => {
        $(#[$doc])*
        pub struct $name {
            pub auth: AuthGuard,
        }

        #[rocket::async_trait]
        impl<'r> FromRequest<'r> for $name {
            type Error = ();

            async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
                require_role(req, $role).await.map(|auth| $name { auth })
            }
        }

        impl<'a> OpenApiFromRequest<'a> for $name {
            fn from_request_input(
                _gen: &mut OpenApiGenerator,
                _name: String,
                _required: bool,
            ) -> rocket_okapi::Result<RequestHeaderInput> {
                Ok(RequestHeaderInput::None)
            }
        }
    };
}

role_guard!(
    /// Authenticated caller with the employer role.
    EmployerGuard,
    Role::Employer
);
role_guard!(
    /// Authenticated caller with the worker role.
    WorkerGuard,
    Role::Worker
);
role_guard!(
    /// Authenticated caller with the admin role.
    AdminGuard,
    Role::Admin
);

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use rocket::http::Header;
    use rocket::local::asynchronous::Client;

    #[rocket::get("/admin-only")]
    fn admin_only(_admin: AdminGuard) -> &'static str {
        "ok"
    }

    fn caller(role: Role) -> AuthGuard {
        AuthGuard {
            user_id: ObjectId::new(),
            email: "x@example.com".into(),
            role,
        }
    }

    #[test]
    fn only_the_required_role_passes() {
        assert!(check_role(caller(Role::Admin), Role::Admin).is_ok());
        assert!(check_role(caller(Role::Worker), Role::Admin).is_err());
        assert!(check_role(caller(Role::Employer), Role::Worker).is_err());
    }

    #[rocket::async_test]
    async fn authentication_failures_pass_through() {
        let client = Client::tracked(rocket::build().mount("/", rocket::routes![admin_only]))
            .await
            .unwrap();

        let res = client.get("/admin-only").dispatch().await;
        assert_eq!(res.status(), Status::Unauthorized);

        let res = client
            .get("/admin-only")
            .header(Header::new("Authorization", "Bearer not.a.jwt"))
            .dispatch()
            .await;
        assert_eq!(res.status(), Status::Unauthorized);
    }
}
