use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::models::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtService;

impl JwtService {
    pub fn generate_token(
        user_id: &ObjectId,
        email: &str,
        role: Role,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        Self::sign(
            user_id,
            email,
            role,
            crate::config::Config::jwt_expiry(),
            &crate::config::Config::jwt_secret(),
        )
    }

    pub fn verify_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        Self::decode_with(token, &crate::config::Config::jwt_secret())
    }

    fn sign(
        user_id: &ObjectId,
        email: &str,
        role: Role,
        expiry: i64,
        secret: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: user_id.to_hex(),
            email: email.to_string(),
            role,
            exp: now + expiry,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    fn decode_with(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_claims_decode_with_same_secret() {
        let id = ObjectId::new();
        let token = JwtService::sign(&id, "jane@example.com", Role::Worker, 3600, "s3cret").unwrap();
        let claims = JwtService::decode_with(&token, "s3cret").unwrap();

        assert_eq!(claims.sub, id.to_hex());
        assert_eq!(claims.role, Role::Worker);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token =
            JwtService::sign(&ObjectId::new(), "a@b.co", Role::Admin, 3600, "one").unwrap();
        assert!(JwtService::decode_with(&token, "two").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token =
            JwtService::sign(&ObjectId::new(), "a@b.co", Role::Employer, -3600, "key").unwrap();
        assert!(JwtService::decode_with(&token, "key").is_err());
    }
}
