use bcrypt::BcryptError;

pub struct PasswordService;

impl PasswordService {
    pub fn hash(password: &str) -> Result<String, BcryptError> {
        bcrypt::hash(password, crate::config::Config::bcrypt_cost())
    }

    pub fn verify(password: &str, hash: &str) -> Result<bool, BcryptError> {
        bcrypt::verify(password, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = bcrypt::hash("password123", 4).unwrap();
        assert_ne!(hash, "password123");
        assert!(PasswordService::verify("password123", &hash).unwrap());
        assert!(!PasswordService::verify("password124", &hash).unwrap());
    }
}
