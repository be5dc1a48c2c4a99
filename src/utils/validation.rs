use mongodb::bson::oid::ObjectId;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use validator::ValidationError;

use super::ApiError;

fn kenyan_phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\+254|0)[17]\d{8}$").expect("static phone pattern"))
}

fn clock_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([01]?[0-9]|2[0-3]):[0-5][0-9]$").expect("static time pattern"))
}

pub fn is_kenyan_phone(phone: &str) -> bool {
    kenyan_phone_re().is_match(phone)
}

pub fn is_clock_time(value: &str) -> bool {
    clock_time_re().is_match(value)
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if is_kenyan_phone(phone) {
        Ok(())
    } else {
        Err(invalid(
            "phone",
            "must be a Kenyan number like +254712345678 or 0712345678",
        ))
    }
}

pub fn validate_clock_time(value: &str) -> Result<(), ValidationError> {
    if is_clock_time(value) {
        Ok(())
    } else {
        Err(invalid("time", "must be a 24h time in HH:MM format"))
    }
}

pub fn validate_object_id(value: &str) -> Result<(), ValidationError> {
    ObjectId::parse_str(value)
        .map(|_| ())
        .map_err(|_| invalid("object_id", "must be a valid id"))
}

/// Parses a path or body id, naming the entity in the error message.
pub fn parse_id(value: &str, entity: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::bad_request(format!("Invalid {} ID", entity)))
}

/// Zero-pads "8:05" to "08:05" so lexical comparison matches clock order.
pub fn normalize_clock_time(value: &str) -> String {
    match value.split_once(':') {
        Some((h, m)) if h.len() == 1 => format!("0{}:{}", h, m),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_kenyan_numbers() {
        assert!(is_kenyan_phone("+254712345678"));
        assert!(is_kenyan_phone("0712345678"));
        assert!(is_kenyan_phone("0112345678"));
    }

    #[test]
    fn rejects_foreign_or_short_numbers() {
        assert!(!is_kenyan_phone("+255712345678"));
        assert!(!is_kenyan_phone("071234567"));
        assert!(!is_kenyan_phone("0812345678"));
    }

    #[test]
    fn clock_times() {
        assert!(is_clock_time("08:00"));
        assert!(is_clock_time("8:30"));
        assert!(is_clock_time("23:59"));
        assert!(!is_clock_time("24:00"));
        assert!(!is_clock_time("12:60"));
        assert_eq!(normalize_clock_time("8:30"), "08:30");
        assert_eq!(normalize_clock_time("17:00"), "17:00");
    }

    #[test]
    fn parse_id_names_the_entity() {
        let err = parse_id("not-an-id", "booking").unwrap_err();
        assert_eq!(err.message, "Invalid booking ID");
        assert!(parse_id("507f1f77bcf86cd799439011", "booking").is_ok());
    }
}
