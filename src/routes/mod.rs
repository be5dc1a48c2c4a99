pub mod admin;
pub mod auth;
pub mod booking;
pub mod category;
pub mod health;
pub mod message;
pub mod review;
pub mod user;
pub mod worker;
