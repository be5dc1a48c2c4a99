pub mod booking;
pub mod category;
pub mod message;
pub mod review;
pub mod user;
pub mod worker;

pub use booking::*;
pub use category::*;
pub use message::*;
pub use review::*;
pub use user::*;
pub use worker::*;
