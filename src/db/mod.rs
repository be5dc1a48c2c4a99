pub mod seed;

use mongodb::bson::{Document, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};
use rocket::fairing::AdHoc;

pub const USERS: &str = "users";
pub const WORKERS: &str = "workers";
pub const BOOKINGS: &str = "bookings";
pub const CATEGORIES: &str = "categories";
pub const MESSAGES: &str = "messages";
pub const REVIEWS: &str = "reviews";

pub type DbConn = Database;

pub fn init() -> AdHoc {
    AdHoc::on_ignite("MongoDB", |rocket| async {
        match connect().await {
            Ok(database) => {
                if let Err(e) = ensure_indexes(&database).await {
                    log::warn!("Index creation failed: {}", e);
                }
                log::info!("✓ MongoDB connected successfully");
                rocket.manage(database)
            }
            Err(e) => {
                log::error!("✗ Failed to connect to MongoDB: {}", e);
                log::warn!("Starting server without database connection");
                rocket
            }
        }
    })
}

pub async fn connect() -> Result<Database, mongodb::error::Error> {
    let uri = crate::config::Config::mongodb_uri();
    let client = Client::with_uri_str(&uri).await?;

    client
        .database("admin")
        .run_command(doc! {"ping": 1}, None)
        .await?;

    Ok(client.database(&crate::config::Config::database_name()))
}

fn index(keys: Document, unique: bool) -> IndexModel {
    let options = unique.then(|| IndexOptions::builder().unique(true).build());
    IndexModel::builder().keys(keys).options(options).build()
}

async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    let indexes = [
        (USERS, index(doc! { "email": 1 }, true)),
        (CATEGORIES, index(doc! { "name": 1 }, true)),
        (CATEGORIES, index(doc! { "is_active": 1, "featured": 1 }, false)),
        (REVIEWS, index(doc! { "booking_id": 1 }, true)),
        (WORKERS, index(doc! { "user_id": 1 }, true)),
        (WORKERS, index(doc! { "category_id": 1 }, false)),
        (WORKERS, index(doc! { "status": 1, "verification.is_verified": 1 }, false)),
        (BOOKINGS, index(doc! { "employer_id": 1, "status": 1 }, false)),
        (BOOKINGS, index(doc! { "worker_id": 1, "status": 1 }, false)),
        (BOOKINGS, index(doc! { "worker_user_id": 1, "status": 1 }, false)),
        (BOOKINGS, index(doc! { "scheduled_date": 1 }, false)),
        (MESSAGES, index(doc! { "sender_id": 1, "receiver_id": 1 }, false)),
        (MESSAGES, index(doc! { "created_at": -1 }, false)),
    ];

    for (collection, model) in indexes {
        db.collection::<Document>(collection)
            .create_index(model, None)
            .await?;
    }

    Ok(())
}
