use mongodb::bson::{DateTime, Document, doc, oid::ObjectId};

use super::{CATEGORIES, DbConn, USERS, WORKERS};
use crate::models::{
    Category, CategoryRequirement, GeoPoint, RatingSummary, Role, Skill, SkillLevel, User,
    UserLocation, Verification, WeeklyAvailability, WorkerDocuments, WorkerProfile, WorkerStatus,
};
use crate::services::{PasswordService, stats};
use crate::utils::ApiError;

struct CategorySeed {
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    featured: bool,
    requirements: &'static [(&'static str, &'static str, bool)],
    tags: &'static [&'static str],
}

const CATEGORY_SEEDS: [CategorySeed; 8] = [
    CategorySeed {
        name: "House Cleaning",
        description: "Professional house cleaning services including deep cleaning, regular maintenance, and organizing",
        icon: "sparkles",
        featured: true,
        requirements: &[
            ("Own cleaning supplies", "Must provide own cleaning supplies and equipment", false),
            ("Background check", "Must pass background verification", true),
        ],
        tags: &["cleaning", "housekeeping", "maintenance", "organizing"],
    },
    CategorySeed {
        name: "Plumbing",
        description: "Plumbing repairs, installations, and maintenance services",
        icon: "wrench",
        featured: true,
        requirements: &[
            ("Plumbing certification", "Valid plumbing certification or equivalent experience", true),
            ("Own tools", "Must have basic plumbing tools", true),
        ],
        tags: &["plumbing", "repairs", "installation", "pipes", "water"],
    },
    CategorySeed {
        name: "Electrical Work",
        description: "Electrical installations, repairs, and maintenance",
        icon: "zap",
        featured: true,
        requirements: &[
            ("Electrical license", "Valid electrical license required", true),
            ("Safety training", "Electrical safety training certification", true),
        ],
        tags: &["electrical", "wiring", "installation", "repairs", "lighting"],
    },
    CategorySeed {
        name: "Gardening",
        description: "Garden maintenance, landscaping, and plant care services",
        icon: "flower",
        featured: false,
        requirements: &[("Gardening experience", "Proven experience in garden maintenance", false)],
        tags: &["gardening", "landscaping", "plants", "maintenance", "outdoor"],
    },
    CategorySeed {
        name: "Carpentry",
        description: "Furniture making, repairs, and woodwork services",
        icon: "hammer",
        featured: false,
        requirements: &[("Carpentry skills", "Demonstrated carpentry and woodworking skills", true)],
        tags: &["carpentry", "furniture", "woodwork", "repairs", "construction"],
    },
    CategorySeed {
        name: "Painting",
        description: "Interior and exterior painting services",
        icon: "palette",
        featured: false,
        requirements: &[("Painting experience", "Experience in residential or commercial painting", false)],
        tags: &["painting", "interior", "exterior", "decoration", "renovation"],
    },
    CategorySeed {
        name: "Moving & Packing",
        description: "Moving assistance, packing, and furniture relocation",
        icon: "package",
        featured: false,
        requirements: &[("Physical fitness", "Ability to lift heavy items safely", true)],
        tags: &["moving", "packing", "relocation", "furniture", "transport"],
    },
    CategorySeed {
        name: "Pet Care",
        description: "Pet sitting, walking, grooming, and care services",
        icon: "heart",
        featured: false,
        requirements: &[("Animal handling experience", "Experience caring for pets", false)],
        tags: &["pets", "dogs", "cats", "walking", "grooming", "sitting"],
    },
];

fn category(seed: &CategorySeed, sort_order: i32, now: DateTime) -> Category {
    Category {
        id: None,
        name: seed.name.to_string(),
        description: seed.description.to_string(),
        icon: seed.icon.to_string(),
        image: None,
        is_active: true,
        featured: seed.featured,
        sort_order,
        parent_category_id: None,
        subcategory_ids: vec![],
        requirements: seed
            .requirements
            .iter()
            .map(|(title, description, required)| CategoryRequirement {
                title: title.to_string(),
                description: Some(description.to_string()),
                required: *required,
            })
            .collect(),
        tags: seed.tags.iter().map(|t| t.to_string()).collect(),
        worker_count: 0,
        average_hourly_rate: 0.0,
        created_at: now,
        updated_at: now,
    }
}

#[allow(clippy::too_many_arguments)]
fn user(
    first_name: &str,
    last_name: &str,
    email: &str,
    phone: &str,
    password: &str,
    role: Role,
    city: &str,
    coordinates: GeoPoint,
) -> Result<User, ApiError> {
    let now = DateTime::now();
    Ok(User {
        id: None,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        password_hash: PasswordService::hash(password)?,
        role,
        location: UserLocation {
            county: "Nairobi".to_string(),
            city: city.to_string(),
            coordinates: Some(coordinates),
        },
        profile_image: None,
        is_verified: true,
        is_active: true,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    })
}

fn inserted_id(id: &mongodb::bson::Bson) -> Result<ObjectId, ApiError> {
    id.as_object_id()
        .ok_or_else(|| ApiError::internal_error("Inserted document has no ObjectId"))
}

/// Wipes categories, users and workers, then loads the demo data set.
pub async fn run(db: &DbConn) -> Result<(), ApiError> {
    log::info!("Seeding database {}", db.name());

    for collection in [CATEGORIES, USERS, WORKERS] {
        db.collection::<Document>(collection)
            .delete_many(doc! {}, None)
            .await?;
    }
    log::info!("Cleared existing categories, users and workers");

    let now = DateTime::now();
    let categories: Vec<Category> = CATEGORY_SEEDS
        .iter()
        .enumerate()
        .map(|(i, seed)| category(seed, i as i32 + 1, now))
        .collect();
    let inserted = db
        .collection::<Category>(CATEGORIES)
        .insert_many(&categories, None)
        .await?;
    log::info!("Created {} categories", inserted.inserted_ids.len());

    let cleaning_id = inserted
        .inserted_ids
        .get(&0)
        .ok_or_else(|| ApiError::internal_error("House Cleaning category missing"))
        .and_then(inserted_id)?;

    let users = [
        user(
            "John",
            "Doe",
            "john.doe@example.com",
            "+254700123456",
            "password123",
            Role::Employer,
            "Westlands",
            GeoPoint::new(36.8219, -1.2921),
        )?,
        user(
            "Jane",
            "Smith",
            "jane.smith@example.com",
            "+254700654321",
            "password123",
            Role::Worker,
            "Kilimani",
            GeoPoint::new(36.7856, -1.2864),
        )?,
        user(
            "Admin",
            "User",
            "admin@safehire.co.ke",
            "+254700000000",
            "admin123",
            Role::Admin,
            "CBD",
            GeoPoint::new(36.8172, -1.2864),
        )?,
    ];
    let inserted_users = db
        .collection::<User>(USERS)
        .insert_many(&users, None)
        .await?;
    log::info!("Created {} users", inserted_users.inserted_ids.len());

    let worker_user_id = inserted_users
        .inserted_ids
        .get(&1)
        .ok_or_else(|| ApiError::internal_error("Seed worker user missing"))
        .and_then(inserted_id)?;
    let admin_id = inserted_users
        .inserted_ids
        .get(&2)
        .ok_or_else(|| ApiError::internal_error("Seed admin user missing"))
        .and_then(inserted_id)?;

    let worker = WorkerProfile {
        id: None,
        user_id: worker_user_id,
        category_id: cleaning_id,
        skills: vec![
            Skill {
                name: "House Cleaning".to_string(),
                level: SkillLevel::Expert,
                years_of_experience: 5,
            },
            Skill {
                name: "Window Cleaning".to_string(),
                level: SkillLevel::Intermediate,
                years_of_experience: 3,
            },
        ],
        hourly_rate: 800.0,
        daily_rate: Some(6000.0),
        availability: WeeklyAvailability::default(),
        bio: Some(
            "Experienced house cleaner with 5+ years in residential cleaning. \
             Reliable, thorough, and trustworthy."
                .to_string(),
        ),
        portfolio: vec![],
        documents: WorkerDocuments {
            id_card: "sample-id-card.jpg".to_string(),
            police_clearance: "sample-police-clearance.jpg".to_string(),
            certificates: vec![],
        },
        verification: Verification {
            is_verified: true,
            verified_at: Some(now),
            verified_by: Some(admin_id),
            notes: Some("Seed data".to_string()),
        },
        status: WorkerStatus::Active,
        rating: RatingSummary::default(),
        completed_jobs: 0,
        total_earnings: 0.0,
        preferred_locations: vec!["Kilimani".to_string(), "Westlands".to_string()],
        languages: vec!["English".to_string(), "Swahili".to_string()],
        created_at: now,
        updated_at: now,
    };
    db.collection::<WorkerProfile>(WORKERS)
        .insert_one(&worker, None)
        .await?;
    log::info!("Created verified worker profile for jane.smith@example.com");

    stats::refresh_category_stats(db, cleaning_id).await?;

    log::info!("Seeding complete");
    log::info!("  Employer: john.doe@example.com / password123");
    log::info!("  Worker:   jane.smith@example.com / password123");
    log::info!("  Admin:    admin@safehire.co.ke / admin123");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn category_seeds_are_unique_and_ordered() {
        let now = DateTime::now();
        let names: HashSet<_> = CATEGORY_SEEDS.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), CATEGORY_SEEDS.len());

        let plumbing = category(&CATEGORY_SEEDS[1], 2, now);
        assert_eq!(plumbing.name, "Plumbing");
        assert!(plumbing.featured);
        assert!(plumbing.requirements.iter().all(|r| r.required));
        assert_eq!(plumbing.sort_order, 2);
    }

    #[test]
    fn only_first_three_categories_are_featured() {
        let featured: Vec<_> = CATEGORY_SEEDS
            .iter()
            .filter(|c| c.featured)
            .map(|c| c.name)
            .collect();
        assert_eq!(featured, ["House Cleaning", "Plumbing", "Electrical Work"]);
    }
}
