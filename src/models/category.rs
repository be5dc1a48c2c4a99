use mongodb::bson::{DateTime, oid::ObjectId};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::{hex, iso, validate_object_id};

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema, Validate)]
pub struct CategoryRequirement {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Category {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub image: Option<String>,
    pub is_active: bool,
    pub featured: bool,
    pub sort_order: i32,
    pub parent_category_id: Option<ObjectId>,
    pub subcategory_ids: Vec<ObjectId>,
    pub requirements: Vec<CategoryRequirement>,
    pub tags: Vec<String>,
    pub worker_count: i32,
    pub average_hourly_rate: f64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreateCategoryDto {
    #[validate(length(min = 1, max = 50, message = "Category name is required (max 50 characters)"))]
    pub name: String,
    #[validate(length(min = 1, max = 500, message = "Category description is required (max 500 characters)"))]
    pub description: String,
    #[validate(length(min = 1, message = "Category icon is required"))]
    pub icon: String,
    #[validate(url)]
    pub image: Option<String>,
    pub is_active: Option<bool>,
    pub featured: Option<bool>,
    pub sort_order: Option<i32>,
    #[validate(custom = "validate_object_id")]
    pub parent_category_id: Option<String>,
    #[serde(default)]
    #[validate]
    pub requirements: Vec<CategoryRequirement>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateCategoryDto {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub description: Option<String>,
    #[validate(length(min = 1))]
    pub icon: Option<String>,
    #[validate(url)]
    pub image: Option<String>,
    pub is_active: Option<bool>,
    pub featured: Option<bool>,
    pub sort_order: Option<i32>,
    pub requirements: Option<Vec<CategoryRequirement>>,
    pub tags: Option<Vec<String>>,
}

/// Parent or child reference shown alongside a category.
#[derive(Debug, Serialize, Clone, JsonSchema)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub worker_count: i32,
    pub average_hourly_rate: f64,
}

impl From<&Category> for CategoryRef {
    fn from(c: &Category) -> Self {
        CategoryRef {
            id: hex(&c.id),
            name: c.name.clone(),
            description: c.description.clone(),
            icon: c.icon.clone(),
            worker_count: c.worker_count,
            average_hourly_rate: c.average_hourly_rate,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CategoryResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub image: Option<String>,
    pub is_active: bool,
    pub featured: bool,
    pub sort_order: i32,
    pub requirements: Vec<CategoryRequirement>,
    pub tags: Vec<String>,
    pub worker_count: i32,
    /// Own workers plus those of loaded subcategories.
    pub total_workers: i32,
    pub average_hourly_rate: f64,
    pub parent: Option<CategoryRef>,
    pub subcategories: Vec<CategoryRef>,
    pub created_at: String,
}

impl CategoryResponse {
    pub fn build(category: Category, parent: Option<CategoryRef>, subcategories: Vec<CategoryRef>) -> Self {
        let total_workers =
            category.worker_count + subcategories.iter().map(|s| s.worker_count).sum::<i32>();
        CategoryResponse {
            id: hex(&category.id),
            name: category.name,
            description: category.description,
            icon: category.icon,
            image: category.image,
            is_active: category.is_active,
            featured: category.featured,
            sort_order: category.sort_order,
            requirements: category.requirements,
            tags: category.tags,
            worker_count: category.worker_count,
            total_workers,
            average_hourly_rate: category.average_hourly_rate,
            parent,
            subcategories,
            created_at: iso(category.created_at),
        }
    }
}
