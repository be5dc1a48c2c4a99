use crate::db::{self, DbConn};
use crate::guards::AdminGuard;
use crate::models::{
    Category, CategoryRef, CategoryResponse, CreateCategoryDto, UpdateCategoryDto, WorkerProfile,
};
use crate::utils::{ApiError, ApiResponse, parse_id};
use mongodb::bson::{self, Bson, DateTime, Document, Regex, doc, oid::ObjectId};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use rocket::State;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use std::collections::HashMap;
use validator::Validate;

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct CategoryListQuery {
    pub featured: Option<bool>,
    /// Defaults to `true`.
    pub active: Option<bool>,
}

fn list_filter(query: &CategoryListQuery) -> Document {
    let mut filter = doc! { "is_active": query.active.unwrap_or(true) };
    if let Some(featured) = query.featured {
        filter.insert("featured", featured);
    }
    filter
}

/// Exact name match ignoring case.
fn name_filter(name: &str) -> Document {
    doc! {
        "name": Bson::RegularExpression(Regex {
            pattern: format!("^{}$", regex::escape(name.trim())),
            options: "i".to_string(),
        })
    }
}

async fn categories_by_id(
    db: &DbConn,
    ids: Vec<ObjectId>,
) -> Result<HashMap<ObjectId, Category>, ApiError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let found: Vec<Category> = db
        .collection::<Category>(db::CATEGORIES)
        .find(doc! { "_id": { "$in": ids } }, None)
        .await?
        .try_collect()
        .await?;
    Ok(found.into_iter().filter_map(|c| c.id.map(|id| (id, c))).collect())
}

async fn load_category(db: &DbConn, id: ObjectId) -> Result<Category, ApiError> {
    db.collection::<Category>(db::CATEGORIES)
        .find_one(doc! { "_id": id }, None)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))
}

/// Attaches the parent and subcategory references.
async fn expand(db: &DbConn, category: Category) -> Result<CategoryResponse, ApiError> {
    let mut ids = category.subcategory_ids.clone();
    ids.extend(category.parent_category_id);
    let related = categories_by_id(db, ids).await?;

    let parent = category
        .parent_category_id
        .and_then(|id| related.get(&id))
        .map(CategoryRef::from);
    let subcategories = category
        .subcategory_ids
        .iter()
        .filter_map(|id| related.get(id))
        .map(CategoryRef::from)
        .collect();

    Ok(CategoryResponse::build(category, parent, subcategories))
}

async fn ensure_unique_name(db: &DbConn, name: &str, except: Option<ObjectId>) -> Result<(), ApiError> {
    let mut filter = name_filter(name);
    if let Some(id) = except {
        filter.insert("_id", doc! { "$ne": id });
    }
    let taken = db
        .collection::<Category>(db::CATEGORIES)
        .find_one(filter, None)
        .await?
        .is_some();
    if taken {
        return Err(ApiError::conflict("Category with this name already exists"));
    }
    Ok(())
}

#[openapi(tag = "Category")]
#[get("/categories?<query..>")]
pub async fn get_all_categories(
    db: &State<DbConn>,
    query: CategoryListQuery,
) -> Result<Json<ApiResponse<Vec<CategoryResponse>>>, ApiError> {
    let options = FindOptions::builder()
        .sort(doc! { "sort_order": 1, "name": 1 })
        .build();

    let categories: Vec<Category> = db
        .collection::<Category>(db::CATEGORIES)
        .find(list_filter(&query), options)
        .await?
        .try_collect()
        .await?;

    let parents = categories_by_id(
        db,
        categories.iter().filter_map(|c| c.parent_category_id).collect(),
    )
    .await?;

    let categories = categories
        .into_iter()
        .map(|category| {
            let parent = category
                .parent_category_id
                .and_then(|id| parents.get(&id))
                .map(CategoryRef::from);
            CategoryResponse::build(category, parent, vec![])
        })
        .collect();

    Ok(Json(ApiResponse::success(categories)))
}

#[openapi(tag = "Category")]
#[get("/categories/<category_id>")]
pub async fn get_category_by_id(
    db: &State<DbConn>,
    category_id: String,
) -> Result<Json<ApiResponse<CategoryResponse>>, ApiError> {
    let category = load_category(db, parse_id(&category_id, "category")?).await?;
    Ok(Json(ApiResponse::success(expand(db, category).await?)))
}

#[openapi(tag = "Category")]
#[post("/categories", data = "<dto>")]
pub async fn create_category(
    db: &State<DbConn>,
    admin: AdminGuard,
    dto: Json<CreateCategoryDto>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ApiError> {
    dto.validate()?;
    ensure_unique_name(db, &dto.name, None).await?;

    let parent_id = match &dto.parent_category_id {
        Some(id) => {
            let id = parse_id(id, "parent category")?;
            load_category(db, id)
                .await
                .map_err(|_| ApiError::not_found("Parent category not found"))?;
            Some(id)
        }
        None => None,
    };

    let dto = dto.into_inner();
    let now = DateTime::now();
    let mut category = Category {
        id: None,
        name: dto.name.trim().to_string(),
        description: dto.description.trim().to_string(),
        icon: dto.icon,
        image: dto.image,
        is_active: dto.is_active.unwrap_or(true),
        featured: dto.featured.unwrap_or(false),
        sort_order: dto.sort_order.unwrap_or(0),
        parent_category_id: parent_id,
        subcategory_ids: vec![],
        requirements: dto.requirements,
        tags: dto.tags.iter().map(|t| t.trim().to_lowercase()).collect(),
        worker_count: 0,
        average_hourly_rate: 0.0,
        created_at: now,
        updated_at: now,
    };

    let categories = db.collection::<Category>(db::CATEGORIES);
    let result = categories.insert_one(&category, None).await.map_err(|e| {
        // E11000: duplicate key on the unique name index
        if e.to_string().contains("E11000") {
            ApiError::conflict("Category with this name already exists")
        } else {
            ApiError::from(e)
        }
    })?;
    category.id = result.inserted_id.as_object_id();

    if let (Some(parent_id), Some(id)) = (parent_id, category.id) {
        categories
            .update_one(
                doc! { "_id": parent_id },
                doc! {
                    "$addToSet": { "subcategory_ids": id },
                    "$set": { "updated_at": now },
                },
                None,
            )
            .await?;
    }

    log::info!("Category '{}' created by admin {}", category.name, admin.auth.user_id);

    Ok(Json(ApiResponse::success_with_message(
        "Category created successfully",
        expand(db, category).await?,
    )))
}

#[openapi(tag = "Category")]
#[put("/categories/<category_id>", data = "<dto>")]
pub async fn update_category(
    db: &State<DbConn>,
    _admin: AdminGuard,
    category_id: String,
    dto: Json<UpdateCategoryDto>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ApiError> {
    dto.validate()?;
    for requirement in dto.requirements.iter().flatten() {
        requirement.validate()?;
    }
    let category_id = parse_id(&category_id, "category")?;

    let mut update = Document::new();
    if let Some(name) = &dto.name {
        ensure_unique_name(db, name, Some(category_id)).await?;
        update.insert("name", name.trim());
    }
    if let Some(description) = &dto.description {
        update.insert("description", description.trim());
    }
    if let Some(icon) = &dto.icon {
        update.insert("icon", icon.as_str());
    }
    if let Some(image) = &dto.image {
        update.insert("image", image.as_str());
    }
    if let Some(active) = dto.is_active {
        update.insert("is_active", active);
    }
    if let Some(featured) = dto.featured {
        update.insert("featured", featured);
    }
    if let Some(order) = dto.sort_order {
        update.insert("sort_order", order);
    }
    if let Some(requirements) = &dto.requirements {
        let requirements = bson::to_bson(requirements)
            .map_err(|e| ApiError::internal_error(format!("Serialization error: {}", e)))?;
        update.insert("requirements", requirements);
    }
    if let Some(tags) = &dto.tags {
        let tags: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
        update.insert("tags", tags);
    }

    if update.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    update.insert("updated_at", DateTime::now());

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let category = db
        .collection::<Category>(db::CATEGORIES)
        .find_one_and_update(doc! { "_id": category_id }, doc! { "$set": update }, options)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Category updated successfully",
        expand(db, category).await?,
    )))
}

#[openapi(tag = "Category")]
#[delete("/categories/<category_id>")]
pub async fn delete_category(
    db: &State<DbConn>,
    admin: AdminGuard,
    category_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let category_id = parse_id(&category_id, "category")?;
    let category = load_category(db, category_id).await?;

    let workers = db
        .collection::<WorkerProfile>(db::WORKERS)
        .count_documents(doc! { "category_id": category_id }, None)
        .await?;
    if workers > 0 {
        return Err(ApiError::conflict(format!(
            "Cannot delete category with {} registered workers",
            workers
        )));
    }

    let categories = db.collection::<Category>(db::CATEGORIES);
    if let Some(parent_id) = category.parent_category_id {
        categories
            .update_one(
                doc! { "_id": parent_id },
                doc! { "$pull": { "subcategory_ids": category_id } },
                None,
            )
            .await?;
    }
    categories
        .update_many(
            doc! { "parent_category_id": category_id },
            doc! { "$set": { "parent_category_id": Bson::Null } },
            None,
        )
        .await?;
    categories.delete_one(doc! { "_id": category_id }, None).await?;

    log::info!("Category '{}' deleted by admin {}", category.name, admin.auth.user_id);

    Ok(Json(ApiResponse::success_with_message(
        "Category deleted successfully",
        serde_json::json!({ "id": category_id.to_hex() }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_defaults_to_active_categories() {
        let query = CategoryListQuery {
            featured: None,
            active: None,
        };
        assert_eq!(list_filter(&query), doc! { "is_active": true });

        let query = CategoryListQuery {
            featured: Some(true),
            active: Some(false),
        };
        assert_eq!(list_filter(&query), doc! { "is_active": false, "featured": true });
    }

    #[test]
    fn name_lookup_is_anchored_and_escaped() {
        let filter = name_filter(" Plumbing (pro) ");
        match filter.get("name") {
            Some(Bson::RegularExpression(re)) => {
                assert_eq!(re.pattern, r"^Plumbing \(pro\)$");
                assert_eq!(re.options, "i");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
