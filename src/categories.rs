use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures::stream::StreamExt;
use mongodb::bson::doc;
use mongodb::Collection;

use crate::db;
use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{Category, Counter, NewCategory};
use crate::response;

pub async fn create_category(
    categories: web::Data<Collection<Category>>,
    counters: web::Data<Collection<Counter>>,
    data: web::Json<NewCategory>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    if data.name.trim().is_empty() {
        return Err(ApiError::Validation("Category name is required".to_string()));
    }

    let next_id = db::next_id(&counters, "Category").await?;
    let category = Category {
        id: next_id,
        name: data.name.clone(),
        description: data.description.clone(),
        image_url: data.image_url.clone(),
        created_at: Utc::now(),
    };

    categories.insert_one(&category, None).await?;
    log::info!("Category {} created by user {}", category.id, user.0);
    Ok(response::created("Category created", category))
}

pub async fn list_categories(
    categories: web::Data<Collection<Category>>,
) -> Result<HttpResponse, ApiError> {
    let mut cursor = categories.find(None, None).await?;
    let mut result = vec![];
    while let Some(category) = cursor.next().await {
        result.push(category?);
    }
    Ok(response::ok("Categories retrieved", result))
}

pub async fn get_category(
    categories: web::Data<Collection<Category>>,
    category_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = category_id.into_inner();
    let category = categories
        .find_one(doc! {"id": id}, None)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Category {} not found", id)))?;
    Ok(response::ok("Category retrieved", category))
}
