use actix_web::{web, HttpResponse};
use futures::stream::StreamExt;
use mongodb::bson::doc;
use mongodb::Collection;

use crate::error::ApiError;
use crate::models::{User, UserResponse};
use crate::response;

pub async fn list_users(users: web::Data<Collection<User>>) -> Result<HttpResponse, ApiError> {
    let mut cursor = users.find(None, None).await?;
    let mut result = vec![];
    while let Some(user) = cursor.next().await {
        result.push(UserResponse::from(user?));
    }
    Ok(response::ok("Users retrieved", result))
}

pub async fn get_user(
    users: web::Data<Collection<User>>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = user_id.into_inner();
    let user = users
        .find_one(doc! {"id": id}, None)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))?;
    Ok(response::ok("User retrieved", UserResponse::from(user)))
}
