use actix_web::{web, HttpResponse};
use argon2::{self, Config as ArgonConfig};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::doc;
use mongodb::Collection;
use rand::Rng;

use crate::db;
use crate::error::ApiError;
use crate::models::{AuthResponse, Claims, Counter, SignInInput, SignUpInput, User, UserResponse};
use crate::response;

/// HS256 signing secret, shared with the auth middleware.
pub struct JwtSecret(pub String);

pub async fn sign_up(
    users: web::Data<Collection<User>>,
    counters: web::Data<Collection<Counter>>,
    new_user: web::Json<SignUpInput>,
) -> Result<HttpResponse, ApiError> {
    if new_user.name.trim().is_empty() {
        return Err(ApiError::Validation("Name is required".to_string()));
    }
    if new_user.email.trim().is_empty() {
        return Err(ApiError::Validation("Email is required".to_string()));
    }
    if new_user.password.trim().is_empty() {
        return Err(ApiError::Validation("Password is required".to_string()));
    }

    let existing = users.find_one(doc! {"email": &new_user.email}, None).await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "A user with email {} already exists",
            new_user.email
        )));
    }

    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();
    let hashed_password = argon2::hash_encoded(new_user.password.as_bytes(), &salt, &config)
        .map_err(|e| {
            log::error!("Password hashing failed: {}", e);
            ApiError::Internal
        })?;

    let next_id = db::next_id(&counters, "User").await?;
    let account = User {
        id: next_id,
        name: new_user.name.clone(),
        email: new_user.email.clone(),
        password: hashed_password,
        created_at: Utc::now(),
    };

    users.insert_one(&account, None).await?;
    log::info!("Registered user {} ({})", account.id, account.email);

    Ok(response::created(
        "User registered successfully",
        UserResponse::from(account),
    ))
}

pub async fn sign_in(
    users: web::Data<Collection<User>>,
    secret: web::Data<JwtSecret>,
    data: web::Json<SignInInput>,
) -> Result<HttpResponse, ApiError> {
    let user = users
        .find_one(doc! {"email": &data.email}, None)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let verified =
        argon2::verify_encoded(&user.password, data.password.as_bytes()).unwrap_or(false);
    if !verified {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    // Tokens are valid for one hour.
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::hours(1))
        .ok_or(ApiError::Internal)?
        .timestamp() as usize;

    let claims = Claims {
        sub: user.id,
        exp: expiration,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.0.as_ref()),
    )
    .map_err(|e| {
        log::error!("Failed to encode token: {}", e);
        ApiError::Internal
    })?;

    Ok(response::ok("Signed in", AuthResponse { token }))
}
