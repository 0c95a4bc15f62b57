use actix_web::dev::{Payload, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use actix_service::{forward_ready, Service};
use futures::future::{ok, ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::rc::Rc;

use crate::error::ApiError;
use crate::models::Claims;

/// Bearer-token middleware. A valid token puts the caller's user id (the
/// token subject) into the request extensions; a request without an
/// Authorization header passes through unauthenticated so that public reads
/// and guarded mutations can share route paths. Handlers that mutate state
/// demand the id via [`AuthenticatedUser`].
pub struct AuthMiddleware {
    secret: String,
}

impl AuthMiddleware {
    pub fn new(secret: String) -> Self {
        AuthMiddleware { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Rc::new(service),
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let secret = self.secret.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let header = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .map(|h| h.to_string());

            if let Some(value) = header {
                let token = match value.strip_prefix("Bearer ") {
                    Some(token) => token.to_string(),
                    None => {
                        return Err(ApiError::Unauthorized(
                            "Invalid authorization scheme".to_string(),
                        )
                        .into())
                    }
                };

                match decode::<Claims>(
                    &token,
                    &DecodingKey::from_secret(secret.as_ref()),
                    &Validation::new(Algorithm::HS256),
                ) {
                    Ok(token_data) => {
                        req.extensions_mut().insert(token_data.claims.sub);
                    }
                    Err(_) => {
                        return Err(ApiError::Unauthorized("Invalid token".to_string()).into())
                    }
                }
            }

            service.call(req).await
        })
    }
}

/// The signed-in caller's user id, taken from the request extensions where
/// [`AuthMiddleware`] left it. Extraction fails with 401 when no valid
/// token accompanied the request.
pub struct AuthenticatedUser(pub i64);

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<i64>().copied() {
            Some(user_id) => ready(Ok(AuthenticatedUser(user_id))),
            None => ready(Err(ApiError::Unauthorized("Login required".to_string()))),
        }
    }
}
