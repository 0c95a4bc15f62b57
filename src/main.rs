use actix_web::{web, App, HttpServer};
use mongodb::Collection;
use std::env;

mod auth;
mod categories;
mod db;
mod error;
mod middleware;
mod models;
mod orders;
mod products;
mod response;
mod users;

use models::{Category, Counter, Order, Product, User};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok(); // Load environment variables from .env file
    env_logger::init();

    let database = db::connect().await;
    let user_coll: Collection<User> = database.collection("users");
    let product_coll: Collection<Product> = database.collection("products");
    let category_coll: Collection<Category> = database.collection("categories");
    let order_coll: Collection<Order> = database.collection("orders");
    let counter_coll: Collection<Counter> = database.collection("counters");

    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    log::info!("Starting food-ordering API on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(user_coll.clone()))
            .app_data(web::Data::new(product_coll.clone()))
            .app_data(web::Data::new(category_coll.clone()))
            .app_data(web::Data::new(order_coll.clone()))
            .app_data(web::Data::new(counter_coll.clone()))
            .app_data(web::Data::new(auth::JwtSecret(jwt_secret.clone())))
            // Public auth routes
            .route("/signup", web::post().to(auth::sign_up))
            .route("/signin", web::post().to(auth::sign_in))
            .service(
                web::scope("/api")
                    .wrap(middleware::AuthMiddleware::new(jwt_secret.clone()))
                    .service(web::resource("/users").route(web::get().to(users::list_users)))
                    .service(web::resource("/users/{id}").route(web::get().to(users::get_user)))
                    .service(
                        web::resource("/categories")
                            .route(web::get().to(categories::list_categories))
                            .route(web::post().to(categories::create_category)),
                    )
                    .service(
                        web::resource("/categories/{id}")
                            .route(web::get().to(categories::get_category)),
                    )
                    .service(
                        web::resource("/products")
                            .route(web::get().to(products::list_products))
                            .route(web::post().to(products::create_product)),
                    )
                    .service(
                        web::resource("/products/category/{category_id}")
                            .route(web::get().to(products::get_products_by_category)),
                    )
                    .service(
                        web::resource("/products/{id}")
                            .route(web::get().to(products::get_product))
                            .route(web::put().to(products::update_product))
                            .route(web::delete().to(products::delete_product)),
                    )
                    .service(web::resource("/orders").route(web::post().to(orders::create_order)))
                    .service(
                        web::resource("/orders/user/{user_id}")
                            .route(web::get().to(orders::get_orders_by_user)),
                    )
                    .service(
                        web::resource("/orders/{id}/status")
                            .route(web::put().to(orders::update_order_status)),
                    )
                    .service(
                        web::resource("/orders/{id}/cancel")
                            .route(web::post().to(orders::cancel_order)),
                    )
                    .service(web::resource("/orders/{id}").route(web::get().to(orders::get_order))),
            )
    })
    .bind(&bind_addr)?
    .run()
    .await
}
