use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures::stream::StreamExt;
use mongodb::bson::doc;
use mongodb::Collection;
use std::collections::HashMap;
use uuid::Uuid;

use crate::db;
use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{
    Counter, CreateOrderRequest, Order, OrderItem, OrderStatus, Product, UpdateStatusRequest, User,
};
use crate::response;

/// A requested line with its unit price resolved from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedItem {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: f64,
}

pub const MIN_QUANTITY: i32 = 1;
pub const MAX_QUANTITY: i32 = 100;

/// Rounds to 2 decimal places, half away from zero (`f64::round` semantics).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Order total: sum of quantity × unit price over all lines, rounded to
/// 2 decimals.
pub fn order_total(items: &[PricedItem]) -> f64 {
    let sum: f64 = items
        .iter()
        .map(|item| item.quantity as f64 * item.unit_price)
        .sum();
    round2(sum)
}

/// Validates an order request against the referenced user and catalog.
/// Rules run in a fixed sequence and the first violation wins, except the
/// duplicate check which reports every offending product id at once.
pub fn validate_order(
    req: &CreateOrderRequest,
    user: Option<&User>,
    products: &HashMap<i64, Product>,
) -> Result<Vec<PricedItem>, ApiError> {
    if req.user_id <= 0 {
        return Err(ApiError::Validation(
            "User id must be a positive integer".to_string(),
        ));
    }
    if user.is_none() {
        return Err(ApiError::Validation(format!(
            "User {} does not exist",
            req.user_id
        )));
    }
    if req.delivery_address.trim().is_empty() {
        return Err(ApiError::Validation(
            "Delivery address is required".to_string(),
        ));
    }
    if req.payment_method.trim().is_empty() {
        return Err(ApiError::Validation(
            "Payment method is required".to_string(),
        ));
    }
    if req.items.is_empty() {
        return Err(ApiError::Validation(
            "Order must contain at least one item".to_string(),
        ));
    }

    for item in &req.items {
        if item.quantity < MIN_QUANTITY || item.quantity > MAX_QUANTITY {
            return Err(ApiError::Validation(format!(
                "Quantity for product {} must be between {} and {}",
                item.product_id, MIN_QUANTITY, MAX_QUANTITY
            )));
        }
    }

    for item in &req.items {
        match products.get(&item.product_id) {
            None => {
                return Err(ApiError::Validation(format!(
                    "Product {} does not exist",
                    item.product_id
                )))
            }
            Some(product) if !product.is_available => {
                return Err(ApiError::Validation(format!(
                    "Product {} is not available",
                    item.product_id
                )))
            }
            Some(_) => {}
        }
    }

    // Every duplicated id is reported, not just the first.
    let mut seen = HashMap::new();
    for item in &req.items {
        *seen.entry(item.product_id).or_insert(0u32) += 1;
    }
    let mut duplicates: Vec<i64> = Vec::new();
    for item in &req.items {
        if seen[&item.product_id] > 1 && !duplicates.contains(&item.product_id) {
            duplicates.push(item.product_id);
        }
    }
    if !duplicates.is_empty() {
        let ids = duplicates
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ApiError::Validation(format!(
            "Duplicate products in order: {}",
            ids
        )));
    }

    Ok(req
        .items
        .iter()
        .map(|item| PricedItem {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: products[&item.product_id].price,
        })
        .collect())
}

/// Assembles the order header and its line items from a validated,
/// price-resolved item list. New orders always start out Pending.
pub fn build_order(order_id: i64, req: &CreateOrderRequest, priced: Vec<PricedItem>) -> Order {
    let items = priced
        .iter()
        .enumerate()
        .map(|(index, item)| OrderItem {
            id: index as i64 + 1,
            order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: round2(item.quantity as f64 * item.unit_price),
        })
        .collect();

    Order {
        id: order_id,
        reference: Uuid::new_v4().to_string(),
        user_id: req.user_id,
        status: OrderStatus::Pending,
        total_amount: order_total(&priced),
        delivery_address: req.delivery_address.clone(),
        payment_method: req.payment_method.clone(),
        order_date: Utc::now(),
        items,
    }
}

pub async fn create_order(
    orders: web::Data<Collection<Order>>,
    users: web::Data<Collection<User>>,
    products: web::Data<Collection<Product>>,
    counters: web::Data<Collection<Counter>>,
    req: web::Json<CreateOrderRequest>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let user = users.find_one(doc! {"id": req.user_id}, None).await?;

    let product_ids: Vec<i64> = req.items.iter().map(|item| item.product_id).collect();
    let mut catalog = HashMap::new();
    let mut cursor = products
        .find(doc! {"id": {"$in": product_ids}}, None)
        .await?;
    while let Some(product) = cursor.next().await {
        let product = product?;
        catalog.insert(product.id, product);
    }

    let priced = validate_order(&req, user.as_ref(), &catalog)?;

    let order_id = db::next_id(&counters, "Order").await?;
    let order = build_order(order_id, &req, priced);

    orders.insert_one(&order, None).await?;
    log::info!(
        "Order {} placed by user {} for {:.2}",
        order.id,
        order.user_id,
        order.total_amount
    );

    Ok(response::created("Order placed successfully", order))
}

pub async fn get_order(
    orders: web::Data<Collection<Order>>,
    order_id: web::Path<i64>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let id = order_id.into_inner();
    let order = orders
        .find_one(doc! {"id": id}, None)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", id)))?;
    Ok(response::ok("Order retrieved", order))
}

pub async fn get_orders_by_user(
    orders: web::Data<Collection<Order>>,
    user_id: web::Path<i64>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let mut cursor = orders
        .find(doc! {"userId": user_id.into_inner()}, None)
        .await?;
    let mut result = vec![];
    while let Some(order) = cursor.next().await {
        result.push(order?);
    }
    Ok(response::ok("Orders retrieved", result))
}

pub async fn update_order_status(
    orders: web::Data<Collection<Order>>,
    order_id: web::Path<i64>,
    data: web::Json<UpdateStatusRequest>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    // Membership check only: any of the six names is accepted regardless of
    // the current status.
    let status = OrderStatus::parse(&data.new_status).ok_or_else(|| {
        ApiError::Validation(format!("{} is not a valid order status", data.new_status))
    })?;

    let id = order_id.into_inner();
    let update = doc! {"$set": {"status": status.as_str()}};
    let result = orders.update_one(doc! {"id": id}, update, None).await?;
    if result.matched_count == 1 {
        log::info!(
            "Order {} status set to {} by user {}",
            id,
            status.as_str(),
            user.0
        );
        Ok(response::ok_message(&format!(
            "Order status updated to {}",
            status.as_str()
        )))
    } else {
        Err(ApiError::NotFound(format!("Order {} not found", id)))
    }
}

pub async fn cancel_order(
    orders: web::Data<Collection<Order>>,
    order_id: web::Path<i64>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse, ApiError> {
    let id = order_id.into_inner();
    let order = orders
        .find_one(doc! {"id": id}, None)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {} not found", id)))?;

    if !order.status.can_be_cancelled() {
        return Err(ApiError::Conflict(format!(
            "Order {} cannot be cancelled in status {}",
            id,
            order.status.as_str()
        )));
    }

    let update = doc! {"$set": {"status": OrderStatus::Cancelled.as_str()}};
    orders.update_one(doc! {"id": id}, update, None).await?;
    log::info!("Order {} cancelled", id);
    Ok(response::ok_message("Order cancelled"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrderItem;

    fn product(id: i64, price: f64, available: bool) -> Product {
        Product {
            id,
            name: format!("Product {}", id),
            description: None,
            price,
            image_url: None,
            category_id: 1,
            is_available: available,
            created_at: Utc::now(),
        }
    }

    fn user(id: i64) -> User {
        User {
            id,
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            password: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    fn request(user_id: i64, items: Vec<(i64, i32)>) -> CreateOrderRequest {
        CreateOrderRequest {
            user_id,
            delivery_address: "1 Main Street".to_string(),
            payment_method: "Card".to_string(),
            items: items
                .into_iter()
                .map(|(product_id, quantity)| NewOrderItem {
                    product_id,
                    quantity,
                })
                .collect(),
        }
    }

    fn catalog(products: Vec<Product>) -> HashMap<i64, Product> {
        products.into_iter().map(|p| (p.id, p)).collect()
    }

    fn validation_message(result: Result<Vec<PricedItem>, ApiError>) -> String {
        match result {
            Err(ApiError::Validation(message)) => message,
            other => panic!("Expected validation error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn total_is_sum_of_quantity_times_price() {
        let req = request(1, vec![(1, 2)]);
        let u = user(1);
        let priced =
            validate_order(&req, Some(&u), &catalog(vec![product(1, 10.00, true)])).unwrap();
        assert_eq!(order_total(&priced), 20.00);
    }

    #[test]
    fn total_covers_multiple_lines_rounded_to_two_decimals() {
        let items = vec![
            PricedItem {
                product_id: 1,
                quantity: 3,
                unit_price: 19.99,
            },
            PricedItem {
                product_id: 2,
                quantity: 2,
                unit_price: 5.25,
            },
        ];
        assert_eq!(order_total(&items), 70.47);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round2(1.125), 1.13);
        assert_eq!(round2(-1.125), -1.13);
        assert_eq!(round2(2.004), 2.00);
    }

    #[test]
    fn duplicate_product_ids_are_rejected_and_named() {
        let req = request(1, vec![(1, 1), (1, 1)]);
        let u = user(1);
        let message = validation_message(validate_order(
            &req,
            Some(&u),
            &catalog(vec![product(1, 10.00, true)]),
        ));
        assert_eq!(message, "Duplicate products in order: 1");
    }

    #[test]
    fn all_duplicates_are_listed() {
        let req = request(1, vec![(1, 1), (2, 1), (1, 2), (2, 3)]);
        let u = user(1);
        let message = validation_message(validate_order(
            &req,
            Some(&u),
            &catalog(vec![product(1, 10.00, true), product(2, 4.50, true)]),
        ));
        assert_eq!(message, "Duplicate products in order: 1, 2");
    }

    #[test]
    fn quantity_out_of_bounds_names_the_product() {
        let u = user(1);
        let cat = catalog(vec![product(7, 3.00, true)]);

        let req = request(1, vec![(7, 0)]);
        let message = validation_message(validate_order(&req, Some(&u), &cat));
        assert_eq!(message, "Quantity for product 7 must be between 1 and 100");

        let req = request(1, vec![(7, 101)]);
        let message = validation_message(validate_order(&req, Some(&u), &cat));
        assert_eq!(message, "Quantity for product 7 must be between 1 and 100");
    }

    #[test]
    fn boundary_quantities_are_accepted() {
        let u = user(1);
        let cat = catalog(vec![product(1, 2.00, true), product(2, 1.00, true)]);
        let req = request(1, vec![(1, 1), (2, 100)]);
        let priced = validate_order(&req, Some(&u), &cat).unwrap();
        assert_eq!(priced.len(), 2);
        assert_eq!(order_total(&priced), 102.00);
    }

    #[test]
    fn nonpositive_user_id_is_rejected() {
        let req = request(0, vec![(1, 1)]);
        let message = validation_message(validate_order(&req, None, &catalog(vec![])));
        assert_eq!(message, "User id must be a positive integer");
    }

    #[test]
    fn unknown_user_is_rejected() {
        let req = request(42, vec![(1, 1)]);
        let message = validation_message(validate_order(
            &req,
            None,
            &catalog(vec![product(1, 10.00, true)]),
        ));
        assert_eq!(message, "User 42 does not exist");
    }

    #[test]
    fn blank_address_and_payment_method_are_rejected() {
        let u = user(1);
        let cat = catalog(vec![product(1, 10.00, true)]);

        let mut req = request(1, vec![(1, 1)]);
        req.delivery_address = "   ".to_string();
        let message = validation_message(validate_order(&req, Some(&u), &cat));
        assert_eq!(message, "Delivery address is required");

        let mut req = request(1, vec![(1, 1)]);
        req.payment_method = "".to_string();
        let message = validation_message(validate_order(&req, Some(&u), &cat));
        assert_eq!(message, "Payment method is required");
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let req = request(1, vec![]);
        let u = user(1);
        let message = validation_message(validate_order(&req, Some(&u), &catalog(vec![])));
        assert_eq!(message, "Order must contain at least one item");
    }

    #[test]
    fn missing_and_unavailable_products_are_distinct_failures() {
        let u = user(1);
        let cat = catalog(vec![product(2, 8.00, false)]);

        let req = request(1, vec![(1, 1)]);
        let message = validation_message(validate_order(&req, Some(&u), &cat));
        assert_eq!(message, "Product 1 does not exist");

        let req = request(1, vec![(2, 1)]);
        let message = validation_message(validate_order(&req, Some(&u), &cat));
        assert_eq!(message, "Product 2 is not available");
    }

    #[test]
    fn build_order_snapshots_prices_and_starts_pending() {
        let req = request(5, vec![(1, 2), (2, 3)]);
        let priced = vec![
            PricedItem {
                product_id: 1,
                quantity: 2,
                unit_price: 10.00,
            },
            PricedItem {
                product_id: 2,
                quantity: 3,
                unit_price: 4.50,
            },
        ];
        let order = build_order(99, &req, priced);

        assert_eq!(order.id, 99);
        assert_eq!(order.user_id, 5);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, 33.50);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].order_id, 99);
        assert_eq!(order.items[0].unit_price, 10.00);
        assert_eq!(order.items[0].total_price, 20.00);
        assert_eq!(order.items[1].total_price, 13.50);
        assert!(!order.reference.is_empty());
    }

    #[test]
    fn order_total_matches_sum_of_line_totals() {
        let req = request(1, vec![(1, 4), (2, 7)]);
        let priced = vec![
            PricedItem {
                product_id: 1,
                quantity: 4,
                unit_price: 2.35,
            },
            PricedItem {
                product_id: 2,
                quantity: 7,
                unit_price: 0.99,
            },
        ];
        let order = build_order(1, &req, priced);
        let line_sum: f64 = order.items.iter().map(|item| item.total_price).sum();
        assert_eq!(order.total_amount, round2(line_sum));
    }

    #[test]
    fn status_update_is_a_membership_check_only() {
        // Delivered -> Pending is accepted: only the name is checked.
        assert_eq!(OrderStatus::parse("Pending"), Some(OrderStatus::Pending));
        assert_eq!(
            OrderStatus::parse("Delivered"),
            Some(OrderStatus::Delivered)
        );
        assert_eq!(OrderStatus::parse("Shipped"), None);
        assert_eq!(OrderStatus::parse("pending"), None);
    }

    #[test]
    fn cancellation_is_only_allowed_before_preparation() {
        assert!(OrderStatus::Pending.can_be_cancelled());
        assert!(OrderStatus::Confirmed.can_be_cancelled());
        assert!(!OrderStatus::Preparing.can_be_cancelled());
        assert!(!OrderStatus::Ready.can_be_cancelled());
        assert!(!OrderStatus::Delivered.can_be_cancelled());
        assert!(!OrderStatus::Cancelled.can_be_cancelled());
    }

    // Order reads expose delivery addresses, so they sit behind the bearer
    // token like the mutations. The client is lazy, so no database is
    // contacted: extraction fails with 401 before the handler runs.
    #[actix_web::test]
    async fn order_reads_require_authentication() {
        use actix_web::http::StatusCode;
        use actix_web::{test, App};

        let client = mongodb::Client::with_uri_str("mongodb://localhost:27017")
            .await
            .unwrap();
        let order_coll: Collection<Order> = client.database("food_ordering_test").collection("orders");

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(order_coll.clone()))
                .service(
                    web::scope("/api")
                        .wrap(crate::middleware::AuthMiddleware::new("secret".to_string()))
                        .service(
                            web::resource("/orders/user/{user_id}")
                                .route(web::get().to(get_orders_by_user)),
                        )
                        .service(web::resource("/orders/{id}").route(web::get().to(get_order))),
                ),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/orders/1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/orders/user/1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
