use mongodb::bson::doc;
use mongodb::{options::ClientOptions, Client, Collection, Database};
use std::env;

use crate::models::Counter;

pub async fn connect() -> Database {
    // Retrieve the MongoDB connection string from environment variables
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let client_options = ClientOptions::parse(&database_url)
        .await
        .expect("Failed to parse MongoDB connection string");

    let client = Client::with_options(client_options).expect("Failed to initialize MongoDB client");

    client.database("food_ordering")
}

/// Next value of a named monotonic sequence, backed by the `counters`
/// collection. The upsert creates the counter on first use, so ids start
/// at 1 and are always positive.
pub async fn next_id(
    counters: &Collection<Counter>,
    seq_name: &str,
) -> Result<i64, mongodb::error::Error> {
    let filter = doc! {"_id": seq_name};
    let update = doc! {"$inc": {"seq": 1}};

    let options = mongodb::options::FindOneAndUpdateOptions::builder()
        .upsert(true)
        .return_document(mongodb::options::ReturnDocument::After)
        .build();

    let result = counters.find_one_and_update(filter, update, options).await?;

    if let Some(counter) = result {
        Ok(counter.seq)
    } else {
        Err(mongodb::error::Error::custom(
            "Failed to generate sequence value",
        ))
    }
}
