use mongodb::{Client, Database};

use crate::errors::Result;

pub async fn get_db_client(database_url: &str, db_name: &str) -> Result<(Client, Database)> {
    let client = Client::with_uri_str(database_url).await?;
    let db = client.database(db_name);

    // Verify the database is reachable by listing collections
    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("✅ Connected to database: {}", db_name);
            tracing::info!("📂 Collections found: {:?}", collections);

            if !collections.iter().any(|name| name == "pools") {
                tracing::warn!("⚠️ 'pools' collection not found in database");
            }
        }
        Err(e) => {
            tracing::error!("❌ Database '{}' may not exist or is inaccessible: {}", db_name, e);
            return Err(e.into());
        }
    }

    Ok((client, db))
}
