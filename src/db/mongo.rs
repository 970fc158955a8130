use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ServerApi, ServerApiVersion},
    Client, Database, IndexModel,
};
use std::sync::Arc;
use std::time::Duration;

pub const USERS: &str = "Users";
pub const PROFILES: &str = "Profiles";
pub const PLANS: &str = "Plans";
pub const PLAN_LIKES: &str = "PlanLikes";
pub const PLAN_SAVES: &str = "PlanSaves";
pub const PLAN_COMMENTS: &str = "PlanComments";
pub const FRIEND_REQUESTS: &str = "FriendRequests";
pub const FRIENDSHIPS: &str = "Friendships";
pub const CHAT_MESSAGES: &str = "ChatMessages";

const DUPLICATE_KEY: i32 = 11000;

pub async fn create_mongo_client(uri: &str) -> mongodb::error::Result<Arc<Client>> {
    log::info!("Connecting to MongoDB");

    let mut client_options = ClientOptions::parse(uri).await?;

    client_options.connect_timeout = Some(Duration::from_secs(10));
    client_options.server_selection_timeout = Some(Duration::from_secs(10));
    client_options.max_pool_size = Some(10);
    client_options.min_pool_size = Some(1);

    let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
    client_options.server_api = Some(server_api);

    let client = Client::with_options(client_options)?;

    Ok(Arc::new(client))
}

/// Pings the database. A failure is reported but does not stop the server,
/// the driver reconnects lazily.
pub async fn verify_connection(db: &Database) -> bool {
    match db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => {
            log::info!("Successfully connected to MongoDB and verified with ping command");
            true
        }
        Err(e) => {
            log::warn!("Connected to MongoDB but ping test failed: {}", e);
            false
        }
    }
}

fn unique(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

pub async fn ensure_indexes(db: &Database) -> mongodb::error::Result<()> {
    let plain = |name: &str| db.collection::<mongodb::bson::Document>(name);

    plain(USERS).create_index(unique(doc! { "email": 1 })).await?;
    plain(USERS).create_index(unique(doc! { "username": 1 })).await?;
    plain(PROFILES).create_index(unique(doc! { "user_id": 1 })).await?;
    plain(PROFILES)
        .create_index(unique(doc! { "username_slug": 1 }))
        .await?;
    plain(PLANS).create_index(unique(doc! { "share_code": 1 })).await?;
    plain(PLANS)
        .create_index(IndexModel::builder().keys(doc! { "owner_id": 1, "created_at": -1 }).build())
        .await?;
    plain(PLAN_LIKES)
        .create_index(unique(doc! { "user_id": 1, "plan_id": 1 }))
        .await?;
    plain(PLAN_SAVES)
        .create_index(unique(doc! { "user_id": 1, "plan_id": 1 }))
        .await?;
    plain(FRIENDSHIPS)
        .create_index(unique(doc! { "user1": 1, "user2": 1 }))
        .await?;

    // One pending request per direction; settled requests may repeat.
    let pending_only = IndexModel::builder()
        .keys(doc! { "from_user": 1, "to_user": 1 })
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(doc! { "status": "pending" })
                .name("uniq_pending_request".to_string())
                .build(),
        )
        .build();
    plain(FRIEND_REQUESTS).create_index(pending_only).await?;

    plain(CHAT_MESSAGES)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "sender_id": 1, "recipient_id": 1, "created_at": 1 })
                .build(),
        )
        .await?;

    log::info!("MongoDB indexes ensured");
    Ok(())
}

pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        _ => false,
    }
}
