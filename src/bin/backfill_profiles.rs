//! Creates the missing profile of every existing user.

use env_logger::Env;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};

use descubreme_api::{
    config::AppConfig,
    db::mongo::{create_mongo_client, PROFILES, USERS},
    models::user::User,
    services::profile_service,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = AppConfig::from_env()?;
    let client = create_mongo_client(&config.mongo_uri).await?;
    let db = client.database(&config.database);

    let profiles = db.collection::<Document>(PROFILES);
    let mut users = db.collection::<User>(USERS).find(doc! {}).await?;

    let mut created = 0u32;
    while let Some(user) = users.try_next().await? {
        let Some(user_id) = user.id else {
            continue;
        };
        if profiles.count_documents(doc! { "user_id": user_id }).await? > 0 {
            continue;
        }
        match profile_service::create_for_user(&db, user_id, &user.username).await {
            Ok(profile) => {
                log::info!("Created profile '{}' for {}", profile.username_slug, user.username);
                created += 1;
            }
            Err(e) => log::error!("Could not create profile for {}: {}", user.username, e),
        }
    }

    println!("Created {} profiles", created);
    Ok(())
}
