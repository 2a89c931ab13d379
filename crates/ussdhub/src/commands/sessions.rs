//! Stored-session listing.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use ussdhub::config::{self, Config};
use ussdhub::contact::StaticActorProvider;
use ussdhub::store::{FileSessionStore, SessionStore};

pub async fn run(config_path: &str) -> Result<()> {
    let config = Config::load(config_path).await?;

    let Some(dir) = &config.store.sessions_dir else {
        println!("Sessions are kept in memory; set store.sessions_dir to persist them.");
        return Ok(());
    };
    let actors = Arc::new(StaticActorProvider::new(config.actor.system_actor.clone()));
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(
        config::resolve_path(Path::new(config_path), dir),
        actors,
    ));

    let mut ids = store.list().await?;
    ids.sort();

    if ids.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }

    println!(
        "{:<32} {:<12} {:<5} {:<16} {}",
        "SESSION ID", "STATUS", "DIR", "ADDRESS", "EXTERNAL ID"
    );
    println!("{:-<32} {:-<12} {:-<5} {:-<16} {:-<11}", "", "", "", "", "");

    for id in &ids {
        if let Some(session) = store.get(id).await? {
            println!(
                "{:<32} {:<12} {:<5} {:<16} {}",
                session.id,
                session.status.to_string(),
                session.direction.to_string(),
                session.address.to_string(),
                session.external_id
            );
        }
    }

    Ok(())
}
