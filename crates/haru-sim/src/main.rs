//! # haru-sim
//!
//! Drives one Haruhancut session end to end against the in-memory backend:
//! create a group, let a second member join from another "device", post and
//! comment, then have the account vanish server-side.

mod seed;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use haru_shared::{paths, Uid};
use haru_store::LocalCache;
use haru_sync::memory::{MemoryBlobStore, MemoryRemoteStore, StaticAuth};
use haru_sync::{Backend, SessionEvent, SyncConfig, SyncEngine, SystemClock};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Time given to subscription tasks to apply pending snapshots.
const SETTLE: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,haru_sync=debug")),
        )
        .init();

    info!("Starting haru-sim v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = SyncConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Collaborators
    // -----------------------------------------------------------------------
    let cache = Arc::new(
        LocalCache::open_at(&config.cache_path)
            .with_context(|| format!("opening cache at {}", config.cache_path.display()))?,
    );

    let remote = MemoryRemoteStore::new();
    seed::seed_accounts(&remote);
    let auth = Arc::new(StaticAuth::signed_in(Uid::from(seed::ME)));

    let backend = Backend {
        remote: Arc::new(remote.clone()),
        blobs: Arc::new(MemoryBlobStore::new()),
        auth,
        cache,
        clock: Arc::new(SystemClock),
    };
    let calendar = config.calendar();
    let engine = SyncEngine::new(backend.clone(), config.clone());
    let mutations = engine.mutations();
    let mut events = engine.subscribe_events();

    // -----------------------------------------------------------------------
    // 4. Session
    // -----------------------------------------------------------------------
    engine.bootstrap().context("bootstrapping session")?;
    tokio::time::sleep(SETTLE).await;

    let created = mutations
        .create_group("우리 가족")
        .await
        .context("creating group")?;
    info!(group_id = %created.group_id, invite_code = %created.invite_code, "group ready");

    // The sister joins from her own device.
    let sister_engine = {
        let sister_remote = remote.clone();
        let sister_backend = Backend {
            remote: Arc::new(sister_remote),
            auth: Arc::new(StaticAuth::signed_in(Uid::from(seed::SISTER))),
            cache: Arc::new(LocalCache::in_memory().context("opening sister cache")?),
            ..backend.clone()
        };
        SyncEngine::new(sister_backend, config.clone())
    };
    sister_engine.bootstrap().context("bootstrapping sister")?;
    tokio::time::sleep(SETTLE).await;
    let code = created.invite_code.as_str().to_ascii_lowercase();
    sister_engine
        .mutations()
        .join_group(&format!("  {code} "))
        .await
        .context("joining group")?;
    tokio::time::sleep(SETTLE).await;

    let post = mutations
        .upload_post(Bytes::from_static(b"\xFF\xD8\xFF\xE0 today"))
        .await
        .context("uploading post")?;
    sister_engine
        .mutations()
        .add_comment(&post, "너무 예쁘다!")
        .await
        .context("commenting")?;
    tokio::time::sleep(SETTLE).await;

    // -----------------------------------------------------------------------
    // 5. Projections
    // -----------------------------------------------------------------------
    let snapshot = engine.snapshot();
    let now = chrono::Utc::now();
    let roster: Vec<String> = snapshot
        .roster_sorted_for_display()
        .iter()
        .map(|u| u.nickname.clone())
        .collect();
    info!(?roster, "roster");
    info!(
        todays_posts = snapshot.todays_posts(now, &calendar).len(),
        calendar_days = snapshot.calendar_thumbnails().len(),
        posted_today = snapshot.has_posted_today(&Uid::from(seed::ME), now, &calendar),
        "feed"
    );
    for post in snapshot.todays_posts(now, &calendar) {
        for comment in snapshot.comments_for_display(post) {
            info!(post_id = %post.post_id, from = %comment.nickname, text = %comment.text, "comment");
        }
    }

    // -----------------------------------------------------------------------
    // 6. The account disappears server-side
    // -----------------------------------------------------------------------
    remote.remove(&paths::user(&Uid::from(seed::ME)));
    match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
        Ok(Ok(SessionEvent::ForcedSessionEnded { uid })) => {
            info!(uid = %uid, "login flow would restart here");
        }
        Ok(Err(e)) => anyhow::bail!("event channel closed: {e}"),
        Err(_) => anyhow::bail!("forced session end was not signalled"),
    }

    sister_engine.shutdown();
    engine.shutdown();
    info!("simulation finished");
    Ok(())
}
