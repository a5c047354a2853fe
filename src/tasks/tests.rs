use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use num_bigint::BigInt;

use super::*;
use crate::config::{FetchConfig, SiteConfig};
use crate::fetch::Fetcher;
use crate::state::SqliteStore;
use crate::traits::{
    DeathStore, PlayerStore, PlaytimeStore, PresenceStore, ProgressStore, WorldStore,
};
use crate::types::ServerKind;

#[derive(Clone, Default)]
struct FakeSite {
    xp_bonus: Arc<AtomicU64>,
    highscore_posts: Arc<AtomicUsize>,
    down: Arc<AtomicBool>,
    /// Repeat page 1's leader on page 2, as a ranking that moved mid-walk.
    shifted_ranking: Arc<AtomicBool>,
    /// Drop Aeon from the Red Rose roster.
    aeon_left: Arc<AtomicBool>,
}

type Params = HashMap<String, String>;

fn page(body: String) -> Response {
    axum::response::Html(body).into_response()
}

async fn site_get(State(site): State<FakeSite>, Query(q): Query<Params>) -> Response {
    if site.down.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    match (q.get("subtopic").map(String::as_str), q.get("world").map(String::as_str)) {
        (Some("worlds"), Some("Auroria")) => page(
            r#"<table>
                <tr><td>Name</td><td>Level</td><td>Vocation</td></tr>
                <tr><td>Aeon (Guild Leader)</td><td>512</td><td>Elite Knight</td></tr>
                <tr><td>Brisa</td><td>300</td><td>Druid</td></tr>
                <tr><td>half a row</td></tr>
            </table>"#
                .to_string(),
        ),
        (Some("guilds"), _) if q.get("GuildName").map(String::as_str) == Some("Red Rose") => {
            let aeon = if site.aeon_left.load(Ordering::SeqCst) {
                ""
            } else {
                "<tr><td>Aeon (Guild Leader)</td><td>Elite Knight</td></tr>"
            };
            page(format!(
                r#"<table>
                    <tr><td>Name</td><td>Vocation</td></tr>
                    {}
                    <tr><td>Brisa</td><td>Druid</td></tr>
                </table>"#,
                aeon
            ))
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn site_post(
    State(site): State<FakeSite>,
    Query(q): Query<Params>,
    Form(form): Form<Params>,
) -> Response {
    if site.down.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let server = form.get("server").cloned().unwrap_or_default();
    match q.get("subtopic").map(String::as_str) {
        Some("guilds") => page(
            r#"<ul>
                <li><a href="/?subtopic=guilds&page=view&GuildName=Red+Rose">Red Rose</a></li>
                <li><a href="/?subtopic=guilds&page=view&GuildName=Blue+Moon">Blue Moon</a></li>
            </ul>"#
                .to_string(),
        ),
        Some("latestdeaths") if server == "Auroria" => page(
            r#"<table>
                <tr><td>Victim</td><td>Killer</td><td>Time</td></tr>
                <tr><td>Aeon</td><td>a dragon lord</td><td>Jan 27 2026, 14:30:00 CET</td></tr>
                <tr><td>Stranger</td><td></td><td>Jan 27 2026, 14:31:00 CET</td></tr>
                <tr><td>Broken</td><td>x</td><td>not a time</td></tr>
            </table>"#
                .to_string(),
        ),
        Some("latestdeaths") => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Some("highscores") => {
            site.highscore_posts.fetch_add(1, Ordering::SeqCst);
            let page_no = form.get("page").map(String::as_str);
            if page_no == Some("2") && site.shifted_ranking.load(Ordering::SeqCst) {
                return page(format!(
                    r#"<table>
                        <tr><td>Rank</td><td>Name</td><td>Level</td><td>Points</td></tr>
                        <tr><td>51</td><td>Aeon</td><td>512</td><td>{}</td></tr>
                    </table>"#,
                    BigInt::from(9_007_199_254_740_993u64)
                ));
            }
            if page_no != Some("1") {
                return page("<table><tr><td>Rank</td><td>Name</td></tr></table>".to_string());
            }
            let bonus = site.xp_bonus.load(Ordering::SeqCst);
            page(format!(
                r#"<table>
                    <tr><td>Rank</td><td>Name</td><td>Level</td><td>Points</td></tr>
                    <tr><td>1</td><td>Aeon</td><td>512</td><td>{}</td></tr>
                    <tr><td>2</td><td>Brisa</td><td>300</td><td>1,000,000</td></tr>
                </table>"#,
                BigInt::from(9_007_199_254_740_993u64) + bonus
            ))
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn character(Path(name): Path<String>) -> Response {
    if name != "Aeon" {
        return StatusCode::NOT_FOUND.into_response();
    }
    page(
        r#"<div><h3>Online Time History</h3><table>
            <tr><td>Date</td><td>Duration</td></tr>
            <tr><td>2026-01-25 20:10:00</td><td>2h</td></tr>
            <tr><td>2026-01-25 20:40:00</td><td>1h</td></tr>
            <tr><td>2026-01-26 08:00:00</td><td>1h</td></tr>
        </table></div>"#
            .to_string(),
    )
}

struct Harness {
    ctx: Arc<TaskContext>,
    store: Arc<SqliteStore>,
    site: FakeSite,
    auroria: String,
    _db: tempfile::NamedTempFile,
}

async fn harness() -> Harness {
    let site = FakeSite::default();
    let app = Router::new()
        .route("/", get(site_get).post(site_post))
        .route("/character/{name}", get(character))
        .with_state(site.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let fetch = FetchConfig {
        base_url: format!("http://{}", addr),
        delay_min_ms: 0,
        delay_max_ms: 0,
        timeout_secs: 5,
        ..FetchConfig::default()
    };

    let db = tempfile::NamedTempFile::new().unwrap();
    let store = Arc::new(
        SqliteStore::new(db.path().to_str().unwrap(), 2)
            .await
            .unwrap(),
    );
    let auroria = store
        .upsert_server("Auroria", ServerKind::OpenPvp)
        .await
        .unwrap();

    let ctx = Arc::new(TaskContext {
        store: store.clone(),
        engine: Arc::new(StateEngine::new(store.clone())),
        site: Arc::new(Fetcher::new(&fetch).unwrap()),
        history: Arc::new(Fetcher::new(&fetch).unwrap()),
        paths: SiteConfig::default(),
        highscore_pages: 3,
        playtime_limit: 10,
    });

    Harness {
        ctx,
        store,
        site,
        auroria,
        _db: db,
    }
}

#[tokio::test]
async fn online_players_task_flags_listed_players() {
    let h = harness().await;
    let outcome = OnlinePlayersTask::new(h.ctx.clone()).execute().await.unwrap();
    assert_eq!(outcome.units_ok, 1);
    assert_eq!(outcome.status(), RunStatus::Success);
    assert!(outcome.message.contains("Auroria: 2 online"));

    let aeon = h.store.find_player("Aeon", &h.auroria).await.unwrap().unwrap();
    assert!(h.store.online_status(&aeon).await.unwrap().unwrap().is_online);
}

#[tokio::test]
async fn guild_members_task_links_roster_and_warns_on_missing_guild() {
    let h = harness().await;
    h.store.upsert_guild("Red Rose", &h.auroria, true).await.unwrap();
    h.store.upsert_guild("Ghost Crew", &h.auroria, false).await.unwrap();

    let outcome = GuildMembersTask::new(h.ctx.clone()).execute().await.unwrap();
    assert_eq!(outcome.units_ok, 1);
    assert_eq!(outcome.warnings, 1);
    assert_eq!(outcome.status(), RunStatus::Warning);
    assert!(outcome.message.contains("Ghost Crew not found on Auroria"));

    assert_eq!(
        h.store.current_guild_ally_flag("Aeon", &h.auroria).await.unwrap(),
        Some(true)
    );
    let members = h.store.list_guild_players(10).await.unwrap();
    assert_eq!(members.len(), 2);
}

#[tokio::test]
async fn killboard_task_does_not_duplicate_deaths() {
    let h = harness().await;
    let task = KillboardTask::new(h.ctx.clone());

    let first = task.execute().await.unwrap();
    assert!(first.message.contains("Auroria: 2 new deaths"));
    let second = task.execute().await.unwrap();
    assert!(second.message.contains("Auroria: 0 new deaths"));
    assert_eq!(h.store.count_deaths(&h.auroria).await.unwrap(), 2);
}

#[tokio::test]
async fn killboard_failure_on_one_server_is_isolated() {
    let h = harness().await;
    let belobra = h
        .store
        .upsert_server("Belobra", ServerKind::RetroPvp)
        .await
        .unwrap();

    let outcome = KillboardTask::new(h.ctx.clone()).execute().await.unwrap();
    assert_eq!(outcome.units_ok, 1);
    assert_eq!(outcome.units_failed, 1);
    assert_eq!(outcome.status(), RunStatus::Warning);
    assert_eq!(h.store.count_deaths(&h.auroria).await.unwrap(), 2);
    assert_eq!(h.store.count_deaths(&belobra).await.unwrap(), 0);
}

#[tokio::test]
async fn every_server_failing_is_an_error() {
    let h = harness().await;
    h.site.down.store(true, Ordering::SeqCst);
    let err = OnlinePlayersTask::new(h.ctx.clone())
        .execute()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("all 1 servers failed"));
}

#[tokio::test]
async fn highscores_task_opens_session_when_experience_grows() {
    let h = harness().await;
    let task = HighscoresTask::new(h.ctx.clone());

    task.execute().await.unwrap();
    // Page 1 has entries, page 2 is empty, page 3 is never requested.
    assert_eq!(h.site.highscore_posts.load(Ordering::SeqCst), 2);

    h.site.xp_bonus.store(4_200, Ordering::SeqCst);
    let outcome = task.execute().await.unwrap();
    assert!(outcome.message.contains("2 entries, 1 hunting"));

    let aeon = h.store.find_player("Aeon", &h.auroria).await.unwrap().unwrap();
    let session = h.store.active_session(&aeon).await.unwrap().unwrap();
    assert_eq!(session.xp_gained, BigInt::from(4_200));
    let snapshot = h.store.latest_snapshot(&aeon).await.unwrap().unwrap();
    assert_eq!(snapshot.experience, BigInt::from(9_007_199_254_745_193u64));

    let brisa = h.store.find_player("Brisa", &h.auroria).await.unwrap().unwrap();
    assert!(h.store.active_session(&brisa).await.unwrap().is_none());
}

#[tokio::test]
async fn playtime_task_buckets_history_and_skips_unknown_players() {
    let h = harness().await;
    h.store.upsert_guild("Red Rose", &h.auroria, true).await.unwrap();
    GuildMembersTask::new(h.ctx.clone()).execute().await.unwrap();

    let outcome = PlaytimeTask::new(h.ctx.clone()).execute().await.unwrap();
    assert_eq!(outcome.units_ok, 2);
    assert_eq!(outcome.status(), RunStatus::Success);

    let aeon = h.store.find_player("Aeon", &h.auroria).await.unwrap().unwrap();
    let patterns = h.store.playtime_for(&aeon).await.unwrap();
    let counts: Vec<(u8, u8, u32)> = patterns
        .iter()
        .map(|p| (p.bucket.day_of_week, p.bucket.hour_of_day, p.frequency))
        .collect();
    assert_eq!(counts, vec![(0, 20, 2), (1, 8, 1)]);
}

#[tokio::test]
async fn registry_builds_every_task_once() {
    let h = harness().await;
    let names: Vec<&str> = registry(h.ctx.clone()).iter().map(|t| t.name()).collect();
    assert_eq!(
        names,
        vec!["guild_members", "online_players", "killboard", "highscores", "playtime"]
    );
}

#[tokio::test]
async fn highscores_player_listed_on_two_pages_is_sampled_once() {
    let h = harness().await;
    h.site.shifted_ranking.store(true, Ordering::SeqCst);
    let task = HighscoresTask::new(h.ctx.clone());

    task.execute().await.unwrap();
    // Page 2 repeats Aeon, page 3 is empty.
    assert_eq!(h.site.highscore_posts.load(Ordering::SeqCst), 3);

    h.site.xp_bonus.store(5_000, Ordering::SeqCst);
    let outcome = task.execute().await.unwrap();
    assert!(outcome.message.contains("2 entries, 1 hunting"));

    let aeon = h.store.find_player("Aeon", &h.auroria).await.unwrap().unwrap();
    assert!(h.store.online_status(&aeon).await.unwrap().unwrap().is_hunting);
    let sessions = h.store.sessions_for(&aeon).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].is_active);
    assert_eq!(sessions[0].xp_gained, BigInt::from(5_000));

    let snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM xp_snapshots WHERE player_id = ?")
        .bind(&aeon)
        .fetch_one(h.store.pool())
        .await
        .unwrap();
    assert_eq!(snapshots, 2);
}

#[tokio::test]
async fn departed_guild_member_deaths_are_not_ally_deaths() {
    let h = harness().await;
    h.store.upsert_guild("Red Rose", &h.auroria, true).await.unwrap();
    let task = GuildMembersTask::new(h.ctx.clone());
    task.execute().await.unwrap();
    assert_eq!(
        h.store.current_guild_ally_flag("Aeon", &h.auroria).await.unwrap(),
        Some(true)
    );

    h.site.aeon_left.store(true, Ordering::SeqCst);
    task.execute().await.unwrap();
    assert_eq!(
        h.store.current_guild_ally_flag("Aeon", &h.auroria).await.unwrap(),
        None
    );
    assert_eq!(
        h.store.current_guild_ally_flag("Brisa", &h.auroria).await.unwrap(),
        Some(true)
    );

    KillboardTask::new(h.ctx.clone()).execute().await.unwrap();
    let ally: i32 = sqlx::query_scalar("SELECT is_ally_death FROM deaths WHERE victim_name = 'Aeon'")
        .fetch_one(h.store.pool())
        .await
        .unwrap();
    assert_eq!(ally, 0);
}
