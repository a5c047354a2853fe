//! Turns point-in-time samples into hunting sessions, online flags and death
//! records.
//!
//! The engine is the only component that decides hunting and online
//! transitions; the store just executes the writes. Experience arithmetic is
//! done on [`BigInt`] and cumulative session totals only ever grow.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use num_traits::Signed;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::extract::{OnlinePlayer, ScrapedDeath};
use crate::traits::{MonitorStore, NewDeath, PlayerUpsert, Snapshot};

/// What a single experience sample did to the player's derived state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// No earlier snapshot, so no delta could be computed.
    FirstSample,
    Opened {
        session_id: String,
        gained: BigInt,
    },
    Extended {
        session_id: String,
        gained: BigInt,
        total: BigInt,
    },
    /// Zero delta. `closed` counts sessions that were ended.
    Stalled { closed: u64 },
    /// Negative delta, handled like a stall.
    Regressed { delta: BigInt, closed: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub marked_offline: u64,
    pub online: usize,
    pub failed: usize,
}

pub struct StateEngine {
    store: Arc<dyn MonitorStore>,
}

impl StateEngine {
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self { store }
    }

    /// Record one `(level, experience)` observation and apply the session
    /// transition implied by the delta to the previous observation.
    pub async fn record_sample(
        &self,
        player_id: &str,
        level: u32,
        experience: BigInt,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Transition> {
        let prior = self.store.latest_snapshot(player_id).await?;
        self.store
            .insert_snapshot(&Snapshot {
                player_id: player_id.to_string(),
                level,
                experience: experience.clone(),
                captured_at: now,
            })
            .await?;

        let Some(prior) = prior else {
            return Ok(Transition::FirstSample);
        };

        let delta = &experience - &prior.experience;
        if delta.is_positive() {
            if let Some(rate) = xp_per_minute(&delta, now - prior.captured_at) {
                debug!(player_id, gained = %delta, xp_per_minute = %rate, "Player is gaining experience");
            }
            self.store.set_hunting(player_id, true).await?;
            return self.extend_or_open(player_id, delta, now).await;
        }

        self.store.set_hunting(player_id, false).await?;
        let closed = self.store.close_active_sessions(player_id, now).await?;
        if delta.is_negative() {
            warn!(
                player_id,
                previous = %prior.experience,
                current = %experience,
                "Experience went down; treating as no gain"
            );
            return Ok(Transition::Regressed { delta, closed });
        }
        Ok(Transition::Stalled { closed })
    }

    async fn extend_or_open(
        &self,
        player_id: &str,
        gained: BigInt,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Transition> {
        if let Some(active) = self.store.active_session(player_id).await? {
            return self.extend(active.id, active.xp_gained, gained).await;
        }

        match self.store.open_session(player_id, now, &gained).await {
            Ok(session_id) => Ok(Transition::Opened { session_id, gained }),
            Err(e) => {
                // Lost a race against another writer; the unique index kept a
                // single active session, so extend that one instead.
                match self.store.active_session(player_id).await? {
                    Some(active) => self.extend(active.id, active.xp_gained, gained).await,
                    None => Err(e),
                }
            }
        }
    }

    async fn extend(
        &self,
        session_id: String,
        previous_total: BigInt,
        gained: BigInt,
    ) -> anyhow::Result<Transition> {
        let total = previous_total + &gained;
        self.store.update_session_xp(&session_id, &total).await?;
        Ok(Transition::Extended {
            session_id,
            gained,
            total,
        })
    }

    /// Reset every player of the world to offline, then flag each listed
    /// player online. A player missing from `players` is offline as soon as
    /// this returns.
    pub async fn sweep_online(
        &self,
        server_id: &str,
        players: &[OnlinePlayer],
        now: DateTime<Utc>,
    ) -> anyhow::Result<SweepSummary> {
        let mut summary = SweepSummary {
            marked_offline: self.store.mark_server_offline(server_id).await?,
            ..SweepSummary::default()
        };

        for player in players {
            let result = async {
                let player_id = self
                    .store
                    .upsert_player(&PlayerUpsert {
                        name: player.name.clone(),
                        server_id: server_id.to_string(),
                        level: Some(player.level),
                        vocation: Some(player.vocation),
                        guild_id: None,
                    })
                    .await?;
                self.store.mark_online(&player_id, now).await
            }
            .await;

            match result {
                Ok(()) => summary.online += 1,
                Err(e) => {
                    warn!(server_id, player = %player.name, error = %e, "Failed to flag player online");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Store a death unless `(victim, time, server)` is already known.
    ///
    /// Ally classification reads the victim's guild as it is right now and is
    /// never revisited. Returns `true` for a new record.
    pub async fn ingest_death(&self, server_id: &str, death: &ScrapedDeath) -> anyhow::Result<bool> {
        let victim_id = self.store.find_player(&death.victim_name, server_id).await?;
        let is_ally_death = self
            .store
            .current_guild_ally_flag(&death.victim_name, server_id)
            .await?
            .unwrap_or(false);

        let inserted = self
            .store
            .insert_death(&NewDeath {
                victim_name: death.victim_name.clone(),
                victim_id,
                killer_name: death.killer_name.clone(),
                death_time: death.death_time,
                server_id: server_id.to_string(),
                is_ally_death,
            })
            .await?;

        if inserted {
            info!(
                server_id,
                victim = %death.victim_name,
                killer = death.killer_name.as_deref().unwrap_or("environment"),
                ally = is_ally_death,
                "New death recorded"
            );
        }
        Ok(inserted)
    }
}

/// Whole experience points per whole minute. `None` when less than a minute
/// has passed.
pub fn xp_per_minute(gained: &BigInt, elapsed: chrono::Duration) -> Option<BigInt> {
    let minutes = elapsed.num_minutes();
    if minutes <= 0 {
        return None;
    }
    Some(gained / BigInt::from(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SqliteStore;
    use crate::traits::{DeathStore, PlayerStore, PresenceStore, ProgressStore, WorldStore};
    use crate::types::{ServerKind, Vocation};
    use chrono::{Duration, TimeZone};
    use sqlx::Row;
    use std::str::FromStr;

    struct Fixture {
        engine: StateEngine,
        store: Arc<SqliteStore>,
        server_id: String,
        _db: tempfile::NamedTempFile,
    }

    async fn fixture() -> Fixture {
        let db = tempfile::NamedTempFile::new().unwrap();
        let store = Arc::new(
            SqliteStore::new(db.path().to_str().unwrap(), 2)
                .await
                .unwrap(),
        );
        let server_id = store
            .upsert_server("Auroria", ServerKind::OpenPvp)
            .await
            .unwrap();
        Fixture {
            engine: StateEngine::new(store.clone()),
            store,
            server_id,
            _db: db,
        }
    }

    async fn player(fx: &Fixture, name: &str) -> String {
        fx.store
            .upsert_player(&PlayerUpsert {
                name: name.to_string(),
                server_id: fx.server_id.clone(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    /// Whole-second clock so stored timestamps compare equal after a round trip.
    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(Utc::now().timestamp(), 0).unwrap()
    }

    fn big(s: &str) -> BigInt {
        BigInt::from_str(s).unwrap()
    }

    async fn active_count(fx: &Fixture, player_id: &str) -> usize {
        fx.store
            .sessions_for(player_id)
            .await
            .unwrap()
            .iter()
            .filter(|s| s.is_active)
            .count()
    }

    #[tokio::test]
    async fn first_sample_only_records() {
        let fx = fixture().await;
        let p = player(&fx, "Aeon").await;
        let t = fx
            .engine
            .record_sample(&p, 300, big("1000"), now())
            .await
            .unwrap();
        assert_eq!(t, Transition::FirstSample);
        assert!(fx.store.sessions_for(&p).await.unwrap().is_empty());
        assert!(fx.store.latest_snapshot(&p).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn positive_deltas_open_then_extend_by_exact_amounts() {
        let fx = fixture().await;
        let p = player(&fx, "Aeon").await;
        let t0 = now();
        let base = big("9007199254740993000");

        fx.engine.record_sample(&p, 900, base.clone(), t0).await.unwrap();
        let opened = fx
            .engine
            .record_sample(&p, 900, &base + 12_345, t0 + Duration::minutes(1))
            .await
            .unwrap();
        let (session_id, gained) = match opened {
            Transition::Opened { session_id, gained } => (session_id, gained),
            other => panic!("expected a new session, got {:?}", other),
        };
        assert_eq!(gained, BigInt::from(12_345));

        let extended = fx
            .engine
            .record_sample(&p, 901, &base + 20_000, t0 + Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(
            extended,
            Transition::Extended {
                session_id: session_id.clone(),
                gained: BigInt::from(7_655),
                total: BigInt::from(20_000),
            }
        );

        let active = fx.store.active_session(&p).await.unwrap().unwrap();
        assert_eq!(active.id, session_id);
        assert_eq!(active.xp_gained, BigInt::from(20_000));
        assert!(fx.store.online_status(&p).await.unwrap().unwrap().is_hunting);
    }

    #[tokio::test]
    async fn zero_delta_closes_and_keeps_total() {
        let fx = fixture().await;
        let p = player(&fx, "Aeon").await;
        let t0 = now();

        fx.engine.record_sample(&p, 100, big("500"), t0).await.unwrap();
        fx.engine
            .record_sample(&p, 100, big("800"), t0 + Duration::minutes(1))
            .await
            .unwrap();
        let t = fx
            .engine
            .record_sample(&p, 100, big("800"), t0 + Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(t, Transition::Stalled { closed: 1 });

        let sessions = fx.store.sessions_for(&p).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(!sessions[0].is_active);
        assert_eq!(sessions[0].end_time, Some(t0 + Duration::minutes(2)));
        assert_eq!(sessions[0].xp_gained, BigInt::from(300));
        assert!(!fx.store.online_status(&p).await.unwrap().unwrap().is_hunting);

        // Stalling again is a no-op.
        let again = fx
            .engine
            .record_sample(&p, 100, big("800"), t0 + Duration::minutes(3))
            .await
            .unwrap();
        assert_eq!(again, Transition::Stalled { closed: 0 });
    }

    #[tokio::test]
    async fn negative_delta_behaves_like_zero_and_never_subtracts() {
        let fx = fixture().await;
        let p = player(&fx, "Aeon").await;
        let t0 = now();

        fx.engine.record_sample(&p, 100, big("1000"), t0).await.unwrap();
        fx.engine
            .record_sample(&p, 100, big("1500"), t0 + Duration::minutes(1))
            .await
            .unwrap();
        let t = fx
            .engine
            .record_sample(&p, 99, big("1200"), t0 + Duration::minutes(2))
            .await
            .unwrap();
        assert_eq!(
            t,
            Transition::Regressed {
                delta: BigInt::from(-300),
                closed: 1
            }
        );

        let sessions = fx.store.sessions_for(&p).await.unwrap();
        assert_eq!(sessions[0].xp_gained, BigInt::from(500));
        assert!(!sessions[0].is_active);
        assert!(!fx.store.online_status(&p).await.unwrap().unwrap().is_hunting);

        // Growth after the drop starts a fresh session from the lower sample.
        let t = fx
            .engine
            .record_sample(&p, 99, big("1250"), t0 + Duration::minutes(3))
            .await
            .unwrap();
        assert!(matches!(t, Transition::Opened { ref gained, .. } if *gained == BigInt::from(50)));
    }

    #[tokio::test]
    async fn at_most_one_active_session_across_a_noisy_series() {
        let fx = fixture().await;
        let p = player(&fx, "Aeon").await;
        let t0 = now();
        let series = [100, 150, 150, 200, 260, 240, 240, 300, 301, 301];

        for (i, xp) in series.iter().enumerate() {
            fx.engine
                .record_sample(&p, 50, BigInt::from(*xp), t0 + Duration::minutes(i as i64))
                .await
                .unwrap();
            assert!(active_count(&fx, &p).await <= 1);
        }

        let sessions = fx.store.sessions_for(&p).await.unwrap();
        let totals: Vec<BigInt> = sessions.iter().map(|s| s.xp_gained.clone()).collect();
        assert_eq!(
            totals,
            vec![BigInt::from(50), BigInt::from(110), BigInt::from(61)]
        );
    }

    #[tokio::test]
    async fn absent_players_go_offline_in_the_same_sweep() {
        let fx = fixture().await;
        let t0 = now();
        let listing = |names: &[&str]| -> Vec<OnlinePlayer> {
            names
                .iter()
                .map(|n| OnlinePlayer {
                    name: n.to_string(),
                    level: 100,
                    vocation: Vocation::ElderDruid,
                })
                .collect()
        };

        let first = fx
            .engine
            .sweep_online(&fx.server_id, &listing(&["Aeon", "Brisa"]), t0)
            .await
            .unwrap();
        assert_eq!(first.online, 2);
        assert_eq!(first.marked_offline, 0);

        let second = fx
            .engine
            .sweep_online(&fx.server_id, &listing(&["Brisa"]), t0 + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(second.marked_offline, 2);
        assert_eq!(second.online, 1);

        let aeon = fx.store.find_player("Aeon", &fx.server_id).await.unwrap().unwrap();
        let brisa = fx.store.find_player("Brisa", &fx.server_id).await.unwrap().unwrap();
        let aeon_status = fx.store.online_status(&aeon).await.unwrap().unwrap();
        let brisa_status = fx.store.online_status(&brisa).await.unwrap().unwrap();
        assert!(!aeon_status.is_online);
        assert_eq!(aeon_status.last_seen, Some(t0));
        assert!(brisa_status.is_online);
        assert_eq!(brisa_status.last_seen, Some(t0 + Duration::seconds(30)));
    }

    #[tokio::test]
    async fn deaths_are_deduplicated_and_classified_at_ingestion() {
        let fx = fixture().await;
        let ally = fx
            .store
            .upsert_guild("Red Rose", &fx.server_id, true)
            .await
            .unwrap();
        fx.store
            .upsert_player(&PlayerUpsert {
                name: "Aeon".into(),
                server_id: fx.server_id.clone(),
                guild_id: Some(Some(ally)),
                ..Default::default()
            })
            .await
            .unwrap();

        let death = ScrapedDeath {
            victim_name: "Aeon".into(),
            killer_name: None,
            death_time: now(),
        };
        assert!(fx.engine.ingest_death(&fx.server_id, &death).await.unwrap());
        assert!(!fx.engine.ingest_death(&fx.server_id, &death).await.unwrap());

        // Reclassifying the guild later does not touch the stored row.
        fx.store
            .upsert_guild("Red Rose", &fx.server_id, false)
            .await
            .unwrap();
        let stranger = ScrapedDeath {
            victim_name: "Nobody".into(),
            killer_name: Some("Aeon".into()),
            death_time: death.death_time,
        };
        assert!(fx.engine.ingest_death(&fx.server_id, &stranger).await.unwrap());
        assert_eq!(fx.store.count_deaths(&fx.server_id).await.unwrap(), 2);

        let row = sqlx::query(
            "SELECT is_ally_death, victim_id FROM deaths WHERE victim_name = 'Aeon'",
        )
        .fetch_one(fx.store.pool())
        .await
        .unwrap();
        assert_eq!(row.get::<i32, _>("is_ally_death"), 1);
        assert!(row.get::<Option<String>, _>("victim_id").is_some());
    }

    #[test]
    fn xp_rate_uses_integer_division() {
        let gained = big("90071992547409930");
        assert_eq!(
            xp_per_minute(&gained, Duration::minutes(10)),
            Some(big("9007199254740993"))
        );
        assert_eq!(xp_per_minute(&gained, Duration::seconds(30)), None);
        assert_eq!(
            xp_per_minute(&BigInt::from(5), Duration::minutes(10)),
            Some(BigInt::from(0))
        );
    }
}
