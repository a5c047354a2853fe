use super::*;

#[async_trait]
impl crate::traits::WorldStore for SqliteStore {
    async fn upsert_server(&self, name: &str, kind: ServerKind) -> anyhow::Result<String> {
        let row = sqlx::query(
            "INSERT INTO servers (id, name, server_type, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET server_type = excluded.server_type
             RETURNING id",
        )
        .bind(new_id())
        .bind(name)
        .bind(kind.as_str())
        .bind(fmt_ts(Utc::now()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn upsert_guild(
        &self,
        name: &str,
        server_id: &str,
        is_ally: bool,
    ) -> anyhow::Result<String> {
        let now = fmt_ts(Utc::now());
        let row = sqlx::query(
            "INSERT INTO guilds (id, name, server_id, is_ally, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(name, server_id) DO UPDATE SET
               is_ally = excluded.is_ally,
               updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(new_id())
        .bind(name)
        .bind(server_id)
        .bind(is_ally as i32)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn list_servers(&self) -> anyhow::Result<Vec<Server>> {
        let rows = sqlx::query("SELECT id, name, server_type FROM servers ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let kind: String = row.get("server_type");
                Server {
                    id: row.get("id"),
                    name: row.get("name"),
                    kind: if kind == ServerKind::RetroPvp.as_str() {
                        ServerKind::RetroPvp
                    } else {
                        ServerKind::OpenPvp
                    },
                }
            })
            .collect())
    }

    async fn list_guilds(&self) -> anyhow::Result<Vec<Guild>> {
        let rows = sqlx::query(
            "SELECT g.id, g.name, g.server_id, g.is_ally, s.name AS server_name
             FROM guilds g
             INNER JOIN servers s ON g.server_id = s.id
             ORDER BY s.name, g.name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Guild {
                id: row.get("id"),
                name: row.get("name"),
                server_id: row.get("server_id"),
                server_name: row.get("server_name"),
                is_ally: row.get::<i32, _>("is_ally") != 0,
            })
            .collect())
    }

    async fn insert_roster_snapshot(
        &self,
        guild_id: &str,
        members: &[RosterEntry],
        snapshot_time: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let ts = fmt_ts(snapshot_time);
        let mut tx = self.pool.begin().await?;
        for member in members {
            sqlx::query(
                "INSERT INTO guild_member_snapshots (guild_id, player_name, vocation, snapshot_time)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(guild_id)
            .bind(&member.player_name)
            .bind(member.vocation.as_str())
            .bind(&ts)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
