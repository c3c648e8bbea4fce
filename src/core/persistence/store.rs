// src/core/persistence/store.rs

//! Typed Team/Blob CRUD, expressed as queued operations over the
//! [`PersistenceQueue`]. `create` fails with `AlreadyExists` if the
//! name is taken; `get` fails with `NotFound` if absent. `exists`
//! returns `false` on any store error rather than propagating it;
//! callers that need certainty use `get`.

use super::queue::PersistenceQueue;
use crate::core::errors::KothError;
use crate::core::model::{Blob, Team};
use sqlx::Row;

#[derive(Clone)]
pub struct Store {
    queue: PersistenceQueue,
}

impl Store {
    pub fn new(queue: PersistenceQueue) -> Self {
        Self { queue }
    }

    // --- Team operations ---

    pub async fn team_exists(&self, name: &str) -> bool {
        let name = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("SELECT 1 FROM teams WHERE name = ?;")
                        .bind(&name)
                        .fetch_optional(conn)
                        .await
                        .map(|row| row.is_some())
                        .map_err(KothError::from)
                })
            })
            .await
            .unwrap_or(false)
    }

    pub async fn team_create(&self, team: Team) -> Result<Team, KothError> {
        if self.team_exists(&team.name).await {
            return Err(KothError::AlreadyExists(format!("team '{}'", team.name)));
        }

        let t = team.clone();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "INSERT INTO teams (name, container_ip, container_id, score) VALUES (?, ?, ?, ?);",
                    )
                    .bind(&t.name)
                    .bind(&t.container_ip)
                    .bind(t.container_id)
                    .bind(t.score)
                    .execute(conn)
                    .await
                    .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await?;

        self.team_get(&team.name).await
    }

    pub async fn team_get(&self, name: &str) -> Result<Team, KothError> {
        let name_owned = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(
                        "SELECT name, container_ip, container_id, score, uptimeChecksTotal, \
                         uptimeChecksPassed, serviceChecksTotal, serviceChecksPassed FROM teams WHERE name = ?;",
                    )
                    .bind(&name_owned)
                    .fetch_optional(conn)
                    .await
                    .map_err(KothError::from)?;

                    match row {
                        Some(row) => Ok(row_to_team(&row)),
                        None => Err(KothError::NotFound(format!("team '{name_owned}'"))),
                    }
                })
            })
            .await
    }

    pub async fn team_delete(&self, name: &str) -> Result<(), KothError> {
        let name = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM teams WHERE name = ?;")
                        .bind(&name)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn team_update_ip(&self, name: &str, container_ip: &str) -> Result<(), KothError> {
        let name = name.to_string();
        let ip = container_ip.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("UPDATE teams SET container_ip = ? WHERE name = ?;")
                        .bind(&ip)
                        .bind(&name)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn team_update_id(&self, name: &str, container_id: i64) -> Result<(), KothError> {
        let name = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("UPDATE teams SET container_id = ? WHERE name = ?;")
                        .bind(container_id)
                        .bind(&name)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn team_update_score(&self, name: &str, score: i64) -> Result<(), KothError> {
        let name = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("UPDATE teams SET score = ? WHERE name = ?;")
                        .bind(score)
                        .bind(&name)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn team_update_uptime_checks(&self, name: &str, total: i64, passed: i64) -> Result<(), KothError> {
        let name = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("UPDATE teams SET uptimeChecksTotal = ?, uptimeChecksPassed = ? WHERE name = ?;")
                        .bind(total)
                        .bind(passed)
                        .bind(&name)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn team_update_service_checks(&self, name: &str, total: i64, passed: i64) -> Result<(), KothError> {
        let name = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("UPDATE teams SET serviceChecksTotal = ?, serviceChecksPassed = ? WHERE name = ?;")
                        .bind(total)
                        .bind(passed)
                        .bind(&name)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn team_update_full(&self, team: &Team) -> Result<(), KothError> {
        let t = team.clone();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query(
                        "UPDATE teams SET container_ip = ?, container_id = ?, score = ?, \
                         uptimeChecksTotal = ?, uptimeChecksPassed = ?, serviceChecksTotal = ?, \
                         serviceChecksPassed = ? WHERE name = ?;",
                    )
                    .bind(&t.container_ip)
                    .bind(t.container_id)
                    .bind(t.score)
                    .bind(t.uptime_checks_total)
                    .bind(t.uptime_checks_passed)
                    .bind(t.service_checks_total)
                    .bind(t.service_checks_passed)
                    .bind(&t.name)
                    .execute(conn)
                    .await
                    .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn team_list(&self) -> Result<Vec<Team>, KothError> {
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    let rows = sqlx::query(
                        "SELECT name, container_ip, container_id, score, uptimeChecksTotal, \
                         uptimeChecksPassed, serviceChecksTotal, serviceChecksPassed FROM teams;",
                    )
                    .fetch_all(conn)
                    .await
                    .map_err(KothError::from)?;
                    Ok(rows.iter().map(row_to_team).collect())
                })
            })
            .await
    }

    pub async fn team_list_ordered_by_score_desc(&self) -> Result<Vec<Team>, KothError> {
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    let rows = sqlx::query(
                        "SELECT name, container_ip, container_id, score, uptimeChecksTotal, \
                         uptimeChecksPassed, serviceChecksTotal, serviceChecksPassed FROM teams \
                         ORDER BY score DESC;",
                    )
                    .fetch_all(conn)
                    .await
                    .map_err(KothError::from)?;
                    Ok(rows.iter().map(row_to_team).collect())
                })
            })
            .await
    }

    // --- Blob operations ---

    pub async fn blob_exists(&self, name: &str) -> bool {
        let name = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("SELECT 1 FROM blobs WHERE name = ?;")
                        .bind(&name)
                        .fetch_optional(conn)
                        .await
                        .map(|row| row.is_some())
                        .map_err(KothError::from)
                })
            })
            .await
            .unwrap_or(false)
    }

    pub async fn blob_create(&self, name: &str, value: &str) -> Result<Blob, KothError> {
        if self.blob_exists(name).await {
            return Err(KothError::AlreadyExists(format!("blob '{name}'")));
        }

        let n = name.to_string();
        let v = value.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO blobs (name, value) VALUES (?, ?);")
                        .bind(&n)
                        .bind(&v)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await?;

        self.blob_get(name).await
    }

    pub async fn blob_get(&self, name: &str) -> Result<Blob, KothError> {
        let name_owned = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query("SELECT name, value FROM blobs WHERE name = ?;")
                        .bind(&name_owned)
                        .fetch_optional(conn)
                        .await
                        .map_err(KothError::from)?;
                    match row {
                        Some(row) => Ok(Blob {
                            name: row.get::<String, _>("name"),
                            value: row.get::<String, _>("value"),
                        }),
                        None => Err(KothError::NotFound(format!("blob '{name_owned}'"))),
                    }
                })
            })
            .await
    }

    pub async fn blob_delete(&self, name: &str) -> Result<(), KothError> {
        let name = name.to_string();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM blobs WHERE name = ?;")
                        .bind(&name)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn blob_update(&self, blob: &Blob) -> Result<(), KothError> {
        let b = blob.clone();
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    sqlx::query("UPDATE blobs SET value = ? WHERE name = ?;")
                        .bind(&b.value)
                        .bind(&b.name)
                        .execute(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(())
                })
            })
            .await
    }

    pub async fn blob_list(&self) -> Result<Vec<Blob>, KothError> {
        self.queue
            .submit(move |conn| {
                Box::pin(async move {
                    let rows = sqlx::query("SELECT name, value FROM blobs;")
                        .fetch_all(conn)
                        .await
                        .map_err(KothError::from)?;
                    Ok(rows
                        .iter()
                        .map(|row| Blob {
                            name: row.get::<String, _>("name"),
                            value: row.get::<String, _>("value"),
                        })
                        .collect())
                })
            })
            .await
    }
}

fn row_to_team(row: &sqlx::sqlite::SqliteRow) -> Team {
    Team {
        name: row.get::<String, _>("name"),
        container_ip: row.get::<String, _>("container_ip"),
        container_id: row.get::<i64, _>("container_id"),
        score: row.get::<i64, _>("score"),
        uptime_checks_total: row.get::<i64, _>("uptimeChecksTotal"),
        uptime_checks_passed: row.get::<i64, _>("uptimeChecksPassed"),
        service_checks_total: row.get::<i64, _>("serviceChecksTotal"),
        service_checks_passed: row.get::<i64, _>("serviceChecksPassed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        let queue = PersistenceQueue::connect(":memory:", 32).await.unwrap();
        Store::new(queue)
    }

    #[tokio::test]
    async fn create_then_get_round_trips_every_field() {
        let store = test_store().await;
        let team = Team::new("Team 1".to_string(), "10.0.0.2".to_string(), 101);
        store.team_create(team.clone()).await.unwrap();

        let fetched = store.team_get("Team 1").await.unwrap();
        assert_eq!(fetched, team);
    }

    #[tokio::test]
    async fn create_twice_fails_with_already_exists() {
        let store = test_store().await;
        let team = Team::new("Team 1".to_string(), "10.0.0.2".to_string(), 101);
        store.team_create(team.clone()).await.unwrap();

        let err = store.team_create(team).await.unwrap_err();
        assert!(matches!(err, KothError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn get_missing_team_fails_with_not_found() {
        let store = test_store().await;
        let err = store.team_get("nope").await.unwrap_err();
        assert!(matches!(err, KothError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_full_reflects_every_field() {
        let store = test_store().await;
        let mut team = Team::new("Team 1".to_string(), "10.0.0.2".to_string(), 101);
        store.team_create(team.clone()).await.unwrap();

        team.score = -4;
        team.uptime_checks_total = 10;
        team.uptime_checks_passed = 7;
        team.service_checks_total = 3;
        team.service_checks_passed = 1;
        store.team_update_full(&team).await.unwrap();

        let fetched = store.team_get("Team 1").await.unwrap();
        assert_eq!(fetched, team);
    }

    #[tokio::test]
    async fn exists_is_false_for_absent_team() {
        let store = test_store().await;
        assert!(!store.team_exists("nobody").await);
    }

    #[tokio::test]
    async fn list_ordered_by_score_desc() {
        let store = test_store().await;
        store
            .team_create(Team::new("Low".to_string(), "10.0.0.2".to_string(), 1))
            .await
            .unwrap();
        store
            .team_create(Team::new("High".to_string(), "10.0.0.3".to_string(), 2))
            .await
            .unwrap();
        store.team_update_score("High", 50).await.unwrap();
        store.team_update_score("Low", -10).await.unwrap();

        let teams = store.team_list_ordered_by_score_desc().await.unwrap();
        assert_eq!(teams[0].name, "High");
        assert_eq!(teams[1].name, "Low");
    }

    #[tokio::test]
    async fn blob_round_trips() {
        let store = test_store().await;
        store.blob_create("state", "{}").await.unwrap();
        let blob = store.blob_get("state").await.unwrap();
        assert_eq!(blob.value, "{}");

        store
            .blob_update(&Blob {
                name: "state".to_string(),
                value: "{\"x\":1}".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(store.blob_get("state").await.unwrap().value, "{\"x\":1}");
    }
}
