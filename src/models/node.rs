//! Node model - the identity registry
//!
//! A node's id is a pure function of its credential, so concurrent first
//! submissions with the same credential converge on the same row and the
//! upsert is the only serialization point for creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};

/// Hex characters of the fingerprint used as the node id
const NODE_ID_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Node {
    pub id: String,
    #[serde(skip_serializing)]
    pub credential_fingerprint: String,
    pub display_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Node listing entry (map / node table)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub id: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Identity fields a submission may carry. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub display_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Identity derived from a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: String,
    pub fingerprint: String,
}

impl NodeIdentity {
    pub fn derive(credential: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(credential.as_bytes());
        let fingerprint = format!("{:x}", hasher.finalize());
        Self {
            id: fingerprint[..NODE_ID_LEN].to_string(),
            fingerprint,
        }
    }
}

impl Node {
    /// Name shown to consumers, falling back to `Node-<id>`
    pub fn name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("Node-{}", self.id))
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id.clone(),
            name: self.name(),
            latitude: self.latitude,
            longitude: self.longitude,
            last_seen: Some(self.last_seen),
        }
    }

    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Resolve the node for `identity`, creating it on first contact.
    ///
    /// Supplied fields overwrite, absent fields are kept, `last_seen` never
    /// moves backwards. Returns `None` when the derived id is already owned
    /// by a different credential fingerprint.
    pub async fn resolve_or_create<'e, E>(
        executor: E,
        identity: &NodeIdentity,
        update: &NodeUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>(
            r#"
            INSERT INTO nodes (id, credential_fingerprint, display_name, latitude, longitude, last_seen, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(id) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, nodes.display_name),
                latitude = COALESCE(excluded.latitude, nodes.latitude),
                longitude = COALESCE(excluded.longitude, nodes.longitude),
                last_seen = MAX(excluded.last_seen, nodes.last_seen)
            WHERE nodes.credential_fingerprint = excluded.credential_fingerprint
            RETURNING *
            "#
        )
        .bind(&identity.id)
        .bind(&identity.fingerprint)
        .bind(&update.display_name)
        .bind(update.latitude)
        .bind(update.longitude)
        .bind(now)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Node>(
            "SELECT * FROM nodes ORDER BY COALESCE(display_name, 'Node-' || id) ASC, id ASC"
        )
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;

    #[test]
    fn test_identity_is_deterministic() {
        let a = NodeIdentity::derive("k1");
        let b = NodeIdentity::derive("k1");
        let c = NodeIdentity::derive("k2");

        assert_eq!(a, b);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), NODE_ID_LEN);
        assert_eq!(a.fingerprint.len(), 64);
        assert!(a.fingerprint.starts_with(&a.id));
    }

    #[tokio::test]
    async fn test_first_contact_creates_node() {
        let pool = test_pool().await;
        let identity = NodeIdentity::derive("k1");
        let now = Utc::now();

        let node = Node::resolve_or_create(&pool, &identity, &NodeUpdate::default(), now)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(node.id, identity.id);
        assert_eq!(node.name(), format!("Node-{}", identity.id));
        assert!(!node.has_location());
        assert_eq!(node.last_seen, now);
        assert_eq!(node.created_at, now);
    }

    #[tokio::test]
    async fn test_absent_fields_keep_stored_values() {
        let pool = test_pool().await;
        let identity = NodeIdentity::derive("k1");
        let t0 = Utc::now();

        let update = NodeUpdate {
            display_name: Some("Garage".to_string()),
            latitude: Some(48.1),
            longitude: Some(11.5),
        };
        Node::resolve_or_create(&pool, &identity, &update, t0).await.unwrap();

        let t1 = t0 + Duration::seconds(30);
        let moved = NodeUpdate {
            latitude: Some(48.2),
            ..Default::default()
        };
        let node = Node::resolve_or_create(&pool, &identity, &moved, t1)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(node.display_name.as_deref(), Some("Garage"));
        assert_eq!(node.latitude, Some(48.2));
        assert_eq!(node.longitude, Some(11.5));
        assert_eq!(node.last_seen, t1);
        assert_eq!(node.created_at, t0);
    }

    #[tokio::test]
    async fn test_last_seen_never_moves_backwards() {
        let pool = test_pool().await;
        let identity = NodeIdentity::derive("k1");
        let t1 = Utc::now();

        Node::resolve_or_create(&pool, &identity, &NodeUpdate::default(), t1).await.unwrap();
        let node = Node::resolve_or_create(
            &pool,
            &identity,
            &NodeUpdate::default(),
            t1 - Duration::minutes(5),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(node.last_seen, t1);
    }

    #[tokio::test]
    async fn test_id_collision_is_rejected() {
        let pool = test_pool().await;
        let real = NodeIdentity::derive("k1");
        Node::resolve_or_create(&pool, &real, &NodeUpdate::default(), Utc::now())
            .await
            .unwrap();

        let impostor = NodeIdentity {
            id: real.id.clone(),
            fingerprint: "f".repeat(64),
        };
        let result = Node::resolve_or_create(&pool, &impostor, &NodeUpdate::default(), Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());

        let stored = Node::find_by_id(&pool, &real.id).await.unwrap().unwrap();
        assert_eq!(stored.credential_fingerprint, real.fingerprint);
    }

    #[tokio::test]
    async fn test_list_orders_by_name() {
        let pool = test_pool().await;
        for (key, name) in [("k1", "Zulu"), ("k2", "Alpha")] {
            let update = NodeUpdate {
                display_name: Some(name.to_string()),
                ..Default::default()
            };
            Node::resolve_or_create(&pool, &NodeIdentity::derive(key), &update, Utc::now())
                .await
                .unwrap();
        }

        let names: Vec<String> = Node::list(&pool).await.unwrap().iter().map(Node::name).collect();
        assert_eq!(names, vec!["Alpha", "Zulu"]);
    }
}
