//! Client session handling.
//!
//! Sessions are stored as `ogx:session:{id}` hashes and registered in a
//! `ogx:client_sessions:{client_id}` set so the per-client cap can be
//! enforced. The cap check and session creation are separate round trips:
//! two racing creates can both pass the check and briefly exceed the cap by
//! one. The next sweep or validation restores the invariant, and the cap is
//! a fairness guard, not a security boundary.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::carrier::Authenticator;
use crate::config::SessionConfig;
use crate::error::{GatewayError, Result};

fn session_key(session_id: &str) -> String {
    format!("ogx:session:{}", session_id)
}

fn client_sessions_key(client_id: &str) -> String {
    format!("ogx:client_sessions:{}", client_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub client_id: String,
    pub auth_token: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub last_access: i64,
    pub access_count: u64,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    fn to_hash(&self) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", self.client_id.clone()),
            ("auth_token", self.auth_token.clone()),
            ("created_at", self.created_at.to_string()),
            ("expires_at", self.expires_at.to_string()),
            ("last_access", self.last_access.to_string()),
            ("access_count", self.access_count.to_string()),
        ]
    }

    fn from_hash(id: &str, map: HashMap<String, String>) -> Option<Self> {
        Some(Self {
            id: id.to_string(),
            client_id: map.get("client_id")?.clone(),
            auth_token: map.get("auth_token")?.clone(),
            created_at: map.get("created_at")?.parse().ok()?,
            expires_at: map.get("expires_at")?.parse().ok()?,
            last_access: map.get("last_access")?.parse().ok()?,
            access_count: map.get("access_count")?.parse().ok()?,
        })
    }
}

pub struct SessionHandler<A: Authenticator> {
    conn: ConnectionManager,
    authenticator: A,
    config: SessionConfig,
}

impl<A: Authenticator> SessionHandler<A> {
    pub fn new(conn: ConnectionManager, authenticator: A, config: SessionConfig) -> Self {
        Self {
            conn,
            authenticator,
            config,
        }
    }

    /// Authenticate a client and open a new session.
    ///
    /// Fails when the client already holds the maximum number of live
    /// sessions. Dead registrations found during the count are pruned on the
    /// way, so a crashed client is not locked out until the next sweep.
    pub async fn create_session(
        &mut self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Session> {
        let active = self.active_session_count(client_id).await?;
        if active >= self.config.max_concurrent_sessions {
            return Err(GatewayError::protocol(format!(
                "Maximum concurrent sessions exceeded for client '{}' ({} active)",
                client_id, active
            )));
        }

        let auth_token = self
            .authenticator
            .authenticate(client_id, client_secret)
            .await?;

        let now = chrono::Utc::now().timestamp();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            auth_token,
            created_at: now,
            expires_at: now + self.config.session_timeout_secs,
            last_access: now,
            access_count: 0,
        };

        // Hash write and set registration land together
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(session_key(&session.id), &session.to_hash())
            .sadd(client_sessions_key(client_id), &session.id)
            .query_async(&mut self.conn)
            .await?;

        tracing::info!(
            session_id = %session.id,
            client_id = %client_id,
            "Created session"
        );
        Ok(session)
    }

    /// Look up a session, expiring it if its time has run out.
    ///
    /// A live hit bumps `last_access`/`access_count`; that update is
    /// best-effort and a failed bump still returns the session.
    pub async fn validate_session(&mut self, session_id: &str) -> Result<Option<Session>> {
        let mut session = match self.load(session_id).await? {
            Some(session) => session,
            None => return Ok(None),
        };

        let now = chrono::Utc::now().timestamp();
        if session.is_expired(now) {
            tracing::info!(session_id = %session_id, "Session expired");
            self.end_session(session_id).await?;
            return Ok(None);
        }

        session.last_access = now;
        session.access_count += 1;
        if let Err(e) = self.touch(&session).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to update session metadata");
        }
        Ok(Some(session))
    }

    /// Push a session's expiry out. `extension_secs` overrides the configured
    /// timeout when given.
    pub async fn refresh_session(
        &mut self,
        session_id: &str,
        extension_secs: Option<i64>,
    ) -> Result<Session> {
        let mut session = self
            .load(session_id)
            .await?
            .ok_or_else(|| GatewayError::auth(format!("unknown session '{session_id}'")))?;

        let now = chrono::Utc::now().timestamp();
        if session.is_expired(now) {
            self.end_session(session_id).await?;
            return Err(GatewayError::auth(format!(
                "session '{session_id}' has expired"
            )));
        }

        session.expires_at = now + extension_secs.unwrap_or(self.config.session_timeout_secs);
        session.last_access = now;
        self.touch(&session).await?;
        tracing::debug!(session_id = %session_id, expires_at = session.expires_at, "Refreshed session");
        Ok(session)
    }

    /// Tear down a session. Idempotent: ending a session that is already
    /// gone succeeds quietly.
    pub async fn end_session(&mut self, session_id: &str) -> Result<()> {
        let client_id = self
            .load(session_id)
            .await?
            .map(|session| session.client_id);

        let mut pipe = redis::pipe();
        pipe.atomic().del(session_key(session_id));
        if let Some(client_id) = &client_id {
            pipe.srem(client_sessions_key(client_id), session_id);
        }
        let _: () = pipe.query_async(&mut self.conn).await?;

        if client_id.is_some() {
            tracing::info!(session_id = %session_id, "Ended session");
        }
        Ok(())
    }

    /// Remove expired and orphaned sessions for one client. Returns the
    /// number of registrations removed.
    pub async fn sweep_client(&mut self, client_id: &str) -> Result<u64> {
        let ids: Vec<String> = self.conn.smembers(client_sessions_key(client_id)).await?;
        let now = chrono::Utc::now().timestamp();
        let mut removed = 0u64;

        for id in ids {
            let keep = match self.load(&id).await? {
                Some(session) => !session.is_expired(now),
                None => false,
            };
            if !keep {
                let _: () = redis::pipe()
                    .atomic()
                    .del(session_key(&id))
                    .srem(client_sessions_key(client_id), &id)
                    .query_async(&mut self.conn)
                    .await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(client_id = %client_id, removed, "Swept expired sessions");
        }
        Ok(removed)
    }

    /// Remove expired sessions for every known client. Registration sets are
    /// discovered with SCAN so the sweep never stalls the server.
    pub async fn sweep_expired(&mut self) -> Result<u64> {
        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<String> =
                self.conn.scan_match("ogx:client_sessions:*").await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        let mut removed = 0u64;
        for key in keys {
            if let Some(client_id) = key.strip_prefix("ogx:client_sessions:") {
                let client_id = client_id.to_string();
                removed += self.sweep_client(&client_id).await?;
            }
        }
        Ok(removed)
    }

    async fn active_session_count(&mut self, client_id: &str) -> Result<usize> {
        self.sweep_client(client_id).await?;
        let count: usize = self.conn.scard(client_sessions_key(client_id)).await?;
        Ok(count)
    }

    async fn load(&mut self, session_id: &str) -> Result<Option<Session>> {
        let map: HashMap<String, String> = self.conn.hgetall(session_key(session_id)).await?;
        if map.is_empty() {
            return Ok(None);
        }
        Ok(Session::from_hash(session_id, map))
    }

    async fn touch(&mut self, session: &Session) -> Result<()> {
        let _: () = self
            .conn
            .hset_multiple(session_key(&session.id), &session.to_hash())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_boundary() {
        let session = Session {
            id: "s".into(),
            client_id: "c".into(),
            auth_token: "t".into(),
            created_at: 0,
            expires_at: 100,
            last_access: 0,
            access_count: 0,
        };
        assert!(!session.is_expired(99));
        assert!(session.is_expired(100));
    }

    #[test]
    fn hash_round_trip() {
        let session = Session {
            id: "abc".into(),
            client_id: "client-1".into(),
            auth_token: "tok".into(),
            created_at: 10,
            expires_at: 3610,
            last_access: 42,
            access_count: 7,
        };
        let map: HashMap<String, String> = session
            .to_hash()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(Session::from_hash("abc", map), Some(session));
    }
}
