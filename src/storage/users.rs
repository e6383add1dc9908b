//! User accounts and bearer-token sessions.

use chrono::{Duration as ChronoDuration, Utc};
use tokio_rusqlite::Connection;

use crate::core::errors::AppResult;
use crate::core::ids::UserId;
use crate::core::models::User;
use crate::storage::millis_to_datetime;

/// Store for registered users.
#[derive(Clone)]
pub struct UserStore {
    conn: Connection,
}

impl UserStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Insert a new user. Fails if the email is already registered.
    ///
    /// # Errors
    /// Returns an error on storage failure or a duplicate email.
    pub async fn insert(&self, user: &User) -> AppResult<()> {
        let user = user.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, name, email, password_hash, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        user.id,
                        user.name,
                        user.email,
                        user.password_hash,
                        user.created_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Look up a user by email.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let email = email.to_owned();
        let user = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, email, password_hash, created_at
                     FROM users WHERE email = ?1",
                )?;
                let row = stmt
                    .query_row(rusqlite::params![email], |row| {
                        Ok((
                            row.get::<_, UserId>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    })
                    .ok();

                match row {
                    Some((id, name, email, password_hash, created_at)) => Ok(Some(User {
                        id,
                        name,
                        email,
                        password_hash,
                        created_at: millis_to_datetime(created_at)?,
                    })),
                    None => Ok(None),
                }
            })
            .await?;
        Ok(user)
    }

    /// Look up a user by id.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn find_by_id(&self, id: UserId) -> AppResult<Option<User>> {
        let user = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, email, password_hash, created_at
                     FROM users WHERE id = ?1",
                )?;
                let row = stmt
                    .query_row(rusqlite::params![id], |row| {
                        Ok((
                            row.get::<_, UserId>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    })
                    .ok();

                match row {
                    Some((id, name, email, password_hash, created_at)) => Ok(Some(User {
                        id,
                        name,
                        email,
                        password_hash,
                        created_at: millis_to_datetime(created_at)?,
                    })),
                    None => Ok(None),
                }
            })
            .await?;
        Ok(user)
    }
}

/// Result of a session lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionLookup {
    /// Token is unknown.
    NotFound,
    /// Token existed but its expiry has passed. The row is removed.
    Expired,
    /// Token is valid and maps to this user.
    Valid(UserId),
}

/// Store for issued bearer-token sessions. Only a sha256 digest of the
/// token is persisted.
#[derive(Clone)]
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Record a new session for `user_id` valid for `ttl`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn issue(
        &self,
        token_hash: &str,
        user_id: UserId,
        ttl: std::time::Duration,
    ) -> AppResult<()> {
        let token_hash = token_hash.to_owned();
        let now = Utc::now();
        let expires_at = now + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::zero());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO sessions (token_hash, user_id, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        token_hash,
                        user_id,
                        now.timestamp_millis(),
                        expires_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Resolve a token digest to its owner, distinguishing unknown tokens
    /// from expired ones. Expired rows are deleted on sight.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn lookup(&self, token_hash: &str) -> AppResult<SessionLookup> {
        let token_hash = token_hash.to_owned();
        let result = self
            .conn
            .call(move |conn| {
                let row: Option<(UserId, i64)> = conn
                    .query_row(
                        "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
                        rusqlite::params![token_hash],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .ok();

                match row {
                    None => Ok(SessionLookup::NotFound),
                    Some((user_id, expires_at)) => {
                        let expires_at = millis_to_datetime(expires_at)?;
                        if expires_at < Utc::now() {
                            conn.execute(
                                "DELETE FROM sessions WHERE token_hash = ?1",
                                rusqlite::params![token_hash],
                            )?;
                            Ok(SessionLookup::Expired)
                        } else {
                            Ok(SessionLookup::Valid(user_id))
                        }
                    }
                }
            })
            .await?;
        Ok(result)
    }

    /// Remove a session (logout).
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn revoke(&self, token_hash: &str) -> AppResult<()> {
        let token_hash = token_hash.to_owned();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM sessions WHERE token_hash = ?1",
                    rusqlite::params![token_hash],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn sample_user() -> User {
        User {
            id: UserId::new(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "salt$hash".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let storage = Storage::open_in_memory().await.unwrap();
        let users = storage.users();
        users.insert(&sample_user()).await.unwrap();

        let mut dup = sample_user();
        dup.id = UserId::new();
        assert!(users.insert(&dup).await.is_err());
    }

    #[tokio::test]
    async fn expired_sessions_are_distinguished_from_unknown_tokens() {
        let storage = Storage::open_in_memory().await.unwrap();
        let sessions = storage.sessions();
        let owner = UserId::new();

        sessions
            .issue("digest", owner, std::time::Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(sessions.lookup("digest").await.unwrap(), SessionLookup::Expired);
        // Second lookup after deletion: now unknown.
        assert_eq!(sessions.lookup("digest").await.unwrap(), SessionLookup::NotFound);
        assert_eq!(sessions.lookup("other").await.unwrap(), SessionLookup::NotFound);
    }

    #[tokio::test]
    async fn valid_session_resolves_to_owner() {
        let storage = Storage::open_in_memory().await.unwrap();
        let sessions = storage.sessions();
        let owner = UserId::new();

        sessions
            .issue("digest", owner, std::time::Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(
            sessions.lookup("digest").await.unwrap(),
            SessionLookup::Valid(owner)
        );
    }
}
