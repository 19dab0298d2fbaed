//! Users, avatars, and the sessions that link them.
//!
//! The pipeline only reads this context: a session tells the orchestrator
//! which user and which persona an interaction belongs to.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::schema::{now_unix, with_conn, SharedStorage};

/// User record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Primary key
    pub user_id: i64,
    /// Unique email address
    pub user_email: String,
    /// Display name
    pub user_name: Option<String>,
    /// Role, `user` unless promoted
    pub role: String,
}

/// Avatar (persona) record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarRecord {
    /// Primary key
    pub avatar_id: i64,
    /// Persona name
    pub avatar_name: String,
    /// Free-form persona description
    pub description: Option<String>,
}

/// Session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Primary key
    pub session_id: i64,
    /// Owning user
    pub user_id: i64,
    /// Persona used in this session
    pub avatar_id: i64,
    /// Unix seconds
    pub start_time: i64,
    /// Unix seconds, set when the session is closed
    pub end_time: Option<i64>,
}

/// Session store for users, avatars, and sessions
#[derive(Clone)]
pub struct SessionStore {
    storage: SharedStorage,
}

impl SessionStore {
    /// Create a new session store
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Insert a user
    pub fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        role: Option<&str>,
    ) -> Result<UserRecord> {
        let role = role.unwrap_or("user").to_string();
        with_conn(&self.storage, |conn| {
            conn.execute(
                "INSERT INTO users (user_email, user_name, role, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![email, name, role, now_unix()],
            )?;
            Ok(UserRecord {
                user_id: conn.last_insert_rowid(),
                user_email: email.to_string(),
                user_name: name.map(str::to_string),
                role,
            })
        })
    }

    /// Insert an avatar
    pub fn create_avatar(&self, name: &str, description: Option<&str>) -> Result<AvatarRecord> {
        with_conn(&self.storage, |conn| {
            conn.execute(
                "INSERT INTO avatars (avatar_name, description, created_at) VALUES (?1, ?2, ?3)",
                params![name, description, now_unix()],
            )?;
            Ok(AvatarRecord {
                avatar_id: conn.last_insert_rowid(),
                avatar_name: name.to_string(),
                description: description.map(str::to_string),
            })
        })
    }

    /// Open a session between a user and an avatar
    pub fn create_session(&self, user_id: i64, avatar_id: i64) -> Result<SessionRecord> {
        with_conn(&self.storage, |conn| {
            let start_time = now_unix();
            conn.execute(
                "INSERT INTO sessions (user_id, avatar_id, start_time) VALUES (?1, ?2, ?3)",
                params![user_id, avatar_id, start_time],
            )?;
            Ok(SessionRecord {
                session_id: conn.last_insert_rowid(),
                user_id,
                avatar_id,
                start_time,
                end_time: None,
            })
        })
    }

    /// Mark a session as ended
    pub fn end_session(&self, session_id: i64) -> Result<()> {
        with_conn(&self.storage, |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET end_time = ?1 WHERE session_id = ?2 AND end_time IS NULL",
                params![now_unix(), session_id],
            )?;
            if changed == 0 && load_session(conn, session_id)?.is_none() {
                return Err(StoreError::SessionNotFound(session_id));
            }
            Ok(())
        })
    }

    /// Load a session by ID
    pub fn get_session(&self, session_id: i64) -> Result<SessionRecord> {
        with_conn(&self.storage, |conn| {
            load_session(conn, session_id)?.ok_or(StoreError::SessionNotFound(session_id))
        })
    }

    /// Load a user by ID
    pub fn get_user(&self, user_id: i64) -> Result<UserRecord> {
        with_conn(&self.storage, |conn| {
            conn.query_row(
                "SELECT user_id, user_email, user_name, role FROM users WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRecord {
                        user_id: row.get(0)?,
                        user_email: row.get(1)?,
                        user_name: row.get(2)?,
                        role: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
        })
    }

    /// Load an avatar by ID
    pub fn get_avatar(&self, avatar_id: i64) -> Result<AvatarRecord> {
        with_conn(&self.storage, |conn| {
            conn.query_row(
                "SELECT avatar_id, avatar_name, description FROM avatars WHERE avatar_id = ?1",
                params![avatar_id],
                |row| {
                    Ok(AvatarRecord {
                        avatar_id: row.get(0)?,
                        avatar_name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("avatar {}", avatar_id)))
        })
    }
}

pub(crate) fn load_session(
    conn: &rusqlite::Connection,
    session_id: i64,
) -> Result<Option<SessionRecord>> {
    let session = conn
        .query_row(
            "SELECT session_id, user_id, avatar_id, start_time, end_time
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(SessionRecord {
                    session_id: row.get(0)?,
                    user_id: row.get(1)?,
                    avatar_id: row.get(2)?,
                    start_time: row.get(3)?,
                    end_time: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Storage;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (NamedTempFile, SessionStore) {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap().into_shared();
        (temp_file, SessionStore::new(storage))
    }

    #[test]
    fn test_create_and_load_session() {
        let (_file, store) = create_test_store();
        let user = store.create_user("admin@example.com", Some("Admin"), Some("admin")).unwrap();
        let avatar = store.create_avatar("Default Professor", None).unwrap();

        let session = store.create_session(user.user_id, avatar.avatar_id).unwrap();
        let loaded = store.get_session(session.session_id).unwrap();

        assert_eq!(loaded, session);
        assert_eq!(store.get_user(user.user_id).unwrap().role, "admin");
        assert_eq!(store.get_avatar(avatar.avatar_id).unwrap().avatar_name, "Default Professor");
    }

    #[test]
    fn test_session_requires_existing_user() {
        let (_file, store) = create_test_store();
        let avatar = store.create_avatar("Persona", None).unwrap();
        assert!(store.create_session(999, avatar.avatar_id).is_err());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (_file, store) = create_test_store();
        store.create_user("a@example.com", None, None).unwrap();
        assert!(store.create_user("a@example.com", None, None).is_err());
    }

    #[test]
    fn test_end_session() {
        let (_file, store) = create_test_store();
        let user = store.create_user("u@example.com", None, None).unwrap();
        let avatar = store.create_avatar("Persona", None).unwrap();
        let session = store.create_session(user.user_id, avatar.avatar_id).unwrap();

        store.end_session(session.session_id).unwrap();
        assert!(store.get_session(session.session_id).unwrap().end_time.is_some());

        let err = store.end_session(404).unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(404)));
    }
}
