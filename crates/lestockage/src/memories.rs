// Memory persistence operations
//
// A memory is a free-form key/value fact about either the user or the
// persona of a session. Extraction only ever appends.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::schema::{now_unix, with_conn, SharedStorage};

/// Who a memory is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Fact about the user
    User,
    /// Fact about the persona
    Avatar,
}

impl MemoryScope {
    /// Column value
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::User => "user",
            MemoryScope::Avatar => "avatar",
        }
    }

    /// Parse a column value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MemoryScope::User),
            "avatar" => Some(MemoryScope::Avatar),
            _ => None,
        }
    }
}

/// Memory fact to append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMemory {
    /// Who the fact is about
    pub scope: MemoryScope,
    /// Fact key, e.g. `last_topic`
    pub key: String,
    /// Fact value
    pub value: String,
}

impl NewMemory {
    /// Create a new memory fact
    pub fn new(scope: MemoryScope, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Stored memory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Primary key
    pub memory_id: i64,
    /// Who the fact is about
    pub scope: MemoryScope,
    /// User or avatar id depending on `scope`
    pub owner_id: i64,
    /// Fact key
    pub key: String,
    /// Fact value
    pub value: Option<String>,
    /// Interaction the fact was extracted from, if any
    pub source_interaction_id: Option<i64>,
    /// Unix seconds
    pub last_updated: i64,
}

/// Memory store for user and avatar facts
#[derive(Clone)]
pub struct MemoryStore {
    storage: SharedStorage,
}

impl MemoryStore {
    /// Create a new memory store
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Add a fact directly for an owner, outside of any interaction
    pub fn insert(&self, scope: MemoryScope, owner_id: i64, key: &str, value: &str) -> Result<i64> {
        with_conn(&self.storage, |conn| {
            insert_memory(conn, scope, owner_id, key, value, None)?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All facts about a user, oldest first
    pub fn for_user(&self, user_id: i64) -> Result<Vec<MemoryRecord>> {
        self.for_owner(MemoryScope::User, user_id)
    }

    /// All facts about an avatar, oldest first
    pub fn for_avatar(&self, avatar_id: i64) -> Result<Vec<MemoryRecord>> {
        self.for_owner(MemoryScope::Avatar, avatar_id)
    }

    fn for_owner(&self, scope: MemoryScope, owner_id: i64) -> Result<Vec<MemoryRecord>> {
        with_conn(&self.storage, |conn| {
            let mut stmt = conn.prepare(
                "SELECT memory_id, memory_scope, owner_id, memory_key, memory_value,
                        source_interaction_id, last_updated
                 FROM memories WHERE memory_scope = ?1 AND owner_id = ?2
                 ORDER BY memory_id ASC",
            )?;

            let records = stmt
                .query_map(params![scope.as_str(), owner_id], |row| {
                    let scope_str: String = row.get(1)?;
                    Ok(MemoryRecord {
                        memory_id: row.get(0)?,
                        scope: MemoryScope::parse(&scope_str).unwrap_or(scope),
                        owner_id: row.get(2)?,
                        key: row.get(3)?,
                        value: row.get(4)?,
                        source_interaction_id: row.get(5)?,
                        last_updated: row.get(6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(records)
        })
    }
}

/// Append facts extracted from an interaction, resolving owners through its
/// session. All rows land in one transaction.
pub(crate) fn append_for_interaction(
    conn: &mut Connection,
    interaction_id: i64,
    memories: &[NewMemory],
) -> Result<usize> {
    let owners: Option<(i64, i64)> = conn
        .query_row(
            "SELECT s.user_id, s.avatar_id
             FROM interactions i JOIN sessions s ON s.session_id = i.session_id
             WHERE i.interaction_id = ?1",
            params![interaction_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (user_id, avatar_id) =
        owners.ok_or_else(|| StoreError::interaction_not_found(interaction_id))?;

    let tx = conn.transaction()?;
    for memory in memories {
        let owner_id = match memory.scope {
            MemoryScope::User => user_id,
            MemoryScope::Avatar => avatar_id,
        };
        insert_memory(&tx, memory.scope, owner_id, &memory.key, &memory.value, Some(interaction_id))?;
    }
    tx.commit()?;

    Ok(memories.len())
}

fn insert_memory(
    conn: &Connection,
    scope: MemoryScope,
    owner_id: i64,
    key: &str,
    value: &str,
    source_interaction_id: Option<i64>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO memories (memory_scope, owner_id, memory_key, memory_value, source_interaction_id, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![scope.as_str(), owner_id, key, value, source_interaction_id, now_unix()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Storage;
    use tempfile::NamedTempFile;

    #[test]
    fn test_scope_parse() {
        assert_eq!(MemoryScope::parse("user"), Some(MemoryScope::User));
        assert_eq!(MemoryScope::parse("avatar"), Some(MemoryScope::Avatar));
        assert_eq!(MemoryScope::parse("session"), None);
    }

    #[test]
    fn test_insert_and_list_by_owner() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = MemoryStore::new(Storage::open(temp_file.path()).unwrap().into_shared());

        store.insert(MemoryScope::Avatar, 1, "purpose", "To assist users with their research.").unwrap();
        store.insert(MemoryScope::Avatar, 1, "personality", "professional, helpful, concise").unwrap();
        store.insert(MemoryScope::User, 1, "user_name", "Default User").unwrap();

        let avatar_facts = store.for_avatar(1).unwrap();
        assert_eq!(avatar_facts.len(), 2);
        assert_eq!(avatar_facts[0].key, "purpose");
        assert!(avatar_facts.iter().all(|m| m.source_interaction_id.is_none()));

        let user_facts = store.for_user(1).unwrap();
        assert_eq!(user_facts.len(), 1);
        assert_eq!(user_facts[0].value.as_deref(), Some("Default User"));
    }
}
