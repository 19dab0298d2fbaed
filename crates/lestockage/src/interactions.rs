//! Interaction records and their status lifecycle.
//!
//! An interaction is one conversational turn. It is created with status
//! `processing`, mutated in place as each pipeline stage commits its output,
//! and finally moved to exactly one terminal status. Every write here is an
//! independent statement; there is no cross-stage transaction.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::memories::{append_for_interaction, NewMemory};
use crate::schema::{now_unix, with_conn, SharedStorage};
use crate::sessions::{load_session, SessionRecord};

/// Interaction identifier assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionId(pub i64);

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for InteractionId {
    fn from(id: i64) -> Self {
        InteractionId(id)
    }
}

/// Pipeline status persisted on an interaction.
///
/// These five values are the complete vocabulary any external observer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    /// Created, or currently running a stage
    Processing,
    /// Terminal success
    Completed,
    /// Terminal: the embodiment job failed or never finished in time
    Failed,
    /// Terminal: perception produced no transcribed text
    FailedNoTranscription,
    /// Terminal: a mandatory stage or a store write failed
    FailedOrchestration,
}

impl InteractionStatus {
    /// Column value
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionStatus::Processing => "processing",
            InteractionStatus::Completed => "completed",
            InteractionStatus::Failed => "failed",
            InteractionStatus::FailedNoTranscription => "failed_no_transcription",
            InteractionStatus::FailedOrchestration => "failed_orchestration",
        }
    }

    /// Whether no further status writes may follow
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InteractionStatus::Processing)
    }

    /// Whether this is a terminal failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            InteractionStatus::Failed
                | InteractionStatus::FailedNoTranscription
                | InteractionStatus::FailedOrchestration
        )
    }
}

impl fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "processing" => Ok(InteractionStatus::Processing),
            "completed" => Ok(InteractionStatus::Completed),
            "failed" => Ok(InteractionStatus::Failed),
            "failed_no_transcription" => Ok(InteractionStatus::FailedNoTranscription),
            "failed_orchestration" => Ok(InteractionStatus::FailedOrchestration),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Inputs supplied when an interaction is created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInteraction {
    /// Session the turn belongs to
    pub session_id: i64,
    /// Raw text input
    pub input_text: Option<String>,
    /// Object-storage key of an audio input
    pub input_audio_ref: Option<String>,
    /// Object-storage key of a video input
    pub input_video_ref: Option<String>,
}

impl NewInteraction {
    /// Text-only turn
    pub fn text(session_id: i64, text: impl Into<String>) -> Self {
        Self {
            session_id,
            input_text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Audio turn
    pub fn audio(session_id: i64, audio_ref: impl Into<String>) -> Self {
        Self {
            session_id,
            input_audio_ref: Some(audio_ref.into()),
            ..Default::default()
        }
    }

    /// Video turn
    pub fn video(session_id: i64, video_ref: impl Into<String>) -> Self {
        Self {
            session_id,
            input_video_ref: Some(video_ref.into()),
            ..Default::default()
        }
    }
}

/// Full interaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// Identifier
    pub interaction_id: InteractionId,
    /// Session the turn belongs to
    pub session_id: i64,
    /// Pipeline status
    pub status: InteractionStatus,
    /// Raw text input
    pub input_text: Option<String>,
    /// Audio input reference
    pub input_audio_ref: Option<String>,
    /// Video input reference
    pub input_video_ref: Option<String>,
    /// Written by perception
    pub transcribed_text: Option<String>,
    /// Written by perception
    pub perceived_affect: Option<String>,
    /// Written by content
    pub raw_content_response: Option<String>,
    /// Written by content
    pub final_response_text: Option<String>,
    /// Written by vocal
    pub generated_audio_ref: Option<String>,
    /// Written by embodiment start
    pub video_job_handle: Option<String>,
    /// Written when the embodiment job completes
    pub generated_video_ref: Option<String>,
    /// Diagnostic detail accompanying a terminal failure
    pub failure_reason: Option<String>,
    /// Unix seconds
    pub created_at: i64,
    /// Unix seconds
    pub updated_at: i64,
}

impl Interaction {
    /// Whether perception has to run for this turn
    pub fn needs_perception(&self) -> bool {
        self.input_audio_ref.is_some() || self.input_video_ref.is_some()
    }

    /// Whether perception left usable text behind
    pub fn has_transcription(&self) -> bool {
        self.transcribed_text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Text the content stage answers: transcription if any, raw text otherwise
    pub fn prompt_text(&self) -> Option<&str> {
        if self.has_transcription() {
            self.transcribed_text.as_deref()
        } else {
            self.input_text.as_deref()
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status_str: String = row.get(2)?;
        let status = status_str.parse::<InteractionStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Self {
            interaction_id: InteractionId(row.get(0)?),
            session_id: row.get(1)?,
            status,
            input_text: row.get(3)?,
            input_audio_ref: row.get(4)?,
            input_video_ref: row.get(5)?,
            transcribed_text: row.get(6)?,
            perceived_affect: row.get(7)?,
            raw_content_response: row.get(8)?,
            final_response_text: row.get(9)?,
            generated_audio_ref: row.get(10)?,
            video_job_handle: row.get(11)?,
            generated_video_ref: row.get(12)?,
            failure_reason: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

const SELECT_INTERACTION: &str = "SELECT interaction_id, session_id, status, input_text, input_audio_ref,
        input_video_ref, transcribed_text, perceived_affect, raw_content_response,
        final_response_text, generated_audio_ref, video_job_handle, generated_video_ref,
        failure_reason, created_at, updated_at
     FROM interactions";

/// Access to interaction records used by the trigger endpoint and the
/// pipeline orchestrator.
///
/// Implementations are synchronous; each method is one committed write or
/// one read.
pub trait InteractionRepository: Send + Sync {
    /// Insert a new interaction with status `processing`
    fn create(&self, new: &NewInteraction) -> Result<Interaction>;

    /// Load an interaction
    fn get(&self, id: InteractionId) -> Result<Interaction>;

    /// Session (user + persona) an interaction belongs to
    fn session_of(&self, id: InteractionId) -> Result<SessionRecord>;

    /// Store perception output
    fn record_perception(
        &self,
        id: InteractionId,
        transcribed_text: Option<&str>,
        perceived_affect: Option<&str>,
    ) -> Result<()>;

    /// Store content output
    fn record_content(&self, id: InteractionId, raw: &str, final_text: &str) -> Result<()>;

    /// Store the generated audio reference
    fn record_audio(&self, id: InteractionId, audio_ref: &str) -> Result<()>;

    /// Store the external video job handle
    fn record_video_job(&self, id: InteractionId, job_handle: &str) -> Result<()>;

    /// Store the generated video reference
    fn record_video(&self, id: InteractionId, video_ref: &str) -> Result<()>;

    /// Append extracted memory facts for the interaction's user or persona
    fn append_memories(&self, id: InteractionId, memories: &[NewMemory]) -> Result<usize>;

    /// Move a `processing` interaction to a terminal status.
    ///
    /// Returns `Ok(false)` without writing when the interaction already holds
    /// a terminal status.
    fn mark_terminal(
        &self,
        id: InteractionId,
        status: InteractionStatus,
        reason: Option<&str>,
    ) -> Result<bool>;
}

/// SQLite-backed interaction store
#[derive(Clone)]
pub struct InteractionStore {
    storage: SharedStorage,
}

impl InteractionStore {
    /// Create a new interaction store
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Interactions of a session, oldest first
    pub fn list_for_session(&self, session_id: i64) -> Result<Vec<Interaction>> {
        with_conn(&self.storage, |conn| {
            let sql = format!("{} WHERE session_id = ?1 ORDER BY interaction_id ASC", SELECT_INTERACTION);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![session_id], Interaction::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Interactions still in `processing`, oldest first.
    ///
    /// A run that crashed between stages leaves its interaction here.
    pub fn list_processing(&self) -> Result<Vec<Interaction>> {
        with_conn(&self.storage, |conn| {
            let sql = format!("{} WHERE status = 'processing' ORDER BY interaction_id ASC", SELECT_INTERACTION);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], Interaction::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn update_field(&self, id: InteractionId, column: &'static str, value: &str) -> Result<()> {
        with_conn(&self.storage, |conn| {
            let sql = format!(
                "UPDATE interactions SET {} = ?1, updated_at = ?2 WHERE interaction_id = ?3",
                column
            );
            let changed = conn.execute(&sql, params![value, now_unix(), id.0])?;
            ensure_found(changed, id)
        })
    }
}

fn ensure_found(changed: usize, id: InteractionId) -> Result<()> {
    if changed == 0 {
        Err(StoreError::interaction_not_found(id))
    } else {
        Ok(())
    }
}

fn load_interaction(conn: &Connection, id: InteractionId) -> Result<Option<Interaction>> {
    let sql = format!("{} WHERE interaction_id = ?1", SELECT_INTERACTION);
    let interaction = conn
        .query_row(&sql, params![id.0], Interaction::from_row)
        .optional()?;
    Ok(interaction)
}

impl InteractionRepository for InteractionStore {
    fn create(&self, new: &NewInteraction) -> Result<Interaction> {
        with_conn(&self.storage, |conn| {
            if load_session(conn, new.session_id)?.is_none() {
                return Err(StoreError::SessionNotFound(new.session_id));
            }

            let now = now_unix();
            conn.execute(
                "INSERT INTO interactions
                    (session_id, status, input_text, input_audio_ref, input_video_ref, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    new.session_id,
                    InteractionStatus::Processing.as_str(),
                    new.input_text,
                    new.input_audio_ref,
                    new.input_video_ref,
                    now,
                ],
            )?;

            let id = InteractionId(conn.last_insert_rowid());
            debug!(interaction_id = %id, session_id = new.session_id, "Interaction created");
            load_interaction(conn, id)?.ok_or_else(|| StoreError::interaction_not_found(id))
        })
    }

    fn get(&self, id: InteractionId) -> Result<Interaction> {
        with_conn(&self.storage, |conn| {
            load_interaction(conn, id)?.ok_or_else(|| StoreError::interaction_not_found(id))
        })
    }

    fn session_of(&self, id: InteractionId) -> Result<SessionRecord> {
        with_conn(&self.storage, |conn| {
            let session_id: i64 = conn
                .query_row(
                    "SELECT session_id FROM interactions WHERE interaction_id = ?1",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::interaction_not_found(id))?;
            load_session(conn, session_id)?.ok_or(StoreError::SessionNotFound(session_id))
        })
    }

    fn record_perception(
        &self,
        id: InteractionId,
        transcribed_text: Option<&str>,
        perceived_affect: Option<&str>,
    ) -> Result<()> {
        with_conn(&self.storage, |conn| {
            let changed = conn.execute(
                "UPDATE interactions SET transcribed_text = ?1, perceived_affect = ?2, updated_at = ?3
                 WHERE interaction_id = ?4",
                params![transcribed_text, perceived_affect, now_unix(), id.0],
            )?;
            ensure_found(changed, id)
        })
    }

    fn record_content(&self, id: InteractionId, raw: &str, final_text: &str) -> Result<()> {
        with_conn(&self.storage, |conn| {
            let changed = conn.execute(
                "UPDATE interactions SET raw_content_response = ?1, final_response_text = ?2, updated_at = ?3
                 WHERE interaction_id = ?4",
                params![raw, final_text, now_unix(), id.0],
            )?;
            ensure_found(changed, id)
        })
    }

    fn record_audio(&self, id: InteractionId, audio_ref: &str) -> Result<()> {
        self.update_field(id, "generated_audio_ref", audio_ref)
    }

    fn record_video_job(&self, id: InteractionId, job_handle: &str) -> Result<()> {
        self.update_field(id, "video_job_handle", job_handle)
    }

    fn record_video(&self, id: InteractionId, video_ref: &str) -> Result<()> {
        self.update_field(id, "generated_video_ref", video_ref)
    }

    fn append_memories(&self, id: InteractionId, memories: &[NewMemory]) -> Result<usize> {
        if memories.is_empty() {
            return Ok(0);
        }
        with_conn(&self.storage, |conn| append_for_interaction(conn, id.0, memories))
    }

    fn mark_terminal(
        &self,
        id: InteractionId,
        status: InteractionStatus,
        reason: Option<&str>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidStatus(format!(
                "{} is not a terminal status",
                status
            )));
        }

        with_conn(&self.storage, |conn| {
            let changed = conn.execute(
                "UPDATE interactions SET status = ?1, failure_reason = ?2, updated_at = ?3
                 WHERE interaction_id = ?4 AND status = 'processing'",
                params![status.as_str(), reason, now_unix(), id.0],
            )?;

            if changed == 1 {
                debug!(interaction_id = %id, status = %status, "Terminal status written");
                return Ok(true);
            }

            // Nothing changed: either the row is missing or already terminal.
            match load_interaction(conn, id)? {
                None => Err(StoreError::interaction_not_found(id)),
                Some(existing) => {
                    debug!(
                        interaction_id = %id,
                        current = %existing.status,
                        requested = %status,
                        "Interaction already terminal"
                    );
                    Ok(false)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memories::{MemoryScope, MemoryStore};
    use crate::schema::Storage;
    use crate::sessions::SessionStore;
    use rstest::rstest;
    use tempfile::NamedTempFile;

    struct Fixture {
        _file: NamedTempFile,
        storage: SharedStorage,
        store: InteractionStore,
        session: SessionRecord,
    }

    fn fixture() -> Fixture {
        let file = NamedTempFile::new().unwrap();
        let storage = Storage::open(file.path()).unwrap().into_shared();
        let sessions = SessionStore::new(storage.clone());
        let user = sessions.create_user("user@example.com", None, None).unwrap();
        let avatar = sessions.create_avatar("Professor", None).unwrap();
        let session = sessions.create_session(user.user_id, avatar.avatar_id).unwrap();
        Fixture {
            _file: file,
            store: InteractionStore::new(storage.clone()),
            storage,
            session,
        }
    }

    #[rstest]
    #[case("processing", InteractionStatus::Processing)]
    #[case("completed", InteractionStatus::Completed)]
    #[case("failed", InteractionStatus::Failed)]
    #[case("failed_no_transcription", InteractionStatus::FailedNoTranscription)]
    #[case("failed_orchestration", InteractionStatus::FailedOrchestration)]
    fn test_status_vocabulary(#[case] text: &str, #[case] status: InteractionStatus) {
        assert_eq!(text.parse::<InteractionStatus>().unwrap(), status);
        assert_eq!(status.as_str(), text);
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            format!("\"{}\"", text)
        );
        assert_eq!(status.is_terminal(), text != "processing");
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(matches!(
            "done".parse::<InteractionStatus>(),
            Err(StoreError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_create_starts_processing() {
        let fx = fixture();
        let created = fx
            .store
            .create(&NewInteraction::text(fx.session.session_id, "Hello there"))
            .unwrap();

        assert_eq!(created.status, InteractionStatus::Processing);
        assert_eq!(created.input_text.as_deref(), Some("Hello there"));
        assert!(!created.needs_perception());
        assert_eq!(fx.store.get(created.interaction_id).unwrap(), created);
    }

    #[test]
    fn test_create_with_unknown_session_leaves_nothing_behind() {
        let fx = fixture();
        let err = fx.store.create(&NewInteraction::text(9999, "hi")).unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(9999)));

        let count: i64 = fx
            .storage
            .lock()
            .unwrap()
            .conn()
            .query_row("SELECT COUNT(*) FROM interactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_stage_writes_land_on_record() {
        let fx = fixture();
        let id = fx
            .store
            .create(&NewInteraction::audio(fx.session.session_id, "inputs/turn.wav"))
            .unwrap()
            .interaction_id;

        fx.store
            .record_perception(id, Some("what did we discuss?"), Some("Visually, the user appears Neutral."))
            .unwrap();
        fx.store.record_content(id, "raw answer", "final answer").unwrap();
        fx.store.record_audio(id, "interaction_1.mp3").unwrap();
        fx.store.record_video_job(id, "job-123").unwrap();
        fx.store.record_video(id, "interaction_1.mp4").unwrap();

        let loaded = fx.store.get(id).unwrap();
        assert!(loaded.needs_perception());
        assert_eq!(loaded.prompt_text(), Some("what did we discuss?"));
        assert_eq!(loaded.final_response_text.as_deref(), Some("final answer"));
        assert_eq!(loaded.generated_audio_ref.as_deref(), Some("interaction_1.mp3"));
        assert_eq!(loaded.video_job_handle.as_deref(), Some("job-123"));
        assert_eq!(loaded.generated_video_ref.as_deref(), Some("interaction_1.mp4"));
        assert_eq!(loaded.status, InteractionStatus::Processing);
    }

    #[test]
    fn test_blank_transcription_is_not_a_transcription() {
        let fx = fixture();
        let id = fx
            .store
            .create(&NewInteraction::video(fx.session.session_id, "inputs/turn.mp4"))
            .unwrap()
            .interaction_id;
        fx.store.record_perception(id, Some("   "), None).unwrap();
        assert!(!fx.store.get(id).unwrap().has_transcription());
    }

    #[test]
    fn test_terminal_status_is_write_once() {
        let fx = fixture();
        let id = fx
            .store
            .create(&NewInteraction::text(fx.session.session_id, "hi"))
            .unwrap()
            .interaction_id;

        assert!(fx.store.mark_terminal(id, InteractionStatus::Completed, None).unwrap());
        assert!(!fx
            .store
            .mark_terminal(id, InteractionStatus::FailedOrchestration, Some("late"))
            .unwrap());

        let loaded = fx.store.get(id).unwrap();
        assert_eq!(loaded.status, InteractionStatus::Completed);
        assert!(loaded.failure_reason.is_none());
    }

    #[test]
    fn test_mark_terminal_rejects_processing() {
        let fx = fixture();
        let id = fx
            .store
            .create(&NewInteraction::text(fx.session.session_id, "hi"))
            .unwrap()
            .interaction_id;
        assert!(matches!(
            fx.store.mark_terminal(id, InteractionStatus::Processing, None),
            Err(StoreError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_writes_to_missing_interaction_fail() {
        let fx = fixture();
        let missing = InteractionId(77);
        assert!(fx.store.get(missing).unwrap_err().is_not_found());
        assert!(fx.store.record_audio(missing, "a.mp3").unwrap_err().is_not_found());
        assert!(fx
            .store
            .mark_terminal(missing, InteractionStatus::Failed, None)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_append_memories_resolves_owners() {
        let fx = fixture();
        let id = fx
            .store
            .create(&NewInteraction::text(fx.session.session_id, "I love hiking"))
            .unwrap()
            .interaction_id;

        let appended = fx
            .store
            .append_memories(
                id,
                &[
                    NewMemory::new(MemoryScope::User, "hobby", "hiking"),
                    NewMemory::new(MemoryScope::Avatar, "last_topic", "outdoor activities"),
                ],
            )
            .unwrap();
        assert_eq!(appended, 2);

        let memories = MemoryStore::new(fx.storage.clone());
        let user_facts = memories.for_user(fx.session.user_id).unwrap();
        assert_eq!(user_facts.len(), 1);
        assert_eq!(user_facts[0].source_interaction_id, Some(id.0));
        assert_eq!(memories.for_avatar(fx.session.avatar_id).unwrap()[0].key, "last_topic");
    }

    #[test]
    fn test_list_for_session_and_processing() {
        let fx = fixture();
        let first = fx
            .store
            .create(&NewInteraction::text(fx.session.session_id, "one"))
            .unwrap()
            .interaction_id;
        let second = fx
            .store
            .create(&NewInteraction::text(fx.session.session_id, "two"))
            .unwrap()
            .interaction_id;
        fx.store.mark_terminal(first, InteractionStatus::Completed, None).unwrap();

        let all = fx.store.list_for_session(fx.session.session_id).unwrap();
        assert_eq!(
            all.iter().map(|i| i.interaction_id).collect::<Vec<_>>(),
            vec![first, second]
        );

        let stuck = fx.store.list_processing().unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].interaction_id, second);
        assert_eq!(fx.store.session_of(second).unwrap(), fx.session);
    }
}
