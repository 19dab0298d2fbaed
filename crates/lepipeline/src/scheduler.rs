//! Fire-and-forget launch of pipeline runs.
//!
//! At most one run per interaction is active at any time; a second request
//! for an interaction that is still running is refused.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use lestockage::InteractionId;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::orchestrate::{Orchestrator, RunReport};

/// Spawns orchestrator runs as independent tasks
#[derive(Clone)]
pub struct PipelineScheduler {
    orchestrator: Arc<Orchestrator>,
    active: Arc<Mutex<HashSet<InteractionId>>>,
}

impl PipelineScheduler {
    /// Create a scheduler for `orchestrator`
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start a run for `id` without waiting for it.
    ///
    /// Returns `None` when a run for `id` is already active. Must be called
    /// from within a tokio runtime.
    pub fn schedule(&self, id: InteractionId) -> Option<JoinHandle<RunReport>> {
        if !self.lock_active().insert(id) {
            warn!(interaction_id = %id, "Run already active, not scheduling another");
            return None;
        }

        let slot = ActiveRun {
            id,
            active: self.active.clone(),
        };
        let orchestrator = self.orchestrator.clone();

        debug!(interaction_id = %id, "Scheduling pipeline run");
        Some(tokio::spawn(async move {
            let _slot = slot;
            orchestrator.run(id).await
        }))
    }

    /// Whether a run for `id` is in flight
    pub fn is_active(&self, id: InteractionId) -> bool {
        self.lock_active().contains(&id)
    }

    /// Number of runs in flight
    pub fn active_count(&self) -> usize {
        self.lock_active().len()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashSet<InteractionId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frees the interaction's slot when the run ends, panics included
struct ActiveRun {
    id: InteractionId,
    active: Arc<Mutex<HashSet<InteractionId>>>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrate::{PipelineContext, RunOutcome};
    use crate::polling::PollingPolicy;
    use crate::testing::ScriptedCollaborators;
    use leclient::Stage;
    use lestockage::{
        InteractionRepository, InteractionStatus, InteractionStore, NewInteraction, SessionStore,
        Storage,
    };
    use tempfile::NamedTempFile;

    fn setup(scripted: Arc<ScriptedCollaborators>) -> (NamedTempFile, InteractionStore, PipelineScheduler, i64) {
        let file = NamedTempFile::new().expect("tempfile");
        let storage = Storage::open(file.path()).expect("open").into_shared();
        let sessions = SessionStore::new(storage.clone());
        let user = sessions.create_user("u@example.com", None, None).expect("user");
        let avatar = sessions.create_avatar("Persona", None).expect("avatar");
        let session = sessions
            .create_session(user.user_id, avatar.avatar_id)
            .expect("session");
        let store = InteractionStore::new(storage);

        let orchestrator = Orchestrator::new(
            Arc::new(store.clone()),
            scripted.into_collaborators(),
            PipelineContext::new(PollingPolicy::from_secs(10, 3600).expect("policy")),
        );
        (
            file,
            store,
            PipelineScheduler::new(Arc::new(orchestrator)),
            session.session_id,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_run_reaches_terminal_status() {
        let scripted = Arc::new(ScriptedCollaborators::new().completing_on_attempt(2, "v.mp4"));
        let (_file, store, scheduler, session_id) = setup(scripted.clone());
        let id = store
            .create(&NewInteraction::text(session_id, "hi"))
            .expect("create")
            .interaction_id;

        let handle = scheduler.schedule(id).expect("scheduled");
        assert!(scheduler.is_active(id));

        let report = handle.await.expect("join");
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(store.get(id).expect("get").status, InteractionStatus::Completed);
        assert!(!scheduler.is_active(id));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_for_same_interaction_is_refused() {
        let scripted = Arc::new(ScriptedCollaborators::new().completing_on_attempt(1, "v.mp4"));
        let (_file, store, scheduler, session_id) = setup(scripted.clone());
        let id = store
            .create(&NewInteraction::text(session_id, "hi"))
            .expect("create")
            .interaction_id;

        let first = scheduler.schedule(id).expect("first run");
        assert!(scheduler.schedule(id).is_none());

        first.await.expect("join");
        assert_eq!(scripted.call_count(Stage::Content), 1);

        // Slot is free again once the first run has finished.
        let again = scheduler.schedule(id).expect("rescheduled");
        let report = again.await.expect("join");
        assert!(!report.status_written);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_for_different_interactions_are_independent() {
        let scripted = Arc::new(ScriptedCollaborators::new().completing_on_attempt(1, "v.mp4"));
        let (_file, store, scheduler, session_id) = setup(scripted.clone());
        let a = store
            .create(&NewInteraction::text(session_id, "a"))
            .expect("create")
            .interaction_id;
        let b = store
            .create(&NewInteraction::text(session_id, "b"))
            .expect("create")
            .interaction_id;

        let ha = scheduler.schedule(a).expect("a");
        let hb = scheduler.schedule(b).expect("b");
        assert_eq!(scheduler.active_count(), 2);

        let ra = ha.await.expect("join a");
        let rb = hb.await.expect("join b");
        assert_eq!(ra.interaction_id, a);
        assert_eq!(rb.interaction_id, b);
        assert_eq!(scripted.call_count(Stage::Content), 2);
    }
}
