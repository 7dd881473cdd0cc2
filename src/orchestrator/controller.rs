//! Replay session lifecycle controller.
//!
//! Owns the Idle -> Recording -> Stopped transitions, drives the command
//! channel and keeps the session store in step with the in-memory view.

use super::commands;
use super::host::AffordanceHost;
use crate::channel::CommandChannel;
use crate::error::{ControllerError, StoreError};
use crate::model::{
    now_rfc3339, AffordanceRef, ChunkRegion, Dimension, ReplaySession, SessionName, SessionState,
};
use crate::parser::{self, DownloadLink, ParsedReply, ReplyKind, UNKNOWN_ARTIFACT};
use crate::render::{self, RenderDirective};
use crate::store::{SessionStore, StoreRecord};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock};

/// Validated start intent.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub name: SessionName,
    pub dimension: Dimension,
    pub region: ChunkRegion,
}

/// Session after an intent, with the directive the front-end should draw.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session: ReplaySession,
    pub directive: RenderDirective,
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Remote command that was issued.
    pub command: String,
    pub link: DownloadLink,
    pub directive: RenderDirective,
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<AffordanceRef>,
    pub skipped: Vec<AffordanceRef>,
}

pub struct SessionController {
    channel: Arc<dyn CommandChannel>,
    store: Arc<dyn SessionStore>,
    host: Arc<dyn AffordanceHost>,
    sessions: RwLock<HashMap<AffordanceRef, ReplaySession>>,
    // Serializes intents on the same session name.
    name_locks: NameLocks,
}

type NameLocks = Mutex<HashMap<SessionName, Arc<AsyncMutex<()>>>>;

/// Held for the duration of one intent. Dropping it releases the name and
/// forgets the lock once nobody else holds or waits on it.
struct NameGuard<'a> {
    locks: &'a NameLocks,
    name: SessionName,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Clones are only taken under this mutex, so the count is stable here.
        if locks
            .get(&self.name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

impl SessionController {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        store: Arc<dyn SessionStore>,
        host: Arc<dyn AffordanceHost>,
    ) -> Self {
        Self {
            channel,
            store,
            host,
            sessions: RwLock::new(HashMap::new()),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_name(&self, name: &SessionName) -> NameGuard<'_> {
        let lock = {
            let mut locks = self
                .name_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(name.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        NameGuard {
            locks: &self.name_locks,
            name: name.clone(),
            guard: Some(guard),
        }
    }

    async fn is_live(&self, name: &SessionName) -> bool {
        self.sessions
            .read()
            .await
            .values()
            .any(|s| s.name() == name && s.state().is_recording())
    }

    async fn session_name(&self, affordance: &AffordanceRef) -> Result<SessionName, ControllerError> {
        self.sessions
            .read()
            .await
            .get(affordance)
            .map(|s| s.name().clone())
            .ok_or(ControllerError::UnknownAffordance(*affordance))
    }

    /// Re-bind every persisted session whose element still exists.
    pub async fn restore(&self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let records = self.store.load();
        // Hosts may need a round trip per element, so probe them together.
        let attached = futures::future::join_all(records.iter().map(|record| async move {
            self.host.is_attached(&record.affordance()).await
        }))
        .await;

        for (record, attached) in records.into_iter().zip(attached) {
            let affordance = record.affordance();
            let name = match SessionName::parse(&record.name) {
                Ok(name) => name,
                Err(_) => {
                    tracing::warn!(%affordance, name = %record.name, "skipping session record with invalid name");
                    report.skipped.push(affordance);
                    continue;
                }
            };
            if !attached {
                tracing::warn!(%affordance, %name, "affordance no longer exists, skipping restore");
                report.skipped.push(affordance);
                continue;
            }

            let state = match record.filename {
                Some(artifact_file) => SessionState::Stopped { artifact_file },
                None => SessionState::Recording,
            };
            let session = ReplaySession::new(
                name,
                record.dimension,
                record.region,
                state,
                affordance,
                record.created_at,
            );
            self.sessions.write().await.insert(affordance, session);
            report.restored.push(affordance);
        }
        tracing::info!(
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            "restored replay sessions"
        );
        report
    }

    /// Start recording. A channel failure does not abort the start: the
    /// session is kept as Recording and the directive carries a notice.
    pub async fn start(&self, req: StartRequest) -> Result<SessionOutcome, ControllerError> {
        let _guard = self.lock_name(&req.name).await;

        if self.is_live(&req.name).await {
            return Err(ControllerError::AlreadyRecording(req.name.to_string()));
        }

        let command = commands::start(&req.name, req.dimension, req.region);
        let notice = match self.channel.send(&command).await {
            Ok(reply) => {
                if let ParsedReply::StartAck { message } =
                    parser::parse_reply(ReplyKind::StartAck, &reply)
                {
                    tracing::info!(name = %req.name, reply = %message, "replay start acknowledged");
                }
                None
            }
            Err(e) => {
                tracing::warn!(name = %req.name, error = %e, "replay start command failed");
                Some(format!(
                    "Remote command failed ({e}); the server may or may not be recording this replay."
                ))
            }
        };

        let affordance = self.host.create_affordance().await?;
        let session = ReplaySession::new(
            req.name,
            Some(req.dimension),
            Some(req.region),
            SessionState::Recording,
            affordance,
            Some(now_rfc3339()),
        );
        self.sessions
            .write()
            .await
            .insert(affordance, session.clone());
        self.store
            .append(record_for(&session))
            .map_err(unpersisted(affordance))?;

        let mut directive = render::session_view(&session);
        if let Some(notice) = notice {
            directive = directive.with_notice(notice);
        }
        Ok(SessionOutcome { session, directive })
    }

    /// Stop a recording session. On a channel failure the session stays
    /// Recording and nothing is persisted.
    pub async fn stop(&self, affordance: AffordanceRef) -> Result<SessionOutcome, ControllerError> {
        let name = self.session_name(&affordance).await?;
        let _guard = self.lock_name(&name).await;

        // Re-check under the lock: a concurrent stop may have won.
        let recording = self
            .sessions
            .read()
            .await
            .get(&affordance)
            .is_some_and(|s| s.state().is_recording());
        if !recording {
            return Err(ControllerError::NotRecording(name.to_string()));
        }

        let reply = self.channel.send(&commands::stop(&name)).await?;
        let artifact_file = match parser::parse_reply(ReplyKind::StopAck, &reply) {
            ParsedReply::StopAck { artifact_file } => artifact_file,
            _ => UNKNOWN_ARTIFACT.to_string(),
        };
        tracing::info!(%name, %artifact_file, "replay stopped");

        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&affordance)
                .ok_or(ControllerError::UnknownAffordance(affordance))?;
            session.mark_stopped(artifact_file);
            session.clone()
        };
        self.store
            .replace(record_for(&session))
            .map_err(unpersisted(affordance))?;

        let directive = render::session_view(&session);
        Ok(SessionOutcome { session, directive })
    }

    /// Ask the server for a download link. Does not change session state.
    pub async fn download(&self, affordance: AffordanceRef) -> Result<DownloadOutcome, ControllerError> {
        let name = self.session_name(&affordance).await?;
        let _guard = self.lock_name(&name).await;

        let artifact_file = self
            .sessions
            .read()
            .await
            .get(&affordance)
            .and_then(|s| s.state().artifact_file().map(str::to_string))
            .ok_or_else(|| ControllerError::ArtifactPending(name.to_string()))?;

        let command = commands::download(&name, &artifact_file);
        let reply = self.channel.send(&command).await?;
        let link = match parser::parse_reply(ReplyKind::DownloadAck, &reply) {
            ParsedReply::DownloadAck(link) => link,
            _ => DownloadLink::Unparseable(reply),
        };
        if let DownloadLink::Unparseable(raw) = &link {
            tracing::warn!(%name, reply = %raw, "download reply carried no link");
        }
        let directive = render::download_view(&link);
        Ok(DownloadOutcome {
            command,
            link,
            directive,
        })
    }

    /// Known sessions ordered by name, then element.
    pub async fn sessions(&self) -> Vec<ReplaySession> {
        let mut sessions: Vec<ReplaySession> =
            self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then_with(|| a.affordance().cmp(&b.affordance()))
        });
        sessions
    }
}

fn unpersisted(affordance: AffordanceRef) -> impl FnOnce(StoreError) -> ControllerError {
    move |source| ControllerError::Store { affordance, source }
}

fn record_for(session: &ReplaySession) -> StoreRecord {
    let affordance = session.affordance();
    StoreRecord {
        message_id: affordance.message_id,
        channel_id: affordance.channel_id,
        name: session.name().to_string(),
        filename: session.state().artifact_file().map(str::to_string),
        dimension: session.dimension(),
        region: session.region(),
        created_at: session.created_at().map(str::to_string),
    }
}
