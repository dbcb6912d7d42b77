//! Session processing: fetch once, extract many
//!
//! One provider call per session. Every missing kind is then extracted from
//! the same blob and persisted on its own, so a failure in one kind never
//! costs the others and a crash mid-session keeps what was already stored.

use crate::db::SessionStore;
use crate::error::ImportError;
use crate::models::{Season, SessionGap, SessionResult, SessionStatus, SubDatasetKind};
use crate::services::extractors::{self, SessionBlob};
use crate::services::telemetry_client::TelemetryProvider;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct SessionProcessor {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn TelemetryProvider>,
}

impl SessionProcessor {
    pub fn new(store: Arc<dyn SessionStore>, provider: Arc<dyn TelemetryProvider>) -> Self {
        Self { store, provider }
    }

    /// Process one gap; never fails, outcomes are in the returned result
    ///
    /// The caller must have reserved one quota call for this session.
    pub async fn process(&self, season: &Season, gap: &SessionGap) -> SessionResult {
        let mut result = SessionResult {
            session_id: gap.session_id,
            year: gap.year,
            round_number: gap.round_number,
            session_type: gap.session_type,
            session_number: gap.session_number,
            extracted: BTreeSet::new(),
            failed: BTreeSet::new(),
            status: SessionStatus::Failed,
            errors: Vec::new(),
        };

        let session_id = match self.resolve_session(season, gap).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(session = %gap, error = %e, "Failed to resolve session row");
                result.errors.push(e.to_string());
                return result;
            }
        };
        result.session_id = Some(session_id);

        let blob = match self.fetch(gap, session_id).await {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(session = %gap, error = %e, "Session fetch failed, left as gap");
                result.errors.push(e.to_string());
                return result;
            }
        };

        for kind in &gap.missing {
            match self.extract_and_persist(session_id, *kind, &blob).await {
                Ok(()) => {
                    result.extracted.insert(*kind);
                }
                Err(e) => {
                    tracing::warn!(session = %gap, kind = %kind, error = %e, "Sub-dataset extraction failed");
                    result.failed.insert(*kind);
                    result.errors.push(e.to_string());
                }
            }
        }

        // the blob is scoped to this session
        drop(blob);

        result.status = SessionResult::resolve_status(&result.extracted, &result.failed);

        tracing::info!(
            year = gap.year,
            round = gap.round_number,
            session_type = %gap.session_type,
            status = result.status.as_str(),
            extracted = result.extracted.len(),
            failed = result.failed.len(),
            "Session processed"
        );

        result
    }

    /// Stored session id, creating event and session on first sight
    async fn resolve_session(&self, season: &Season, gap: &SessionGap) -> Result<i64, ImportError> {
        if let Some(id) = gap.session_id {
            return Ok(id);
        }

        let event = self
            .store
            .get_or_create_event(season, &gap.event_name, gap.round_number, gap.event_format)
            .await?;
        let session = self
            .store
            .get_or_create_session(&event, gap.session_type, gap.session_number)
            .await?;

        Ok(session.id)
    }

    async fn fetch(&self, gap: &SessionGap, session_id: i64) -> Result<SessionBlob, ImportError> {
        let fetched = self
            .provider
            .fetch_session_blob(gap.year, gap.provider_round, gap.session_type)
            .await;

        // the call was made either way
        if let Err(e) = self.store.record_api_call(Some(session_id), fetched.is_ok()).await {
            tracing::warn!(error = %e, "Failed to log provider call");
        }

        fetched.map_err(|source| ImportError::SessionFetchFailed {
            year: gap.year,
            round_number: gap.provider_round,
            session_type: gap.session_type,
            source,
        })
    }

    async fn extract_and_persist(
        &self,
        session_id: i64,
        kind: SubDatasetKind,
        blob: &SessionBlob,
    ) -> Result<(), ImportError> {
        let payload = extractors::extract(kind, blob).map_err(|e| ImportError::extraction(kind, &e))?;

        self.store
            .persist_subdataset(session_id, kind, &payload)
            .await
            .map_err(|e| ImportError::SubdatasetExtractionFailed {
                kind,
                reason: format!("persist failed: {}", e),
            })
    }
}
