//! # Document Sync State Machine
//!
//! Manages the lifecycle of a single document within a sync run.
//!
//! ## Overview
//!
//! Each document travels through a fixed pipeline of phases. Transitions are
//! consuming methods that validate the move before applying it, so an
//! out-of-order call surfaces as an error instead of silently corrupting the
//! job record.
//!
//! ## State Machine
//!
//! ```text
//! Resolving → Listing → Filtering → Downloading → Done
//!     ↓          ↓          ↓            ↓
//!     └──────────┴──────────┴────────────┴──────→ Failed
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::DocumentJob;
//!
//! let job = DocumentJob::new("https://docs.example.com/document/d/ABC123/edit");
//! let job = job.resolved("ABC123")?;
//! let job = job.listed(37)?;
//! let mut job = job.filtered(12)?;
//! job.record_downloaded()?;
//! let job = job.done()?;
//! ```

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Phases
// ============================================================================

/// Pipeline phase of a single document within a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentPhase {
    Resolving,
    Listing,
    Filtering,
    Downloading,
    Done,
    Failed,
}

impl DocumentPhase {
    /// Check if this phase is terminal (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentPhase::Done | DocumentPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentPhase::Resolving => "resolving",
            DocumentPhase::Listing => "listing",
            DocumentPhase::Filtering => "filtering",
            DocumentPhase::Downloading => "downloading",
            DocumentPhase::Done => "done",
            DocumentPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Revision counters accumulated while a document syncs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub revisions_listed: usize,
    pub revisions_retained: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

// ============================================================================
// Job
// ============================================================================

/// The sync record for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentJob {
    /// The reference as supplied by the caller (URL or bare identifier).
    pub reference: String,
    /// Resolved identifier, set once the reference has been parsed.
    pub document_id: Option<String>,
    pub phase: DocumentPhase,
    pub stats: DocumentStats,
    /// Human-readable reason, set when the phase is `Failed`.
    pub failure: Option<String>,
}

impl DocumentJob {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            document_id: None,
            phase: DocumentPhase::Resolving,
            stats: DocumentStats::default(),
            failure: None,
        }
    }

    /// Records the resolved identifier and moves to `Listing`.
    pub fn resolved(mut self, document_id: impl Into<String>) -> Result<Self> {
        self.validate_transition(DocumentPhase::Listing)?;
        self.document_id = Some(document_id.into());
        self.phase = DocumentPhase::Listing;
        Ok(self)
    }

    /// Records the listed revision count and moves to `Filtering`.
    pub fn listed(mut self, revisions_listed: usize) -> Result<Self> {
        self.validate_transition(DocumentPhase::Filtering)?;
        self.stats.revisions_listed = revisions_listed;
        self.phase = DocumentPhase::Filtering;
        Ok(self)
    }

    /// Records the retained revision count and moves to `Downloading`.
    pub fn filtered(mut self, revisions_retained: usize) -> Result<Self> {
        self.validate_transition(DocumentPhase::Downloading)?;
        self.stats.revisions_retained = revisions_retained;
        self.phase = DocumentPhase::Downloading;
        Ok(self)
    }

    /// Moves to `Done` once every retained revision has an outcome.
    pub fn done(mut self) -> Result<Self> {
        self.validate_transition(DocumentPhase::Done)?;
        self.phase = DocumentPhase::Done;
        Ok(self)
    }

    /// Moves to `Failed` from any non-terminal phase.
    pub fn fail(mut self, reason: impl Into<String>) -> Result<Self> {
        self.validate_transition(DocumentPhase::Failed)?;
        self.phase = DocumentPhase::Failed;
        self.failure = Some(reason.into());
        Ok(self)
    }

    pub fn record_downloaded(&mut self) -> Result<()> {
        self.guard_downloading("record_downloaded")?;
        self.stats.downloaded += 1;
        Ok(())
    }

    pub fn record_skipped(&mut self) -> Result<()> {
        self.guard_downloading("record_skipped")?;
        self.stats.skipped += 1;
        Ok(())
    }

    pub fn record_failed(&mut self) -> Result<()> {
        self.guard_downloading("record_failed")?;
        self.stats.failed += 1;
        Ok(())
    }

    fn validate_transition(&self, to: DocumentPhase) -> Result<()> {
        let valid = match (self.phase, to) {
            (DocumentPhase::Resolving, DocumentPhase::Listing) => true,
            (DocumentPhase::Listing, DocumentPhase::Filtering) => true,
            (DocumentPhase::Filtering, DocumentPhase::Downloading) => true,
            (DocumentPhase::Downloading, DocumentPhase::Done) => true,
            (from, DocumentPhase::Failed) => !from.is_terminal(),
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
                reason: "Transition not allowed".to_string(),
            })
        }
    }

    fn guard_downloading(&self, action: &str) -> Result<()> {
        if self.phase != DocumentPhase::Downloading {
            return Err(SyncError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: action.to_string(),
                reason: "Outcomes can only be recorded while downloading".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
