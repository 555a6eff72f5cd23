//! Snapshot granularity filtering
//!
//! Revision histories for frequently edited documents contain hundreds of
//! near-identical snapshots. The filter thins an ascending revision list down
//! to one revision per time bucket (hour, day, week, or month), always keeping
//! the latest revision inside each bucket. `Granularity::All` disables
//! thinning entirely.

use chrono::{DateTime, Datelike, Days, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use bridge_traits::storage::RevisionMeta;

use crate::error::SyncError;

/// Bucket width used when thinning a revision history.
///
/// Weeks start on Monday and all buckets are computed in UTC, so the same
/// revision list always produces the same selection regardless of the local
/// timezone of the machine running the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    All,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::All => "all",
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        }
    }

    /// Returns the start of the bucket containing `at`, or `None` when the
    /// granularity does not bucket at all.
    pub fn bucket_floor(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = at.date_naive();
        let floored = match self {
            Granularity::All => return None,
            Granularity::Hourly => date.and_hms_opt(at.hour(), 0, 0),
            Granularity::Daily => date.and_hms_opt(0, 0, 0),
            Granularity::Weekly => date
                .checked_sub_days(Days::new(u64::from(at.weekday().num_days_from_monday())))
                .and_then(|monday| monday.and_hms_opt(0, 0, 0)),
            Granularity::Monthly => date.with_day(1).and_then(|first| first.and_hms_opt(0, 0, 0)),
        };
        floored.map(|naive| Utc.from_utc_datetime(&naive))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Granularity::All),
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            "weekly" => Ok(Granularity::Weekly),
            "monthly" => Ok(Granularity::Monthly),
            other => Err(SyncError::InvalidGranularity(other.to_string())),
        }
    }
}

/// A revision that survived filtering, tagged with the bucket it represents.
#[derive(Debug, Clone)]
pub struct RetainedRevision {
    pub revision: RevisionMeta,
    /// Start of the bucket this revision was selected for. `None` under
    /// `Granularity::All`.
    pub bucket: Option<DateTime<Utc>>,
}

/// Thins an ascending revision list to the latest revision per bucket.
///
/// The input must already be sorted by `modified_at` ascending; the output
/// preserves that order. The function never performs I/O.
pub fn filter_revisions(revisions: Vec<RevisionMeta>, granularity: Granularity) -> Vec<RetainedRevision> {
    if granularity == Granularity::All {
        return revisions
            .into_iter()
            .map(|revision| RetainedRevision {
                revision,
                bucket: None,
            })
            .collect();
    }

    let mut retained = Vec::new();
    let mut current: Option<(DateTime<Utc>, RevisionMeta)> = None;

    for revision in revisions {
        // A timestamp chrono cannot floor falls back to its own instant,
        // which keeps that revision in a bucket of its own.
        let bucket = granularity
            .bucket_floor(revision.modified_at)
            .unwrap_or(revision.modified_at);

        match current.take() {
            Some((open_bucket, best)) if open_bucket == bucket => {
                let winner = if revision.modified_at >= best.modified_at {
                    revision
                } else {
                    best
                };
                current = Some((open_bucket, winner));
            }
            Some((open_bucket, best)) => {
                retained.push(RetainedRevision {
                    revision: best,
                    bucket: Some(open_bucket),
                });
                current = Some((bucket, revision));
            }
            None => {
                current = Some((bucket, revision));
            }
        }
    }

    if let Some((open_bucket, best)) = current {
        retained.push(RetainedRevision {
            revision: best,
            bucket: Some(open_bucket),
        });
    }

    retained
}
