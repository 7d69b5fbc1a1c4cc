//! Matching completion events to runs.

use std::collections::{HashMap, HashSet};

use shed_events::RawCompletionEvent;
use shed_id::{ExternalTag, RunId, SourceKey};
use shed_schedule::JobRecord;
use tracing::{debug, warn};

/// A tag to attach to one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
    pub run_id: RunId,
    pub source_key: SourceKey,
    pub tag: ExternalTag,
}

/// The outcome of matching one batch of events against one run snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPlan {
    /// At most one update per run.
    pub updates: Vec<TagUpdate>,
    /// Events whose payload could not be decoded.
    pub parse_failures: usize,
    /// Well-formed events missing a tag or a source key.
    pub skipped_incomplete: usize,
}

/// Plans tag updates for `jobs` from `events`.
///
/// Only runs that are in process, untagged, and durable are candidates.
/// Events are taken in timestamp order (undated last, ties in feed order),
/// so when several events could tag the same run the earliest wins. Each
/// run is claimed at most once per plan.
pub fn plan_updates(jobs: &[JobRecord], events: &[RawCompletionEvent]) -> MatchPlan {
    let mut candidates: HashMap<&SourceKey, Vec<&RunId>> = HashMap::new();
    for job in jobs.iter().filter(|j| j.awaits_tag()) {
        if let Some(id) = job.id.durable() {
            candidates.entry(&job.source_key).or_default().push(id);
        }
    }

    let mut ordered: Vec<&RawCompletionEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.timestamp.is_none(), e.timestamp));

    let mut plan = MatchPlan::default();
    let mut claimed: HashSet<&RunId> = HashSet::new();

    for raw in ordered {
        let event = match raw.parse() {
            Ok(event) => event,
            Err(e) if e.is_parse_failure() => {
                warn!(batch = ?raw.batch, error = %e, "Skipping unparseable completion event");
                plan.parse_failures += 1;
                continue;
            }
            Err(e) => {
                debug!(error = %e, "Skipping incomplete completion event");
                plan.skipped_incomplete += 1;
                continue;
            }
        };

        let Some(runs) = candidates.get(&event.source_key) else {
            continue;
        };

        for run_id in runs {
            if claimed.insert(*run_id) {
                debug!(
                    run_id = %run_id,
                    source_key = %event.source_key,
                    tag = %event.external_tag,
                    "Matched batch to run"
                );
                plan.updates.push(TagUpdate {
                    run_id: (*run_id).clone(),
                    source_key: event.source_key.clone(),
                    tag: event.external_tag.clone(),
                });
            }
        }
    }

    plan
}
