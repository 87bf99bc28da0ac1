//! Dedup planning: turn identical files into remediation tasks.
//!
//! Files match when they share byte size and content fingerprint. Each
//! group keeps its earliest-seen member, retimed to the oldest timestamp
//! any member carries; every other member is scheduled for deletion.

use crate::core::store::{CandidateFile, Store, TaskOperation};
use crate::error::MediaDedupError;
use crate::events::{EventSender, PlanEvent};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    /// Duplicate groups found
    pub groups: usize,
    /// Redundant copies scheduled for deletion
    pub duplicates: usize,
    /// Total tasks written, including the adjust per group
    pub tasks_created: usize,
}

/// Rebuild the task list from the current file records. Any tasks left
/// over from a previous plan are discarded; planning always reflects the
/// latest scan.
pub fn prepare_tasks(store: &Store, events: &EventSender) -> Result<PlanSummary, MediaDedupError> {
    let candidates = store.fingerprint_candidates()?;
    let mut tasks: Vec<(i64, TaskOperation)> = Vec::new();
    let mut group_sizes: Vec<usize> = Vec::new();
    let mut summary = PlanSummary {
        groups: 0,
        duplicates: 0,
        tasks_created: 0,
    };

    for group in groups(&candidates) {
        summary.groups += 1;
        summary.duplicates += group.len() - 1;
        let canonical = group.iter().flat_map(|c| c.timestamps()).min();
        tasks.push((
            group[0].id,
            TaskOperation::Adjust {
                new_timestamp: canonical,
            },
        ));
        for member in &group[1..] {
            tasks.push((member.id, TaskOperation::Delete));
        }
        group_sizes.push(group.len());
    }

    summary.tasks_created = tasks.len();
    store.replace_tasks(&tasks)?;
    info!(
        groups = summary.groups,
        tasks = summary.tasks_created,
        "dedup plan written"
    );

    // Events only report what has committed
    events.send(PlanEvent::TasksCleared);
    for members in group_sizes {
        events.send(PlanEvent::GroupPlanned { members });
    }
    events.send(PlanEvent::Completed {
        groups: summary.groups,
        tasks: summary.tasks_created,
    });
    Ok(summary)
}

/// Split the sorted candidate list into runs of equal (size, fingerprint)
/// with at least two members. Relies on the store's ordering.
fn groups<'a>(candidates: &'a [CandidateFile]) -> impl Iterator<Item = &'a [CandidateFile]> + 'a {
    let mut rest = candidates;
    std::iter::from_fn(move || {
        while !rest.is_empty() {
            let head = &rest[0];
            let len = rest
                .iter()
                .take_while(|c| c.size == head.size && c.content_fingerprint == head.content_fingerprint)
                .count();
            let (group, tail) = rest.split_at(len);
            rest = tail;
            if len >= 2 {
                return Some(group);
            }
        }
        None
    })
}
