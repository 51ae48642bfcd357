use std::collections::BTreeSet;

use crate::core::state::runtime::workload::workload_snapshot::{WorkloadSnapshot, WorkloadSpec};
use crate::domain::event::push_event::PushEvent;
use crate::domain::rollout::image_reference::ImageReference;

/// Ids of the workloads in `snapshot` that run the pushed image.
///
/// Tag matches are best-effort: a push of `app:latest` impacts everything
/// running `app:latest` regardless of the digest it currently runs.
pub fn resolve(snapshot: &WorkloadSnapshot, event: &PushEvent) -> BTreeSet<String> {
    snapshot
        .workloads()
        .filter(|w| is_impacted(w, event))
        .map(|w| w.id.clone())
        .collect()
}

pub fn is_impacted(workload: &WorkloadSpec, event: &PushEvent) -> bool {
    workload
        .image_references
        .iter()
        .filter_map(|raw| ImageReference::parse(raw))
        .any(|reference| references_pushed_image(&reference, event))
}

fn references_pushed_image(reference: &ImageReference, event: &PushEvent) -> bool {
    if reference.repository != event.repository {
        return false;
    }

    // only compared when both sides name a registry
    if let (Some(ours), Some(theirs)) = (&reference.registry, &event.registry_origin) {
        if !ours.eq_ignore_ascii_case(theirs) {
            return false;
        }
    }

    let tag_matches = match (reference.effective_tag(), event.tag.as_deref()) {
        (Some(ours), Some(theirs)) => ours == theirs,
        _ => false,
    };

    let digest_matches = match (&reference.digest, &event.digest) {
        (Some(ours), Some(theirs)) => ours == theirs,
        _ => false,
    };

    tag_matches || digest_matches
}
