use thiserror::Error;
use tracing::debug;
use validator::Validate;

use crate::domain::event::dto::registry_notification::{RegistryEventRecord, RegistryNotification};
use crate::domain::event::push_event::PushEvent;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed registry notification: {0}")]
    MalformedPayload(String),
}

const PUSH_ACTIONS: [&str; 2] = ["push", "create"];

/// Decode a registry notification body into push events.
///
/// Non-push actions, layer blob pushes and pushes without tag or digest are
/// dropped. Any structural problem fails the whole batch.
pub fn decode(raw_body: &[u8], registry_override: Option<&str>) -> Result<Vec<PushEvent>, DecodeError> {
    let notification: RegistryNotification = serde_json::from_slice(raw_body)
        .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;

    let registry_override = registry_override
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let mut events = Vec::new();

    for (index, record) in notification.events.iter().enumerate() {
        if !is_push(record) {
            debug!(index, action = %record.action, "skipping non-push registry event");
            continue;
        }

        record
            .target
            .validate()
            .map_err(|e| DecodeError::MalformedPayload(format!("event {index}: {e}")))?;

        if !is_manifest(record.target.media_type.as_deref()) {
            debug!(index, repository = %record.target.repository, "skipping blob push");
            continue;
        }

        let tag = non_blank(record.target.tag.as_deref());
        let digest = non_blank(record.target.digest.as_deref());
        if tag.is_none() && digest.is_none() {
            debug!(index, repository = %record.target.repository, "skipping push without tag or digest");
            continue;
        }

        let registry_origin = registry_override
            .map(str::to_string)
            .or_else(|| origin_of(record));

        events.push(PushEvent {
            registry_origin,
            repository: record.target.repository.clone(),
            tag,
            digest,
        });
    }

    Ok(events)
}

fn is_push(record: &RegistryEventRecord) -> bool {
    PUSH_ACTIONS
        .iter()
        .any(|a| record.action.eq_ignore_ascii_case(a))
}

/// Manifests and manifest lists / indexes; registries also report pushes of
/// every layer and config blob.
fn is_manifest(media_type: Option<&str>) -> bool {
    match media_type {
        None => true,
        Some(mt) => mt.contains("manifest") || mt.contains("image.index"),
    }
}

fn origin_of(record: &RegistryEventRecord) -> Option<String> {
    record
        .request
        .as_ref()
        .and_then(|r| non_blank(r.host.as_deref()))
        .or_else(|| record.target.url.as_deref().and_then(host_of_url))
}

fn host_of_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest)?;
    let host = rest.split('/').next()?;
    non_blank(Some(host))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

    fn push(repository: &str, tag: Option<&str>) -> serde_json::Value {
        json!({
            "id": "320678d8-ca14-430f-8bb6-4ca139cd83f7",
            "timestamp": "2016-03-09T14:44:26.402973972-08:00",
            "action": "push",
            "target": {
                "mediaType": MANIFEST,
                "size": 708,
                "digest": "sha256:fea8895f450959fa676bcc1df0611ea93823a735a01205fd8622846041d0c7cf",
                "length": 708,
                "repository": repository,
                "url": "http://registry.local:5000/v2/hello-world/manifests/sha256:fea8895f",
                "tag": tag
            },
            "request": {
                "id": "6df24a34-0959-4923-81ca-14f09767db19",
                "addr": "192.168.64.11:42961",
                "host": "192.168.100.227:5000",
                "method": "PUT",
                "useragent": "curl/7.38.0"
            },
            "actor": {},
            "source": { "addr": "xtal.local:5000", "instanceID": "a53db899-3b4b-4a62-a067-8dd013beaca4" }
        })
    }

    fn body(events: Vec<serde_json::Value>) -> Vec<u8> {
        serde_json::to_vec(&json!({ "events": events })).unwrap()
    }

    #[test]
    fn decodes_a_manifest_push() {
        let events = decode(&body(vec![push("hello-world", Some("v2"))]), None).unwrap();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.repository, "hello-world");
        assert_eq!(event.tag.as_deref(), Some("v2"));
        assert!(event.digest.as_deref().unwrap().starts_with("sha256:fea8"));
        assert_eq!(event.registry_origin.as_deref(), Some("192.168.100.227:5000"));
    }

    #[test]
    fn override_wins_over_declared_origin() {
        let events = decode(
            &body(vec![push("app", Some("v2"))]),
            Some(" registry.example.com "),
        )
        .unwrap();
        assert_eq!(events[0].registry_origin.as_deref(), Some("registry.example.com"));

        // blank override is ignored
        let events = decode(&body(vec![push("app", Some("v2"))]), Some("  ")).unwrap();
        assert_eq!(events[0].registry_origin.as_deref(), Some("192.168.100.227:5000"));
    }

    #[test]
    fn origin_falls_back_to_the_target_url() {
        let mut record = push("app", Some("v2"));
        record["request"] = json!({});

        let events = decode(&body(vec![record]), None).unwrap();
        assert_eq!(events[0].registry_origin.as_deref(), Some("registry.local:5000"));
    }

    #[test]
    fn filters_pulls_deletes_and_blobs() {
        let mut pull = push("app", Some("v2"));
        pull["action"] = json!("pull");
        let mut delete = push("app", Some("v2"));
        delete["action"] = json!("delete");
        let mut layer = push("app", None);
        layer["target"]["mediaType"] = json!("application/vnd.docker.image.rootfs.diff.tar.gzip");
        let mut create = push("app", Some("v3"));
        create["action"] = json!("CREATE");

        let events = decode(&body(vec![pull, delete, layer, create]), None).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tag.as_deref(), Some("v3"));
    }

    #[test]
    fn digest_only_push_is_kept() {
        let events = decode(&body(vec![push("app", None)]), None).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].tag.is_none());
        assert!(events[0].digest.is_some());
    }

    #[test]
    fn empty_envelope_yields_no_events() {
        assert!(decode(br#"{"events": []}"#, None).unwrap().is_empty());
    }

    #[test]
    fn malformed_envelopes_fail_the_whole_batch() {
        let missing_target = json!({ "action": "push" });
        let empty_repository = push("", Some("v2"));

        for raw in [
            b"not json".to_vec(),
            br#"{"foo": []}"#.to_vec(),
            br#"[{"action": "push"}]"#.to_vec(),
            body(vec![push("app", Some("v2")), missing_target]),
            body(vec![push("app", Some("v2")), empty_repository]),
        ] {
            assert!(
                matches!(decode(&raw, None), Err(DecodeError::MalformedPayload(_))),
                "accepted {}",
                String::from_utf8_lossy(&raw)
            );
        }
    }

    #[test]
    fn decoding_is_idempotent() {
        let raw = body(vec![push("app", Some("v2")), push("worker", Some("latest"))]);

        let first = decode(&raw, Some("registry:5000")).unwrap();
        let second = decode(&raw, Some("registry:5000")).unwrap();

        assert_eq!(first, second);
    }
}
