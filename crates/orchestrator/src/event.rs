//! Trigger-event filtering
//!
//! A run starts when the video bucket reports a new object. Only creation
//! events with a non-empty body qualify: folder placeholders and deletion
//! notifications must never start a pipeline run.

use serde::{Deserialize, Serialize};
use tracing::debug;
use video_narrative_common::VideoSource;

/// Kind of object-store notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectEventKind {
    Created,
    Removed,
    Other,
}

/// Object-store notification as delivered by the video bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectEvent {
    pub kind: ObjectEventKind,
    /// Storage key of the object the event refers to
    pub key: String,
    /// Object size in bytes at event time
    pub size: u64,
}

/// Build the video source for a qualifying event; `None` filters the
/// event out before any run starts.
#[must_use]
pub fn video_source_from_event(
    event: &ObjectEvent,
    bucket: &str,
    region: &str,
) -> Option<VideoSource> {
    if event.kind != ObjectEventKind::Created {
        debug!("Ignoring non-creation event for '{}'", event.key);
        return None;
    }
    if event.size == 0 {
        debug!("Ignoring zero-byte placeholder event for '{}'", event.key);
        return None;
    }
    if event.key.is_empty() {
        return None;
    }

    Some(VideoSource::new(bucket, region, &event.key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(key: &str, size: u64) -> ObjectEvent {
        ObjectEvent {
            kind: ObjectEventKind::Created,
            key: key.to_string(),
            size,
        }
    }

    #[test]
    fn test_creation_event_becomes_video_source() {
        let video = video_source_from_event(&created("demos/demo.mp4", 1024), "videos", "us-east-1")
            .expect("event should qualify");

        assert_eq!(video.id.as_str(), "demos-demo.mp4");
        assert_eq!(video.s3_uri, "s3://videos/demos/demo.mp4");
    }

    #[test]
    fn test_non_creation_events_are_filtered() {
        let event = ObjectEvent {
            kind: ObjectEventKind::Removed,
            key: "demo.mp4".to_string(),
            size: 1024,
        };
        assert!(video_source_from_event(&event, "videos", "us-east-1").is_none());
    }

    #[test]
    fn test_zero_byte_placeholders_are_filtered() {
        assert!(video_source_from_event(&created("placeholder/", 0), "videos", "us-east-1").is_none());
    }

    #[test]
    fn test_empty_key_is_filtered() {
        assert!(video_source_from_event(&created("", 10), "videos", "us-east-1").is_none());
    }
}
