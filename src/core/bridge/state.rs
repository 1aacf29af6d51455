//! Per-call session state owned by the bridge.

use serde_json::{Map, Value};

/// Timing and item bookkeeping for the active call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Carrier stream id; addresses playback, mark and clear commands.
    pub stream_id: Option<String>,
    /// Timestamp of the most recent caller audio chunk, in ms since stream start.
    pub latest_media_timestamp: i64,
    /// `latest_media_timestamp` when the current assistant response started playing.
    pub response_start_timestamp: Option<i64>,
    /// Assistant item currently being played.
    pub last_assistant_item: Option<String>,
    /// Most recent session configuration pushed by the observer.
    pub saved_config: Option<Map<String, Value>>,
}

/// A pending barge-in truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub item_id: String,
    pub audio_end_ms: u64,
    pub stream_id: Option<String>,
}

impl SessionState {
    /// Start a new stream. Saved configuration survives.
    pub fn begin_stream(&mut self, stream_id: Option<String>) {
        self.stream_id = stream_id;
        self.latest_media_timestamp = 0;
        self.response_start_timestamp = None;
        self.last_assistant_item = None;
    }

    /// Record an assistant audio delta.
    ///
    /// The first delta of a response anchors it to telephony time.
    pub fn note_audio_delta(&mut self, item_id: Option<String>) {
        if self.response_start_timestamp.is_none() {
            self.response_start_timestamp = Some(self.latest_media_timestamp);
        }
        if let Some(item_id) = item_id.filter(|id| !id.is_empty()) {
            self.last_assistant_item = Some(item_id);
        }
    }

    /// Compute and consume the truncation for a barge-in, if anything is playing.
    pub fn take_truncation(&mut self) -> Option<Truncation> {
        let start = self.response_start_timestamp?;
        let item_id = self.last_assistant_item.take()?;
        self.response_start_timestamp = None;

        let elapsed = self.latest_media_timestamp.saturating_sub(start).max(0);
        Some(Truncation {
            item_id,
            audio_end_ms: u64::try_from(elapsed).unwrap_or(0),
            stream_id: self.stream_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_stream_keeps_saved_config() {
        let mut state = SessionState {
            latest_media_timestamp: 500,
            response_start_timestamp: Some(100),
            last_assistant_item: Some("a0".into()),
            saved_config: Some(Map::new()),
            ..Default::default()
        };
        state.begin_stream(Some("MZ1".into()));

        assert_eq!(state.stream_id.as_deref(), Some("MZ1"));
        assert_eq!(state.latest_media_timestamp, 0);
        assert_eq!(state.response_start_timestamp, None);
        assert_eq!(state.last_assistant_item, None);
        assert!(state.saved_config.is_some());
    }

    #[test]
    fn test_first_delta_anchors_response_start() {
        let mut state = SessionState {
            latest_media_timestamp: 1000,
            ..Default::default()
        };
        state.note_audio_delta(Some("a1".into()));
        state.latest_media_timestamp = 1400;
        state.note_audio_delta(Some("a2".into()));

        assert_eq!(state.response_start_timestamp, Some(1000));
        assert_eq!(state.last_assistant_item.as_deref(), Some("a2"));
    }

    #[test]
    fn test_delta_without_item_keeps_previous() {
        let mut state = SessionState::default();
        state.note_audio_delta(Some("a1".into()));
        state.note_audio_delta(None);
        assert_eq!(state.last_assistant_item.as_deref(), Some("a1"));
    }

    #[test]
    fn test_truncation_offset() {
        let mut state = SessionState {
            stream_id: Some("MZ1".into()),
            latest_media_timestamp: 1000,
            ..Default::default()
        };
        state.note_audio_delta(Some("a1".into()));
        state.latest_media_timestamp = 1640;

        let truncation = state.take_truncation().unwrap();
        assert_eq!(truncation.item_id, "a1");
        assert_eq!(truncation.audio_end_ms, 640);
        assert_eq!(truncation.stream_id.as_deref(), Some("MZ1"));
        assert_eq!(state.last_assistant_item, None);
        assert_eq!(state.response_start_timestamp, None);
    }

    #[test]
    fn test_truncation_never_negative() {
        for (latest, start) in [(0, 0), (100, 2000), (-50, 10), (i64::MIN, i64::MAX)] {
            let mut state = SessionState {
                latest_media_timestamp: latest,
                response_start_timestamp: Some(start),
                last_assistant_item: Some("a1".into()),
                ..Default::default()
            };
            assert_eq!(state.take_truncation().unwrap().audio_end_ms, 0);
        }
    }

    #[test]
    fn test_truncation_noop_without_item() {
        let mut state = SessionState {
            response_start_timestamp: Some(10),
            ..Default::default()
        };
        assert!(state.take_truncation().is_none());
        assert_eq!(state.response_start_timestamp, Some(10));

        let mut state = SessionState {
            last_assistant_item: Some("a1".into()),
            ..Default::default()
        };
        assert!(state.take_truncation().is_none());
        assert_eq!(state.last_assistant_item.as_deref(), Some("a1"));
    }
}
