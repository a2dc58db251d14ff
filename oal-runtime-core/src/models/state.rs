use serde::{Deserialize, Serialize};

/// Source transport state machine.
///
/// ```text
/// initial → playing ↔ paused
///              ↓        ↓
///           stopped ← ──┘
///              ↓ (play / loop)
///           playing
/// ```
///
/// Only `Playing` sources are walked by the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl SourceState {
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Whether starting playback restarts from the first queued buffer.
    pub fn restarts_on_play(&self) -> bool {
        matches!(self, Self::Initial | Self::Stopped)
    }
}

/// Per-entry state of a source's buffer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEntryState {
    Pending,
    Processed,
}

impl QueueEntryState {
    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_initial() {
        assert_eq!(SourceState::default(), SourceState::Initial);
    }

    #[test]
    fn restart_rules() {
        assert!(SourceState::Initial.restarts_on_play());
        assert!(SourceState::Stopped.restarts_on_play());
        assert!(!SourceState::Paused.restarts_on_play());
        assert!(!SourceState::Playing.restarts_on_play());
    }
}
