use serde::{Deserialize, Serialize};

/// Share of the media duration that must be watched before a view counts.
pub const VIEW_THRESHOLD_NUMERATOR: u64 = 2;
pub const VIEW_THRESHOLD_DENOMINATOR: u64 = 5;

/// Timing events produced by the media player. The session only reads them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum PlaybackEvent {
    Playing,
    Pause,
    Waiting,
    Ended,
    LoadedMetadata {
        duration: f64,
    },
    TimeUpdate {
        #[serde(alias = "currentTime")]
        current_time: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchPhase {
    Idle,
    Counting,
    Paused,
    /// Terminal: the view has been counted for this session.
    ViewCounted,
}

/// Outbound calls a session asks for. Positions are whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum WatchEffect {
    /// Latest-write-wins resume position update; fired on every lifecycle event.
    LogPosition { position: u64 },
    /// First write putting the video into the viewer's history.
    AddToHistory { position: u64 },
    IncrementView,
}

/// Watch-time bookkeeping for the currently open video.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSession {
    phase: WatchPhase,
    accumulated_secs: u64,
    duration: f64,
    position: f64,
    view_counted: bool,
    logged_history: bool,
    history_floor_secs: u64,
}

impl WatchSession {
    pub fn new(history_floor_secs: u64) -> Self {
        Self {
            phase: WatchPhase::Idle,
            accumulated_secs: 0,
            duration: 0.0,
            position: 0.0,
            view_counted: false,
            logged_history: false,
            history_floor_secs,
        }
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn is_counting(&self) -> bool {
        self.phase == WatchPhase::Counting
    }

    pub fn accumulated_secs(&self) -> u64 {
        self.accumulated_secs
    }

    pub fn view_counted(&self) -> bool {
        self.view_counted
    }

    pub fn has_logged_history(&self) -> bool {
        self.logged_history
    }

    pub fn position_secs(&self) -> u64 {
        self.position.floor() as u64
    }

    /// `floor(2 * duration / 5)`, or `None` while the duration is unknown.
    pub fn view_threshold(&self) -> Option<u64> {
        if self.duration <= 0.0 {
            return None;
        }
        let scaled =
            self.duration * VIEW_THRESHOLD_NUMERATOR as f64 / VIEW_THRESHOLD_DENOMINATOR as f64;
        Some(scaled.floor() as u64)
    }

    pub fn handle(&mut self, event: PlaybackEvent) -> Vec<WatchEffect> {
        let mut effects = Vec::new();
        match event {
            PlaybackEvent::LoadedMetadata { duration } => {
                self.duration = if duration.is_finite() && duration > 0.0 {
                    duration
                } else {
                    0.0
                };
                if self.is_counting() {
                    self.check_thresholds(&mut effects);
                }
            }
            PlaybackEvent::TimeUpdate { current_time } => {
                if current_time.is_finite() && current_time >= 0.0 {
                    self.position = current_time;
                }
            }
            PlaybackEvent::Playing => {
                effects.push(self.log_position());
                if !self.view_counted {
                    self.phase = WatchPhase::Counting;
                    self.check_thresholds(&mut effects);
                }
            }
            PlaybackEvent::Pause | PlaybackEvent::Waiting | PlaybackEvent::Ended => {
                effects.push(self.log_position());
                if !self.view_counted {
                    self.phase = WatchPhase::Paused;
                }
            }
        }
        effects
    }

    /// One second of playback elapsed. Ignored unless counting.
    pub fn tick(&mut self) -> Vec<WatchEffect> {
        let mut effects = Vec::new();
        if !self.is_counting() {
            return effects;
        }
        self.accumulated_secs += 1;
        self.check_thresholds(&mut effects);
        effects
    }

    pub fn advance(&mut self, seconds: u64) -> Vec<WatchEffect> {
        let mut effects = Vec::new();
        for _ in 0..seconds {
            if !self.is_counting() {
                break;
            }
            effects.extend(self.tick());
        }
        effects
    }

    fn check_thresholds(&mut self, effects: &mut Vec<WatchEffect>) {
        if !self.logged_history && self.accumulated_secs >= self.history_floor_secs {
            effects.push(self.add_to_history());
        }
        let Some(threshold) = self.view_threshold() else {
            return;
        };
        if self.view_counted || self.accumulated_secs < threshold {
            return;
        }
        self.view_counted = true;
        self.phase = WatchPhase::ViewCounted;
        log::info!(
            "view threshold reached after {}s (threshold {}s)",
            self.accumulated_secs,
            threshold
        );
        effects.push(WatchEffect::IncrementView);
        // Counting stops here, so a floor above the threshold would otherwise never fire.
        if !self.logged_history {
            effects.push(self.add_to_history());
        }
    }

    fn add_to_history(&mut self) -> WatchEffect {
        self.logged_history = true;
        WatchEffect::AddToHistory {
            position: self.position_secs(),
        }
    }

    fn log_position(&self) -> WatchEffect {
        WatchEffect::LogPosition {
            position: self.position_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(effects: &[WatchEffect], wanted: WatchEffect) -> usize {
        effects.iter().filter(|effect| **effect == wanted).count()
    }

    fn playing_session(duration: f64) -> WatchSession {
        let mut session = WatchSession::new(1);
        session.handle(PlaybackEvent::LoadedMetadata { duration });
        session.handle(PlaybackEvent::Playing);
        session
    }

    #[test]
    fn view_fires_once_at_forty_percent() {
        let mut session = playing_session(100.0);
        let mut effects = session.advance(39);
        assert_eq!(count(&effects, WatchEffect::IncrementView), 0);

        effects = session.tick();
        assert_eq!(session.accumulated_secs(), 40);
        assert_eq!(count(&effects, WatchEffect::IncrementView), 1);
        assert_eq!(session.phase(), WatchPhase::ViewCounted);

        let mut later = Vec::new();
        for _ in 0..5 {
            later.extend(session.handle(PlaybackEvent::Pause));
            later.extend(session.handle(PlaybackEvent::Playing));
            later.extend(session.advance(100));
        }
        assert_eq!(count(&later, WatchEffect::IncrementView), 0);
        assert_eq!(session.accumulated_secs(), 40);
        assert!(!session.is_counting());
    }

    #[test]
    fn fractional_duration_scales_before_flooring() {
        let mut session = playing_session(102.9);
        assert_eq!(session.view_threshold(), Some(41));
        let effects = session.advance(40);
        assert_eq!(count(&effects, WatchEffect::IncrementView), 0);
        let effects = session.tick();
        assert_eq!(count(&effects, WatchEffect::IncrementView), 1);
        assert_eq!(session.accumulated_secs(), 41);
    }

    #[test]
    fn short_clip_counts_as_soon_as_it_plays() {
        let mut session = WatchSession::new(1);
        session.handle(PlaybackEvent::LoadedMetadata { duration: 2.0 });
        assert_eq!(session.view_threshold(), Some(0));
        let effects = session.handle(PlaybackEvent::Playing);
        assert_eq!(count(&effects, WatchEffect::IncrementView), 1);
        assert!(session.view_counted());
        assert_eq!(session.accumulated_secs(), 0);
        assert!(session.tick().is_empty());
    }

    #[test]
    fn unknown_duration_never_counts() {
        let mut session = WatchSession::new(1);
        session.handle(PlaybackEvent::Playing);
        let effects = session.advance(1_000);
        assert_eq!(count(&effects, WatchEffect::IncrementView), 0);
        assert_eq!(session.view_threshold(), None);
        assert_eq!(session.accumulated_secs(), 1_000);

        session.handle(PlaybackEvent::LoadedMetadata { duration: f64::NAN });
        assert_eq!(session.view_threshold(), None);
    }

    #[test]
    fn late_metadata_counts_immediately_when_past_threshold() {
        let mut session = WatchSession::new(1);
        session.handle(PlaybackEvent::Playing);
        session.advance(50);
        let effects = session.handle(PlaybackEvent::LoadedMetadata { duration: 100.0 });
        assert_eq!(effects, vec![WatchEffect::IncrementView]);
        assert!(session.view_counted());
    }

    #[test]
    fn pause_stops_accumulation() {
        let mut session = playing_session(100.0);
        session.advance(5);
        session.handle(PlaybackEvent::Waiting);
        assert_eq!(session.phase(), WatchPhase::Paused);
        assert!(session.tick().is_empty());
        assert_eq!(session.accumulated_secs(), 5);

        session.handle(PlaybackEvent::Playing);
        session.advance(3);
        assert_eq!(session.accumulated_secs(), 8);
    }

    #[test]
    fn every_lifecycle_event_logs_position() {
        let mut session = WatchSession::new(1);
        session.handle(PlaybackEvent::TimeUpdate { current_time: 12.7 });
        for event in [
            PlaybackEvent::Playing,
            PlaybackEvent::Pause,
            PlaybackEvent::Waiting,
            PlaybackEvent::Ended,
        ] {
            assert_eq!(
                session.handle(event),
                vec![WatchEffect::LogPosition { position: 12 }]
            );
        }
        assert!(session
            .handle(PlaybackEvent::TimeUpdate { current_time: 13.0 })
            .is_empty());
    }

    #[test]
    fn history_is_added_once_after_floor() {
        let mut session = WatchSession::new(3);
        session.handle(PlaybackEvent::LoadedMetadata { duration: 600.0 });
        session.handle(PlaybackEvent::TimeUpdate { current_time: 2.0 });
        session.handle(PlaybackEvent::Playing);
        assert!(session.advance(2).is_empty());
        let effects = session.tick();
        assert_eq!(effects, vec![WatchEffect::AddToHistory { position: 2 }]);
        assert!(session.has_logged_history());
        assert!(session.advance(50).is_empty());
    }

    #[test]
    fn history_floor_above_threshold_fires_with_view() {
        let mut session = WatchSession::new(1_000);
        session.handle(PlaybackEvent::LoadedMetadata { duration: 10.0 });
        session.handle(PlaybackEvent::Playing);
        let effects = session.advance(10);
        assert_eq!(
            effects,
            vec![
                WatchEffect::IncrementView,
                WatchEffect::AddToHistory { position: 0 }
            ]
        );
    }

    #[test]
    fn ended_is_not_a_view() {
        let mut session = playing_session(100.0);
        session.advance(10);
        session.handle(PlaybackEvent::Ended);
        assert!(!session.view_counted());
        assert_eq!(session.phase(), WatchPhase::Paused);
    }

    #[test]
    fn events_parse_from_player_names() {
        let event: PlaybackEvent =
            serde_json::from_str(r#"{"event":"timeupdate","currentTime":4.5}"#).unwrap();
        assert_eq!(event, PlaybackEvent::TimeUpdate { current_time: 4.5 });
        let event: PlaybackEvent =
            serde_json::from_str(r#"{"event":"loadedmetadata","duration":90}"#).unwrap();
        assert_eq!(event, PlaybackEvent::LoadedMetadata { duration: 90.0 });
    }
}
