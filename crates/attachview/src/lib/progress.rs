//! Load progress and the mesh viewer state machine

/// Highest percentage reported while a load is still in flight
pub const IN_FLIGHT_CEILING: u8 = 99;

/// Percent-complete tracker for a download.
///
/// With a known length the value follows the transferred fraction; without
/// one it creeps up by one per update. Either way it never decreases and it
/// stays at or below [`IN_FLIGHT_CEILING`] until [`LoadProgress::complete`]
/// is called, so 100 always means the asset is usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    percent: u8,
}

impl LoadProgress {
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Record a transfer update and return the new percentage
    pub fn update(&mut self, loaded: u64, total: Option<u64>) -> u8 {
        let next = match total {
            Some(total) if total > 0 => {
                let fraction = loaded.min(total) as f64 / total as f64;
                (fraction * 100.0).round() as u8
            }
            _ => self.percent.saturating_add(1),
        };
        self.percent = self.percent.max(next.min(IN_FLIGHT_CEILING));
        self.percent
    }

    /// The asset decoded successfully
    pub fn complete(&mut self) {
        self.percent = 100;
    }

    pub fn is_complete(&self) -> bool {
        self.percent == 100
    }
}

/// Lifecycle of one mesh attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshLoadState {
    Idle,
    Loading(LoadProgress),
    Ready,
    Failed(String),
}

impl Default for MeshLoadState {
    fn default() -> Self {
        Self::Idle
    }
}

impl MeshLoadState {
    pub fn start(&mut self) {
        if matches!(self, Self::Idle) {
            *self = Self::Loading(LoadProgress::default());
        }
    }

    /// Forward a transfer update; ignored outside `Loading`
    pub fn progress(&mut self, loaded: u64, total: Option<u64>) {
        if let Self::Loading(progress) = self {
            progress.update(loaded, total);
        }
    }

    /// Loading finished and the mesh is in the scene
    pub fn ready(&mut self) {
        if matches!(self, Self::Loading(_)) {
            *self = Self::Ready;
        }
    }

    /// Terminal failure; a finished load cannot fail afterwards
    pub fn fail(&mut self, reason: impl Into<String>) {
        if matches!(self, Self::Idle | Self::Loading(_)) {
            *self = Self::Failed(reason.into());
        }
    }

    /// Percentage to display, `None` once failed
    pub fn percent(&self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Loading(progress) => Some(progress.percent()),
            Self::Ready => Some(100),
            Self::Failed(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_length_progress() {
        let mut progress = LoadProgress::default();
        assert_eq!(progress.update(25, Some(100)), 25);
        assert_eq!(progress.update(50, Some(100)), 50);
        // Never goes backwards
        assert_eq!(progress.update(10, Some(100)), 50);
        // Full transfer still waits for decode
        assert_eq!(progress.update(100, Some(100)), IN_FLIGHT_CEILING);
        assert!(!progress.is_complete());
        progress.complete();
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_unknown_length_progress_creeps_to_ceiling() {
        let mut progress = LoadProgress::default();
        let mut last = 0;
        for _ in 0..250 {
            let now = progress.update(0, None);
            assert!(now >= last);
            assert!(now <= IN_FLIGHT_CEILING);
            last = now;
        }
        assert_eq!(last, IN_FLIGHT_CEILING);
    }

    #[test]
    fn test_zero_total_counts_as_unknown() {
        let mut progress = LoadProgress::default();
        assert_eq!(progress.update(0, Some(0)), 1);
        assert_eq!(progress.update(0, Some(0)), 2);
    }

    #[test]
    fn test_successful_state_flow() {
        let mut state = MeshLoadState::default();
        assert_eq!(state.percent(), Some(0));
        state.start();
        state.progress(512, Some(1024));
        assert_eq!(state.percent(), Some(50));
        state.ready();
        assert!(state.is_ready());
        assert_eq!(state.percent(), Some(100));

        state.fail("late error");
        assert!(state.is_ready());
    }

    #[test]
    fn test_failure_never_reports_complete() {
        let mut state = MeshLoadState::default();
        state.start();
        state.progress(1024, Some(1024));
        state.fail("decode error");

        assert_eq!(state, MeshLoadState::Failed("decode error".to_string()));
        assert_eq!(state.percent(), None);

        // No automatic recovery
        state.ready();
        state.start();
        assert!(matches!(state, MeshLoadState::Failed(_)));
    }
}
