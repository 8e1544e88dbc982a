//! Transition duration of a keyframe

use std::time::Duration;

use crate::config::PlaybackConfig;
use crate::types::KeyFrame;

/// Decides how long the transition into a frame takes.
///
/// The first frame of a session gets a fixed duration. Later frames take
/// the gap to the next buffered frame, or the gap from the previous frame
/// when nothing is buffered yet. Every result is floored at `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationPolicy {
    pub first: Duration,
    pub min: Duration,
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self { first: Duration::from_millis(1_000), min: Duration::from_millis(100) }
    }
}

impl From<&PlaybackConfig> for DurationPolicy {
    fn from(config: &PlaybackConfig) -> Self {
        Self { first: config.first_frame_duration(), min: config.min_frame_duration() }
    }
}

impl DurationPolicy {
    pub fn transition_duration(
        &self,
        last: Option<&KeyFrame>,
        current: &KeyFrame,
        next: Option<&KeyFrame>,
    ) -> Duration {
        let Some(last) = last else {
            return self.first;
        };
        let gap_ms = match next {
            Some(next) => next.time.saturating_sub(current.time),
            None => current.time.saturating_sub(last.time),
        };
        Duration::from_millis(gap_ms).max(self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(time: u64) -> KeyFrame {
        KeyFrame::new(time, time, vec![0.0])
    }

    #[test]
    fn first_frame_uses_fixed_duration() {
        let policy = DurationPolicy::default();
        assert_eq!(policy.transition_duration(None, &frame(5_000), None), Duration::from_secs(1));
        assert_eq!(
            policy.transition_duration(None, &frame(0), Some(&frame(10))),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn buffered_next_frame_sets_the_pace() {
        let policy = DurationPolicy::default();
        let duration = policy.transition_duration(Some(&frame(0)), &frame(100), Some(&frame(350)));
        assert_eq!(duration, Duration::from_millis(250));
    }

    #[test]
    fn without_next_the_previous_gap_is_used() {
        let policy = DurationPolicy::default();
        let duration = policy.transition_duration(Some(&frame(400)), &frame(700), None);
        assert_eq!(duration, Duration::from_millis(300));
    }

    #[test]
    fn short_gaps_are_floored() {
        let policy = DurationPolicy::default();
        let duration = policy.transition_duration(Some(&frame(950)), &frame(1_000), None);
        assert_eq!(duration, Duration::from_millis(100));
        let equal = policy.transition_duration(Some(&frame(0)), &frame(100), Some(&frame(100)));
        assert_eq!(equal, Duration::from_millis(100));
    }

    #[test]
    fn follows_configuration() {
        let config = PlaybackConfig { first_frame_duration_ms: 500, min_frame_duration_ms: 20, ..Default::default() };
        let policy = DurationPolicy::from(&config);
        assert_eq!(policy.transition_duration(None, &frame(0), None), Duration::from_millis(500));
        assert_eq!(
            policy.transition_duration(Some(&frame(0)), &frame(10), None),
            Duration::from_millis(20)
        );
    }

    proptest! {
        #[test]
        fn duration_is_never_below_floor(
            last in 0u64..10_000,
            current in 0u64..10_000,
            next in proptest::option::of(0u64..10_000),
        ) {
            let policy = DurationPolicy::default();
            let next = next.map(frame);
            let duration = policy.transition_duration(Some(&frame(last)), &frame(current), next.as_ref());
            prop_assert!(duration >= policy.min);
        }

        #[test]
        fn first_frame_ignores_its_time(current in any::<u64>(), next in proptest::option::of(any::<u64>())) {
            let policy = DurationPolicy::default();
            let next = next.map(frame);
            prop_assert_eq!(policy.transition_duration(None, &frame(current), next.as_ref()), policy.first);
        }

        #[test]
        fn gap_above_floor_is_exact(current in 0u64..100_000, gap in 100u64..10_000) {
            let policy = DurationPolicy::default();
            let duration = policy.transition_duration(
                Some(&frame(0)),
                &frame(current),
                Some(&frame(current + gap)),
            );
            prop_assert_eq!(duration, Duration::from_millis(gap));
        }
    }
}
