//! The tag-advance seam between the scheduler and its host.

use camshaft_core::Tag;

/// Supplied by the host; invoked by the scheduler under the global state
/// lock whenever it is quiescent (no worker busy, no reaction queued or
/// executing).
///
/// The host is expected to make progress on each call: produce work for the
/// new tag (by triggering reactions from its own threads), block until it
/// has some, or report that the stop tag has been reached.
pub trait TagAdvancer: Send {
    /// Advance to the next tag. Returns `true` iff the stop tag has been
    /// reached.
    fn advance_tag(&mut self) -> bool;
}

/// Any `FnMut() -> bool` closure can serve as the tag-advance hook.
impl<F> TagAdvancer for F
where
    F: FnMut() -> bool + Send,
{
    fn advance_tag(&mut self) -> bool {
        self()
    }
}

/// A minimal host clock that marches through microsteps at a fixed logical
/// time and stops once the configured stop tag is reached.
#[derive(Debug)]
pub struct StepClock {
    tag: Tag,
    stop_tag: Tag,
}

impl StepClock {
    pub fn new(stop_tag: Tag) -> Self {
        Self {
            tag: Tag::origin(),
            stop_tag,
        }
    }

    /// The current tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

impl TagAdvancer for StepClock {
    fn advance_tag(&mut self) -> bool {
        self.tag = self.tag.next_microstep();
        tracing::debug!(tag = %self.tag, "advanced tag");
        self.tag >= self.stop_tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_step_clock_stops_at_stop_tag() {
        let mut clock = StepClock::new(Tag::new(Duration::ZERO, 3));
        assert!(!clock.advance_tag());
        assert!(!clock.advance_tag());
        assert!(clock.advance_tag());
        assert_eq!(clock.tag(), Tag::new(Duration::ZERO, 3));
    }
}
