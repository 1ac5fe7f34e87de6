//! Draining session events.

use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::GameEvent;

/// Takes the queued [`GameEvent`]s out of a session, oldest first.
///
/// Returned by [`GameSession::events`](crate::GameSession::events). Events left unread when
/// the drain is dropped are discarded with it.
///
/// ```
/// # use princess_of_fire::{GameEvent, MemoryAddr, MemoryNetwork, SessionBuilder};
/// # let network = MemoryNetwork::new();
/// # let mut session = SessionBuilder::<MemoryAddr>::new()
/// #     .start_host_session(network.socket(1))?;
/// let outcomes: Vec<_> = session
///     .events()
///     .filter_map(|event| match event {
///         GameEvent::GameOver(outcome) => Some(outcome),
///         _ => None,
///     })
///     .collect();
/// assert!(outcomes.is_empty());
/// # Ok::<(), princess_of_fire::GameError>(())
/// ```
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct EventDrain<'a> {
    inner: Drain<'a, GameEvent>,
}

impl<'a> EventDrain<'a> {
    pub(crate) fn from_drain(drain: Drain<'a, GameEvent>) -> Self {
        Self { inner: drain }
    }
}

impl Iterator for EventDrain<'_> {
    type Item = GameEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for EventDrain<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for EventDrain<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for EventDrain<'_> {}

impl std::fmt::Debug for EventDrain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventDrain {{ remaining: {} }}", self.inner.len())
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::game::PlayerType;
    use std::collections::VecDeque;

    fn queue() -> VecDeque<GameEvent> {
        VecDeque::from(vec![
            GameEvent::Connected,
            GameEvent::OpponentSelected(PlayerType::Dragon),
            GameEvent::AccelerationChanged(1),
        ])
    }

    #[test]
    fn drain_yields_all_events_in_order() {
        let mut queue = queue();
        let events: Vec<_> = EventDrain::from_drain(queue.drain(..)).collect();
        assert_eq!(
            events,
            vec![
                GameEvent::Connected,
                GameEvent::OpponentSelected(PlayerType::Dragon),
                GameEvent::AccelerationChanged(1),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn double_ended_iteration() {
        let mut queue = queue();
        let mut drain = EventDrain::from_drain(queue.drain(..));
        assert_eq!(drain.next_back(), Some(GameEvent::AccelerationChanged(1)));
        assert_eq!(drain.next(), Some(GameEvent::Connected));
        assert_eq!(drain.len(), 1);
        assert!(drain.next().is_some());
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
    }

    #[test]
    fn debug_format_shows_remaining_count() {
        let mut queue = queue();
        let drain = EventDrain::from_drain(queue.drain(..));
        assert_eq!(format!("{drain:?}"), "EventDrain { remaining: 3 }");
    }
}
