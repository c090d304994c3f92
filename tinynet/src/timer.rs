//! Named one-shot and reloading timers driven by elapsed-time ticks.
//!
//! The list does not call anything when a timer expires. [`Timers::check_tmo`] returns the events
//! that became due and the owner dispatches them. Events name their target by value (usually a
//! generation-checked key), so an event for a record that was freed in the meantime is simply
//! ignored by the dispatcher.
//!
//! [`Timers::check_tmo`]: struct.Timers.html#method.check_tmo

/// A list of pending timers, ordered by remaining time.
#[derive(Debug)]
pub struct Timers<E> {
    list: Vec<Timer<E>>,
}

#[derive(Debug)]
struct Timer<E> {
    name: &'static str,
    event: E,
    /// Milliseconds until expiry.
    remaining: u64,
    /// Period to re-arm with after expiry.
    reload: Option<u64>,
}

impl<E: Clone + PartialEq> Timers<E> {
    pub fn new() -> Self {
        Timers { list: Vec::new() }
    }

    /// Arm a timer expiring in `ms` milliseconds.
    ///
    /// A timer already armed for the same event is replaced. With `reload`, the timer re-arms
    /// itself with the same period each time it fires.
    pub fn add(&mut self, name: &'static str, event: E, ms: u64, reload: bool) {
        self.remove(&event);
        net_trace!("timer {} armed for {}ms", name, ms);
        self.insert(Timer {
            name,
            event,
            remaining: ms,
            reload: if reload { Some(ms) } else { None },
        });
    }

    fn insert(&mut self, timer: Timer<E>) {
        // Keep insertion order among timers with the same deadline.
        let at = self.list
            .iter()
            .position(|other| other.remaining > timer.remaining)
            .unwrap_or(self.list.len());
        self.list.insert(at, timer);
    }

    /// Disarm the timer for `event`, returns whether one was armed.
    pub fn remove(&mut self, event: &E) -> bool {
        match self.list.iter().position(|timer| timer.event == *event) {
            Some(idx) => {
                let timer = self.list.remove(idx);
                net_trace!("timer {} removed", timer.name);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, event: &E) -> bool {
        self.list.iter().any(|timer| timer.event == *event)
    }

    /// Milliseconds left on the timer for `event`.
    pub fn remaining(&self, event: &E) -> Option<u64> {
        self.list.iter().find(|timer| timer.event == *event).map(|timer| timer.remaining)
    }

    /// Account for `diff` elapsed milliseconds and collect every event that became due.
    ///
    /// Events are returned in expiry order. Reloading timers are re-armed before returning, a
    /// dispatcher may remove or replace them.
    pub fn check_tmo(&mut self, diff: u64) -> Vec<E> {
        let mut fired = Vec::new();
        let mut reloaded = Vec::new();
        let mut pending = Vec::with_capacity(self.list.len());
        for mut timer in self.list.drain(..) {
            if timer.remaining > diff {
                timer.remaining -= diff;
                pending.push(timer);
                continue;
            }
            net_trace!("timer {} expired", timer.name);
            fired.push(timer.event.clone());
            if let Some(period) = timer.reload {
                timer.remaining = period;
                reloaded.push(timer);
            }
        }
        self.list = pending;
        for timer in reloaded {
            self.insert(timer);
        }
        fired
    }

    /// Milliseconds until the earliest timer expires.
    pub fn first_tmo(&self) -> Option<u64> {
        self.list.first().map(|timer| timer.remaining)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<E: Clone + PartialEq> Default for Timers<E> {
    fn default() -> Self {
        Timers::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_order() {
        let mut timers = Timers::new();
        timers.add("late", 2, 300, false);
        timers.add("early", 1, 100, false);
        assert_eq!(timers.first_tmo(), Some(100));

        assert_eq!(timers.check_tmo(50), Vec::<u32>::new());
        assert_eq!(timers.first_tmo(), Some(50));
        assert_eq!(timers.check_tmo(500), vec![1, 2]);
        assert!(timers.is_empty());
        assert_eq!(timers.first_tmo(), None);
    }

    #[test]
    fn reload_rearms() {
        let mut timers = Timers::new();
        timers.add("tick", 'd', 1000, true);
        assert_eq!(timers.check_tmo(1000), vec!['d']);
        assert_eq!(timers.remaining(&'d'), Some(1000));
        assert_eq!(timers.check_tmo(999), Vec::<char>::new());
        assert_eq!(timers.check_tmo(1), vec!['d']);
        assert!(timers.remove(&'d'));
        assert!(!timers.remove(&'d'));
    }

    #[test]
    fn add_replaces() {
        let mut timers = Timers::new();
        timers.add("rto", 7u8, 1000, false);
        timers.add("rto", 7u8, 2000, false);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.check_tmo(1500), Vec::<u8>::new());
        assert_eq!(timers.check_tmo(500), vec![7]);
    }
}
