/// Result of moving a [`TrapCounter`] across zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The counter went from zero to one; the traps it guards must be enabled.
    Armed,
    /// The counter went from one to zero; the traps it guards must be disabled.
    Disarmed,
    Unchanged,
}

/// Reference count of the requests that want a group of traps enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrapCounter {
    count: u32,
}

impl TrapCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_active(&self) -> bool {
        self.count > 0
    }

    pub fn increment(&mut self) -> Transition {
        self.count += 1;
        if self.count == 1 {
            Transition::Armed
        } else {
            Transition::Unchanged
        }
    }

    /// Panics if the counter is already zero.
    pub fn decrement(&mut self) -> Transition {
        assert!(self.count > 0, "unbalanced trap counter decrement");
        self.count -= 1;
        if self.count == 0 {
            Transition::Disarmed
        } else {
            Transition::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_at_zero() {
        let mut counter = TrapCounter::new();
        assert!(!counter.is_active());
        assert_eq!(counter.increment(), Transition::Armed);
        assert_eq!(counter.increment(), Transition::Unchanged);
        assert_eq!(counter.count(), 2);
        assert_eq!(counter.decrement(), Transition::Unchanged);
        assert!(counter.is_active());
        assert_eq!(counter.decrement(), Transition::Disarmed);
        assert!(!counter.is_active());
    }

    #[test]
    #[should_panic]
    fn decrement_below_zero_panics() {
        TrapCounter::new().decrement();
    }
}
