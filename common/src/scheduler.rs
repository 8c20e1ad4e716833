#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmitState {
    #[default]
    Idle,
    TransmitPending,
}

/// Defers the IR send until the run loop ticks. Any number of enqueues
/// before the tick collapse into one transmission.
#[derive(Debug, Clone, Default)]
pub struct TransmitScheduler {
    state: TransmitState,
}

impl TransmitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransmitState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == TransmitState::TransmitPending
    }

    pub fn enqueue(&mut self) {
        self.state = TransmitState::TransmitPending;
    }

    /// Returns true exactly once per pending transmission.
    pub fn take(&mut self) -> bool {
        match self.state {
            TransmitState::TransmitPending => {
                self.state = TransmitState::Idle;
                true
            }
            TransmitState::Idle => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueues_coalesce() {
        let mut scheduler = TransmitScheduler::new();
        scheduler.enqueue();
        scheduler.enqueue();
        scheduler.enqueue();

        assert!(scheduler.take());
        assert!(!scheduler.take());
        assert_eq!(scheduler.state(), TransmitState::Idle);
    }

    #[test]
    fn idle_tick_does_nothing() {
        let mut scheduler = TransmitScheduler::new();
        assert!(!scheduler.take());

        scheduler.enqueue();
        assert!(scheduler.is_pending());
        assert!(scheduler.take());
        scheduler.enqueue();
        assert!(scheduler.take());
    }
}
