//! Scheduling port into the owning event kernel.

use crate::Ts;

/// Timer trait provides the channel access engine's view of the event
/// kernel: the current simulated instant plus a single re-armable
/// access timeout.
///
/// The engine arms at most one timeout at a time and cancels before
/// re-arming. When the deadline is reached the kernel must clear the
/// armed state first and then call `Dcf::access_timeout`, since the
/// callback may arm a replacement through this same port.
pub trait Timer {
    /// Returns the number of microsecond ticks since simulation start
    fn now_us(&self) -> Ts;

    /// Arms the access timeout `delay` microseconds from now
    fn schedule_us(&mut self, delay: Ts);

    /// Cancels the armed timeout, if any
    fn cancel(&mut self);

    /// True while an armed timeout has neither fired nor been cancelled
    fn is_scheduled(&self) -> bool;
}

#[cfg(any(test, feature="mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};

    use crate::Ts;

    #[derive(Debug, Default)]
    struct Inner {
        now: Ts,
        deadline: Option<Ts>,
    }

    /// Mock timer implementation to assist with testing
    #[derive(Clone, Debug)]
    pub struct MockTimer (Arc<Mutex<Inner>>);

    impl MockTimer {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(Inner::default())))
        }

        pub fn set_us(&mut self, val: Ts) {
            self.0.lock().unwrap().now = val;
        }

        /// Absolute deadline of the armed timeout, if any
        pub fn deadline(&self) -> Option<Ts> {
            self.0.lock().unwrap().deadline
        }

        /// Clears the armed timeout, as the kernel does when it fires
        pub fn take_deadline(&mut self) -> Option<Ts> {
            self.0.lock().unwrap().deadline.take()
        }
    }

    impl super::Timer for MockTimer {
        fn now_us(&self) -> Ts {
            self.0.lock().unwrap().now
        }

        fn schedule_us(&mut self, delay: Ts) {
            let mut inner = self.0.lock().unwrap();
            assert!(inner.deadline.is_none(), "access timeout armed twice");
            inner.deadline = Some(inner.now + delay);
        }

        fn cancel(&mut self) {
            self.0.lock().unwrap().deadline = None;
        }

        fn is_scheduled(&self) -> bool {
            self.0.lock().unwrap().deadline.is_some()
        }
    }
}
