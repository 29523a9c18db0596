#![allow(dead_code)]
/// A single digital input pin (mains-present sense, button, tachometer edge).
pub trait DigitalInput: Send + Sync {
    fn read(&self) -> bool;
}

/// A single digital output pin (relay/contactor drive).
pub trait DigitalOutput: Send + Sync {
    fn set(&self, level: bool);
}

#[cfg(feature = "sim")]
pub mod sim {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// An in-memory pin a test can flip directly.
    pub struct SimulatedPin {
        level: AtomicBool,
    }

    impl SimulatedPin {
        pub fn new(initial: bool) -> Self {
            Self {
                level: AtomicBool::new(initial),
            }
        }

        pub fn force(&self, level: bool) {
            self.level.store(level, Ordering::SeqCst);
        }
    }

    impl DigitalInput for SimulatedPin {
        fn read(&self) -> bool {
            self.level.load(Ordering::SeqCst)
        }
    }

    impl DigitalOutput for SimulatedPin {
        fn set(&self, level: bool) {
            self.level.store(level, Ordering::SeqCst);
        }
    }

}
