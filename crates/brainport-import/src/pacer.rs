use std::time::Duration;

/// Fixed-rate throttle applied after every remote call.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Never waits; counts pauses so tests can assert on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacer {
    pub pauses: usize,
}

impl Pacer for NoPacer {
    fn pause(&mut self, _delay: Duration) {
        self.pauses += 1;
    }
}
