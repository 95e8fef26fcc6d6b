/*
 * A single-shot deferred trigger for a cooperative owner loop. Arming it (again)
 * pushes the deadline out by the configured delay; the owner polls `fire_if_due`
 * from its tick and runs the deferred work when it returns true. No timer thread
 * is involved, so the deferred work always runs on the owner's thread.
 */
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /* (Re)starts the delay from `now`. */
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /* Returns true exactly once per arming, as soon as the deadline has passed. */
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /* Skips the remaining delay. Returns true if the trigger was armed. */
    pub fn fire_now(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}
