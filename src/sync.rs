/*!
Counting semaphore built on `Mutex` + `Condvar`.

Purpose
- The simulator uses semaphores in two roles: counting slots on the bounded
  submission buffer (`empty_slots` / `filled_slots`) and readiness
  signalling for the logger and interrupt queues.
- Hot paths only ever use `try_wait`, so no worker blocks while holding
  another lock. The single uncapped `wait` lives in the logger worker,
  which owns no other lock at that point.

Notes
- `post` never blocks and never fails; the count is unbounded on purpose
  (readiness posts may outnumber queued items during shutdown).
*/

use std::sync::{Condvar, Mutex};

#[derive(Debug)]
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Increment the count and wake one waiter.
    pub fn post(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count += 1;
        self.cond.notify_one();
    }

    /// Block until the count is positive, then decrement it.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count == 0 {
            count = self
                .cond
                .wait(count)
                .unwrap_or_else(|e| e.into_inner());
        }
        *count -= 1;
    }

    /// Decrement the count if it is positive. Returns whether a unit was
    /// acquired. Never blocks.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub fn value(&self) -> usize {
        *self.count.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn try_wait_on_empty_fails() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_wait());
    }

    #[test]
    fn try_wait_counts_down() {
        let sem = Semaphore::new(2);
        assert!(sem.try_wait());
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
    }

    #[test]
    fn post_wakes_blocked_waiter() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.wait())
        };
        sem.post();
        waiter.join().expect("waiter should not panic");
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn post_then_try_wait_succeeds() {
        let sem = Semaphore::new(0);
        sem.post();
        sem.post();
        assert!(sem.try_wait());
        assert_eq!(sem.value(), 1);
    }
}
