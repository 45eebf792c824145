//! Counting semaphore bounding simultaneous expensive oracle calls.
//!
//! Waiters are served strictly in arrival order: each acquire takes a ticket
//! and sleeps until its ticket reaches the head of the queue with a permit
//! free. Release wakes the oldest waiter.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct LimiterState {
    permits: usize,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

/// FIFO counting semaphore.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    state: Mutex<LimiterState>,
    available: Condvar,
}

impl ConcurrencyLimiter {
    /// A limiter with `permits` slots. Zero is clamped to one: a limiter that
    /// can never admit a caller only deadlocks.
    pub fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                permits: permits.max(1),
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Block until a slot frees, honoring arrival order.
    pub fn acquire(&self) -> Permit<'_> {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);

        while !(state.permits > 0 && state.queue.front() == Some(&ticket)) {
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.queue.pop_front();
        state.permits -= 1;
        Permit { limiter: self }
    }

    /// Slots currently free.
    pub fn available_permits(&self) -> usize {
        self.lock().permits
    }

    /// Callers currently blocked in [`acquire`](Self::acquire).
    pub fn waiters(&self) -> usize {
        self.lock().queue.len()
    }

    fn release(&self) {
        let mut state = self.lock();
        state.permits += 1;
        drop(state);
        // Every waiter re-checks; only the queue head proceeds.
        self.available.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII slot handle; dropping it frees the slot and wakes the oldest waiter.
#[derive(Debug)]
pub struct Permit<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_and_release_track_permits() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.acquire();
        let b = limiter.acquire();
        assert_eq!(limiter.available_permits(), 0);
        drop(a);
        assert_eq!(limiter.available_permits(), 1);
        drop(b);
        assert_eq!(limiter.available_permits(), 2);
    }

    #[test]
    fn zero_permits_clamps_to_one() {
        let limiter = ConcurrencyLimiter::new(0);
        let permit = limiter.acquire();
        assert_eq!(limiter.available_permits(), 0);
        drop(permit);
        assert_eq!(limiter.available_permits(), 1);
    }

    /// Two waiters queued in a known order are served in that order.
    #[test]
    fn waiters_are_served_fifo() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1));
        let served: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let held = limiter.acquire();

        let spawn_waiter = |name: &'static str| {
            let limiter = Arc::clone(&limiter);
            let served = Arc::clone(&served);
            thread::spawn(move || {
                let _permit = limiter.acquire();
                served.lock().expect("served").push(name);
            })
        };

        let first = spawn_waiter("first");
        wait_for_waiters(&limiter, 1);
        let second = spawn_waiter("second");
        wait_for_waiters(&limiter, 2);

        drop(held);
        first.join().expect("first joins");
        second.join().expect("second joins");

        assert_eq!(*served.lock().expect("served"), vec!["first", "second"]);
    }

    #[test]
    fn ceiling_is_never_exceeded_under_contention() {
        let limiter = Arc::new(ConcurrencyLimiter::new(3));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let _permit = limiter.acquire();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker joins");
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.available_permits(), 3);
    }

    fn wait_for_waiters(limiter: &ConcurrencyLimiter, count: usize) {
        for _ in 0..200 {
            if limiter.waiters() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("waiters never reached {count}");
    }
}
