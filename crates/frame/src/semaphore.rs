use crate::FrameError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Counting semaphore bounding the number of frames submitted but not yet
/// completed by the GPU.
///
/// Acquisition blocks without a timeout: a GPU that never completes is an
/// unrecoverable fault, not something the frame loop can work around.
#[derive(Debug)]
pub struct InFlightSemaphore {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl InFlightSemaphore {
    pub fn new(capacity: usize) -> Result<Arc<Self>, FrameError> {
        if capacity == 0 {
            return Err(FrameError::ZeroCapacity);
        }
        Ok(Arc::new(Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    /// Permits currently held, i.e. frames in flight.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }

    /// Take one permit, blocking the calling thread until one is free.
    pub fn acquire(self: &Arc<Self>) -> FramePermit {
        let mut available = self.available.lock();
        if *available == 0 {
            tracing::trace!(capacity = self.capacity, "all frames in flight, waiting");
        }
        while *available == 0 {
            self.released.wait(&mut available);
        }
        *available -= 1;
        FramePermit::new(Arc::clone(self))
    }

    /// Take one permit if one is free right now.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FramePermit> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(FramePermit::new(Arc::clone(self)))
    }

    /// Block until every permit has been returned, i.e. the GPU is idle with
    /// respect to this pipeline.
    pub fn wait_idle(&self) {
        let mut available = self.available.lock();
        while *available < self.capacity {
            self.released.wait(&mut available);
        }
    }

    fn release(&self) {
        let mut available = self.available.lock();
        debug_assert!(*available < self.capacity, "permit released twice");
        *available = (*available + 1).min(self.capacity);
        drop(available);
        self.released.notify_all();
    }
}

/// One frame's claim on the in-flight budget.
///
/// Handed to the backend inside the completion handler; completing or dropping
/// it returns the permit.
#[derive(Debug)]
#[must_use = "dropping a permit immediately releases the frame slot"]
pub struct FramePermit {
    semaphore: Arc<InFlightSemaphore>,
}

impl FramePermit {
    fn new(semaphore: Arc<InFlightSemaphore>) -> Self {
        Self { semaphore }
    }

    /// Mark the frame as finished on the GPU and release the permit.
    pub fn complete(self) {
        tracing::trace!("frame completed");
    }
}

impl Drop for FramePermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    const BLOCKED: Duration = Duration::from_millis(100);
    const UNBLOCKED: Duration = Duration::from_secs(5);

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            InFlightSemaphore::new(0).unwrap_err(),
            FrameError::ZeroCapacity
        );
    }

    #[test]
    fn permits_are_counted() {
        let sem = InFlightSemaphore::new(3).unwrap();
        let a = sem.acquire();
        let b = sem.acquire();
        assert_eq!(sem.in_flight(), 2);
        assert_eq!(sem.available(), 1);
        a.complete();
        drop(b);
        assert_eq!(sem.available(), 3);
    }

    #[test]
    fn try_acquire_fails_when_exhausted() {
        let sem = InFlightSemaphore::new(2).unwrap();
        let _a = sem.try_acquire().unwrap();
        let _b = sem.try_acquire().unwrap();
        assert!(sem.try_acquire().is_none());
    }

    #[test]
    fn acquire_past_capacity_blocks_until_completion() {
        let sem = InFlightSemaphore::new(3).unwrap();
        let held: Vec<FramePermit> = (0..3).map(|_| sem.acquire()).collect();

        let (tx, rx) = crossbeam_channel::unbounded();
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                let permit = sem.acquire();
                tx.send(()).unwrap();
                permit
            })
        };

        assert!(rx.recv_timeout(BLOCKED).is_err(), "fourth acquire must block");

        let mut held = held.into_iter();
        held.next().unwrap().complete();
        rx.recv_timeout(UNBLOCKED).expect("completion unblocks the waiter");

        let permit = waiter.join().unwrap();
        assert_eq!(sem.in_flight(), 3);
        drop(permit);
        drop(held);
        assert_eq!(sem.in_flight(), 0);
    }

    #[test]
    fn one_release_unblocks_exactly_one_waiter() {
        let sem = InFlightSemaphore::new(1).unwrap();
        let first = sem.acquire();

        let (tx, rx) = crossbeam_channel::unbounded();
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let sem = Arc::clone(&sem);
                let tx = tx.clone();
                thread::spawn(move || tx.send(sem.acquire()).unwrap())
            })
            .collect();

        assert!(rx.recv_timeout(BLOCKED).is_err());

        first.complete();
        let second = rx.recv_timeout(UNBLOCKED).expect("one waiter proceeds");
        assert!(rx.recv_timeout(BLOCKED).is_err(), "the other stays blocked");

        second.complete();
        let third = rx.recv_timeout(UNBLOCKED).expect("second waiter proceeds");
        drop(third);

        for w in waiters {
            w.join().unwrap();
        }
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn release_from_another_thread() {
        let sem = InFlightSemaphore::new(1).unwrap();
        let permit = sem.acquire();
        thread::spawn(move || permit.complete()).join().unwrap();
        assert!(sem.try_acquire().is_some());
    }

    #[test]
    fn wait_idle_returns_once_all_permits_are_back() {
        let sem = InFlightSemaphore::new(2).unwrap();
        let a = sem.acquire();
        let b = sem.acquire();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            a.complete();
            thread::sleep(Duration::from_millis(20));
            b.complete();
        });
        sem.wait_idle();
        assert_eq!(sem.available(), 2);
        releaser.join().unwrap();
    }
}
