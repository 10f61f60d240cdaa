use crate::errors::{HistogramError, Result};
use crate::histogram::buffer::HistogramBuffer;
use crate::types::BinsCount;
use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Histogram buffers kept in flight by default: one being binned, one being read, one spare.
pub const DEFAULT_BUFFER_POOL_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(2);

/// Pool of histogram buffers sized for one bins count.
pub type HistogramBufferPool = ResourcePool<HistogramBuffer>;

struct Shared<T> {
    available: Mutex<VecDeque<T>>,
    released: Condvar,
    capacity: usize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // Queue operations never leave the deque half-updated
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, resource: T) {
        self.lock().push_back(resource);
        self.released.notify_one();
    }
}

/// Fixed set of resources handed out one at a time.
///
/// `acquire` blocks while every resource is checked out, which bounds how many frames
/// can be in flight. Resources come back when their [`Pooled`] guard is dropped and
/// are handed out again in release order.
pub struct ResourcePool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

impl<T> ResourcePool<T> {
    pub fn new(resources: Vec<T>) -> Result<Self> {
        if resources.is_empty() {
            return Err(HistogramError::InvalidPoolSize { size: 0 });
        }
        let capacity = resources.len();
        Ok(Self {
            shared: Arc::new(Shared {
                available: Mutex::new(resources.into()),
                released: Condvar::new(),
                capacity,
            }),
        })
    }

    /// Next free resource, waiting for a release if none is available.
    pub fn acquire(&self) -> Pooled<T> {
        let mut available = self.shared.lock();
        loop {
            if let Some(resource) = available.pop_front() {
                return self.guard(resource);
            }
            available = self
                .shared
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`ResourcePool::acquire`] but gives up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Pooled<T>> {
        let deadline = Instant::now() + timeout;
        let mut available = self.shared.lock();
        loop {
            if let Some(resource) = available.pop_front() {
                return Some(self.guard(resource));
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, _) = self
                .shared
                .released
                .wait_timeout(available, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            available = guard;
        }
    }

    pub fn try_acquire(&self) -> Option<Pooled<T>> {
        let resource = self.shared.lock().pop_front()?;
        Some(self.guard(resource))
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn available(&self) -> usize {
        self.shared.lock().len()
    }

    fn guard(&self, resource: T) -> Pooled<T> {
        Pooled {
            resource: Some(resource),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl HistogramBufferPool {
    /// `size` freshly allocated buffers of `bins` bins each.
    pub fn with_buffers(size: NonZeroUsize, bins: BinsCount) -> Self {
        tracing::debug!(size = size.get(), bins = bins.get(), "allocating histogram buffer pool");
        let capacity = size.get();
        let buffers: VecDeque<_> = (0..capacity).map(|_| HistogramBuffer::new(bins)).collect();
        Self {
            shared: Arc::new(Shared {
                available: Mutex::new(buffers),
                released: Condvar::new(),
                capacity,
            }),
        }
    }
}

/// A checked-out resource; dropping it returns the resource to its pool.
pub struct Pooled<T> {
    resource: Option<T>,
    shared: Arc<Shared<T>>,
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.resource).finish()
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource is only taken on drop"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource is only taken on drop"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.shared.release(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn numbers() -> ResourcePool<u32> {
        ResourcePool::new(vec![1, 2, 3]).unwrap()
    }

    #[test]
    fn test_take_all_in_order() {
        let pool = numbers();
        let one = pool.acquire();
        let two = pool.acquire();
        let three = pool.acquire();
        assert_eq!((*one, *two, *three), (1, 2, 3));
        assert_eq!(pool.available(), 0);
        assert!(pool.try_acquire().is_none());
    }

    #[test]
    fn test_released_resource_is_handed_out_next() {
        let pool = numbers();
        let _one = pool.acquire();
        let two = pool.acquire();
        let _three = pool.acquire();

        drop(two);
        assert_eq!(*pool.acquire(), 2);
    }

    #[test]
    fn test_acquire_waits_while_pool_is_empty() {
        let pool = numbers();
        let held: Vec<_> = (0..3).map(|_| pool.acquire()).collect();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let next = pool.acquire();
                let _ = tx.send(*next);
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(pool.acquire_timeout(Duration::from_millis(20)).is_none());

        drop(held);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        waiter.join().unwrap();
    }

    #[test]
    fn test_release_unblocks_waiting_acquire() {
        let pool = numbers();
        let _one = pool.acquire();
        let _two = pool.acquire();
        let three = pool.acquire();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || *pool.acquire())
        };

        drop(three);
        assert_eq!(waiter.join().unwrap(), 3);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let err = ResourcePool::<u32>::new(Vec::new()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_POOL_SIZE");
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_histogram_buffers_are_distinct() {
        let size = NonZeroUsize::new(2).unwrap();
        let pool = HistogramBufferPool::with_buffers(size, BinsCount::new(8).unwrap());
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.cells().len(), 8 * 4);
        assert_eq!(pool.capacity(), 2);
    }
}
