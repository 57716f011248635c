use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// FIFO shared by every worker of a run. Cloning yields another handle to the
/// same queue.
pub struct WorkQueue<T> {
    inner: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self { WorkQueue { inner: self.inner.clone() } }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self { WorkQueue::new() }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        WorkQueue { inner: Arc::new(Mutex::new(VecDeque::new())) }
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Append many items under one lock acquisition.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) {
        self.lock().extend(items);
    }

    /// Non-blocking take. `None` means the queue is drained.
    pub fn try_take(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A worker that panicked while holding the lock cannot leave the deque
    // half-modified, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> FromIterator<T> for WorkQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        WorkQueue { inner: Arc::new(Mutex::new(iter.into_iter().collect())) }
    }
}
