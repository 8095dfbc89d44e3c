//! Recursive lock used by virtual controllers.
//!
//! The owning thread may lock again without blocking; the lock is released
//! when every guard taken by that thread has been dropped. Guards hand out
//! shared references only, so the protected value is usually a `RefCell`.

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Owner {
    thread: Option<ThreadId>,
    count: usize,
}

pub struct ReentrantMutex<T> {
    owner: Mutex<Owner>,
    released: Condvar,
    data: T,
}

// Only the owning thread can reach `data`, one thread at a time.
unsafe impl<T: Send> Send for ReentrantMutex<T> {}
unsafe impl<T: Send> Sync for ReentrantMutex<T> {}

impl<T> ReentrantMutex<T> {
    pub fn new(data: T) -> Self {
        Self {
            owner: Mutex::new(Owner::default()),
            released: Condvar::new(),
            data,
        }
    }

    fn owner(&self) -> MutexGuard<'_, Owner> {
        self.owner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until the calling thread owns the lock.
    pub fn lock(&self) -> ReentrantMutexGuard<'_, T> {
        let me = thread::current().id();
        let mut owner = self.owner();
        loop {
            match owner.thread {
                Some(thread) if thread == me => {
                    owner.count += 1;
                    break;
                }
                None => {
                    owner.thread = Some(me);
                    owner.count = 1;
                    break;
                }
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            }
        }
        ReentrantMutexGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Current recursion depth held by the calling thread.
    #[cfg(test)]
    fn depth(&self) -> usize {
        let owner = self.owner();
        match owner.thread {
            Some(thread) if thread == thread::current().id() => owner.count,
            _ => 0,
        }
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReentrantMutexGuard<'a, T> {
    lock: &'a ReentrantMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for ReentrantMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.lock.data
    }
}

impl<T> Drop for ReentrantMutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut owner = self.lock.owner();
        owner.count = owner.count.saturating_sub(1);
        if owner.count == 0 {
            owner.thread = None;
            drop(owner);
            self.lock.released.notify_one();
        }
    }
}
