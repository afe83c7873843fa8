//! Usage: `Mutex` extension that recovers from poisoning instead of panicking.

use std::sync::{Mutex, MutexGuard};

pub(crate) trait MutexExt<T> {
    /// Locks the mutex; a poisoned lock is recovered and logged.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    mutex_type = std::any::type_name::<T>(),
                    file = loc.file(),
                    line = loc.line(),
                    "mutex poisoned by a panicking thread; recovered, state may be stale"
                );
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lock_or_recover_returns_value() {
        let mutex = Mutex::new("signed_out");
        assert_eq!(*mutex.lock_or_recover(), "signed_out");
    }

    #[test]
    fn lock_or_recover_survives_poisoning() {
        let mutex = Arc::new(Mutex::new(0));
        let mutex_clone = Arc::clone(&mutex);

        let _ = std::thread::spawn(move || {
            let mut guard = mutex_clone.lock().unwrap();
            *guard = 7;
            panic!("poison the lock");
        })
        .join();

        assert_eq!(*mutex.lock_or_recover(), 7);
    }
}
