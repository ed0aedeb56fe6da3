use lock_api::{Mutex, MutexGuard, RawMutex};

use crate::FsError;

/// Default try-lock budget for filesystem state mutexes.
pub const DEFAULT_LOCK_TRIES: u32 = 10_000;

/// Bounded lock acquisition: retries up to `tries` times before giving up
/// with [`FsError::Timeout`].
pub fn lock_or_timeout<'a, R: RawMutex, T>(
    mutex: &'a Mutex<R, T>,
    tries: u32,
) -> Result<MutexGuard<'a, R, T>, FsError> {
    for _ in 0..tries {
        if let Some(guard) = mutex.try_lock() {
            return Ok(guard);
        }
        core::hint::spin_loop();
    }
    Err(FsError::Timeout)
}
