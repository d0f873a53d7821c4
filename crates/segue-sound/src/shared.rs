//! Size lock / resize lock discipline for a sound shared between threads.
//!
//! Any number of threads may hold the size lock; they may read and overwrite
//! samples but never change length. The resize lock is exclusive and is
//! the only way to reach `&mut Sound`, so structural edits cannot run while
//! someone holds a size lock. A thread asking for one kind of lock while it
//! holds the other gets [`Error::LockDiscipline`] instead of a deadlock.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::sound::Sound;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Size(usize),
    Resize,
}

type Holders = Mutex<HashMap<ThreadId, Hold>>;

struct Shared {
    sound: RwLock<Sound>,
    holders: Holders,
}

/// A [`Sound`] behind size and resize locks. Cloning shares the sound.
#[derive(Clone)]
pub struct SharedSound {
    inner: Arc<Shared>,
}

impl SharedSound {
    /// Wraps `sound` for sharing.
    pub fn new(sound: Sound) -> Self {
        Self {
            inner: Arc::new(Shared {
                sound: RwLock::new(sound),
                holders: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the sound if this is the last handle.
    pub fn try_unwrap(self) -> std::result::Result<Sound, Self> {
        Arc::try_unwrap(self.inner)
            .map(|shared| shared.sound.into_inner())
            .map_err(|inner| Self { inner })
    }

    fn current(&self) -> Option<Hold> {
        self.inner
            .holders
            .lock()
            .get(&thread::current().id())
            .copied()
    }

    fn size_guard<'a>(&'a self, guard: RwLockReadGuard<'a, Sound>) -> SizeGuard<'a> {
        let mut holders = self.inner.holders.lock();
        let hold = holders
            .entry(thread::current().id())
            .or_insert(Hold::Size(0));
        if let Hold::Size(n) = hold {
            *n += 1;
        }
        SizeGuard {
            guard,
            holders: &self.inner.holders,
        }
    }

    fn resize_guard<'a>(&'a self, guard: RwLockWriteGuard<'a, Sound>) -> ResizeGuard<'a> {
        self.inner
            .holders
            .lock()
            .insert(thread::current().id(), Hold::Resize);
        ResizeGuard {
            guard,
            holders: &self.inner.holders,
        }
    }

    /// Acquires a size lock, blocking while a resize lock is held.
    ///
    /// Re-entrant on the same thread.
    pub fn lock_size(&self) -> Result<SizeGuard<'_>> {
        let guard = match self.current() {
            Some(Hold::Resize) => {
                return Err(Error::LockDiscipline(
                    "size lock requested while holding the resize lock".into(),
                ));
            }
            Some(Hold::Size(_)) => self.inner.sound.read_recursive(),
            None => self.inner.sound.read(),
        };
        Ok(self.size_guard(guard))
    }

    /// Acquires a size lock if no resize lock is held or pending.
    pub fn try_lock_size(&self) -> Result<Option<SizeGuard<'_>>> {
        let guard = match self.current() {
            Some(Hold::Resize) => {
                return Err(Error::LockDiscipline(
                    "size lock requested while holding the resize lock".into(),
                ));
            }
            Some(Hold::Size(_)) => self.inner.sound.try_read_recursive(),
            None => self.inner.sound.try_read(),
        };
        Ok(guard.map(|g| self.size_guard(g)))
    }

    fn check_resize(&self) -> Result<()> {
        match self.current() {
            Some(Hold::Size(_)) => Err(Error::LockDiscipline(
                "resize lock requested while holding a size lock".into(),
            )),
            Some(Hold::Resize) => Err(Error::LockDiscipline(
                "resize lock is not re-entrant".into(),
            )),
            None => Ok(()),
        }
    }

    /// Acquires the resize lock, blocking until every size lock is released.
    pub fn lock_for_resize(&self) -> Result<ResizeGuard<'_>> {
        self.check_resize()?;
        let guard = self.inner.sound.write();
        Ok(self.resize_guard(guard))
    }

    /// Acquires the resize lock if nobody holds any lock.
    pub fn try_lock_for_resize(&self) -> Result<Option<ResizeGuard<'_>>> {
        self.check_resize()?;
        Ok(self
            .inner
            .sound
            .try_write()
            .map(|g| self.resize_guard(g)))
    }
}

impl std::fmt::Debug for SharedSound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSound")
            .field("holders", &self.inner.holders.lock().len())
            .finish_non_exhaustive()
    }
}

/// Shared access to a [`Sound`]. Unlocks on drop.
pub struct SizeGuard<'a> {
    guard: RwLockReadGuard<'a, Sound>,
    holders: &'a Holders,
}

impl Deref for SizeGuard<'_> {
    type Target = Sound;

    fn deref(&self) -> &Sound {
        &self.guard
    }
}

impl Drop for SizeGuard<'_> {
    fn drop(&mut self) {
        let mut holders = self.holders.lock();
        let id = thread::current().id();
        if let Some(Hold::Size(n)) = holders.get_mut(&id) {
            *n -= 1;
            if *n == 0 {
                holders.remove(&id);
            }
        }
    }
}

/// Exclusive access to a [`Sound`]. Unlocks on drop.
pub struct ResizeGuard<'a> {
    guard: RwLockWriteGuard<'a, Sound>,
    holders: &'a Holders,
}

impl Deref for ResizeGuard<'_> {
    type Target = Sound;

    fn deref(&self) -> &Sound {
        &self.guard
    }
}

impl DerefMut for ResizeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Sound {
        &mut self.guard
    }
}

impl Drop for ResizeGuard<'_> {
    fn drop(&mut self) {
        self.holders.lock().remove(&thread::current().id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NO_MAX_LENGTH;
    use segue_config::EngineConfig;
    use tempfile::TempDir;

    fn shared(dir: &TempDir) -> SharedSound {
        SharedSound::new(
            Sound::create(dir.path().join("x.seg"), 1, 8000, 100, &EngineConfig::default())
                .unwrap(),
        )
    }

    #[test]
    fn size_lock_is_reentrant() {
        let dir = TempDir::new().unwrap();
        let s = shared(&dir);
        let a = s.lock_size().unwrap();
        let b = s.lock_size().unwrap();
        assert_eq!(a.length().unwrap(), b.length().unwrap());
        drop(a);
        assert!(s.lock_for_resize().is_err());
        drop(b);
        assert!(s.lock_for_resize().is_ok());
    }

    #[test]
    fn mixing_lock_kinds_on_one_thread_is_an_error() {
        let dir = TempDir::new().unwrap();
        let s = shared(&dir);
        let size = s.lock_size().unwrap();
        assert!(matches!(s.lock_for_resize(), Err(Error::LockDiscipline(_))));
        assert!(matches!(
            s.try_lock_for_resize(),
            Err(Error::LockDiscipline(_))
        ));
        drop(size);

        let _resize = s.lock_for_resize().unwrap();
        assert!(matches!(s.lock_size(), Err(Error::LockDiscipline(_))));
        assert!(matches!(s.lock_for_resize(), Err(Error::LockDiscipline(_))));
    }

    #[test]
    fn resize_waits_for_other_threads_size_lock() {
        let dir = TempDir::new().unwrap();
        let s = shared(&dir);
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let recorder = {
            let s = s.clone();
            std::thread::spawn(move || {
                let guard = s.lock_size().unwrap();
                guard.get_audio(0).unwrap().set(5, 0.5).unwrap();
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };

        held_rx.recv().unwrap();
        assert!(s.try_lock_for_resize().unwrap().is_none());
        release_tx.send(()).unwrap();
        recorder.join().unwrap();

        let mut guard = s.try_lock_for_resize().unwrap().unwrap();
        guard
            .add_space(&[true], 0, 10, true, NO_MAX_LENGTH)
            .unwrap();
        assert_eq!(guard.length().unwrap(), 110);
        assert_eq!(guard.get_audio(0).unwrap().get(15).unwrap(), 0.5);
        drop(guard);
        assert!(s.try_unwrap().is_ok());
    }
}
