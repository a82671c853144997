use core::{
    cell::UnsafeCell,
    fmt,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

/// 0 = UNINIT, 1 = INITING, 2 = READY
const UNINIT: u8 = 0;
const INITING: u8 = 1;
const READY: u8 = 2;

/// Failure of [`SyncOnceCell::try_init`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum OnceInitError<E> {
    /// The cell already holds a value, or another initializer is running.
    #[error("the cell is already initialized")]
    AlreadyInitialized,
    /// The initializer ran and failed; the cell is empty again.
    #[error("initialization failed: {0}")]
    Failed(E),
}

pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Returns `Some(&T)` if already initialized.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY guarantees the write is done
            Some(unsafe { self.get_unchecked() })
        } else {
            None
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Run `init` only if the cell is still empty; never waits.
    ///
    /// A second call, or a call racing with a running initializer, yields
    /// [`OnceInitError::AlreadyInitialized`] and `init` is not invoked. When
    /// `init` fails the cell returns to the empty state and may be initialized
    /// again.
    ///
    /// # Errors
    /// See [`OnceInitError`].
    pub fn try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<&T, OnceInitError<E>> {
        if !self.begin_init() {
            return Err(OnceInitError::AlreadyInitialized);
        }

        match init() {
            Ok(v) => Ok(self.publish(v)),
            Err(e) => {
                self.state.store(UNINIT, Ordering::Release);
                Err(OnceInitError::Failed(e))
            }
        }
    }

    #[inline]
    fn begin_init(&self) -> bool {
        self.state
            .compare_exchange(UNINIT, INITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn publish(&self, v: T) -> &T {
        // SAFETY: the caller won the UNINIT -> INITING transition and is the only writer.
        unsafe {
            (*self.value.get()).write(v);
        }
        // Publish value before marking READY
        self.state.store(READY, Ordering::Release);
        // SAFETY: just wrote it
        unsafe { self.get_unchecked() }
    }

    /// # Safety
    /// The state must be READY or the caller must have just written the value.
    #[inline]
    unsafe fn get_unchecked(&self) -> &T {
        unsafe { &*(*self.value.get()).as_ptr() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY means the value was written and never dropped.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SyncOnceCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => f.debug_tuple("SyncOnceCell").field(v).finish(),
            None => f.write_str("SyncOnceCell(<uninit>)"),
        }
    }
}

// Safety: shared after READY; initialization is single-writer.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
