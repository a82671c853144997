use kernel_sync::{OnceInitError, SyncOnceCell};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn get_is_none_until_initialized() {
    let cell = SyncOnceCell::<u32>::new();
    assert!(cell.get().is_none());
    assert!(!cell.is_initialized());
    assert_eq!(cell.try_init(|| Ok::<_, ()>(7)), Ok(&7));
    assert_eq!(cell.get(), Some(&7));
}

#[test]
fn second_try_init_is_rejected() {
    let cell = SyncOnceCell::new();
    assert_eq!(cell.try_init(|| Ok::<_, ()>(1u8)), Ok(&1));

    let mut ran = false;
    let second = cell.try_init(|| {
        ran = true;
        Ok::<_, ()>(2u8)
    });
    assert_eq!(second, Err(OnceInitError::AlreadyInitialized));
    assert!(!ran);
    assert_eq!(cell.get(), Some(&1));
}

#[test]
fn failed_try_init_leaves_cell_empty() {
    let cell = SyncOnceCell::<u8>::new();
    assert_eq!(cell.try_init(|| Err("no memory")), Err(OnceInitError::Failed("no memory")));
    assert!(!cell.is_initialized());
    assert_eq!(cell.try_init(|| Ok::<_, &str>(5)), Ok(&5));
}

#[test]
fn racing_try_init_runs_exactly_one_initializer() {
    let threads = 8;
    let cell = Arc::new(SyncOnceCell::<usize>::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let cell = Arc::clone(&cell);
            let runs = Arc::clone(&runs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                cell.try_init(|| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(i)
                })
                .is_ok()
            })
        })
        .collect();

    let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
    assert_eq!(winners, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(cell.get().is_some());
}

#[test]
fn value_is_dropped_with_cell() {
    struct Counted(Arc<AtomicUsize>);
    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    {
        let cell = SyncOnceCell::new();
        assert!(cell.try_init(|| Ok::<_, ()>(Counted(Arc::clone(&drops)))).is_ok());
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
