use kernel_alloc::frame_alloc::{BitmapFrameAlloc, FrameAllocError};
use kernel_info::boot::PhysicalMemoryRegion;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
use kernel_sync::SpinLock;
use std::sync::Barrier;
use std::thread;

const FRAMES: usize = 1024;
const THREADS: usize = 8;

fn regions() -> [PhysicalMemoryRegion; 1] {
    [PhysicalMemoryRegion::usable(0, FRAMES as u64 * PAGE_SIZE)]
}

/// Every thread allocates single frames until the pool is empty.
#[test]
fn concurrent_allocs_hand_out_each_frame_once() {
    let mut storage = vec![0u64; FRAMES.div_ceil(64)];
    let pmm = SpinLock::new(BitmapFrameAlloc::new(&mut storage, &regions(), &[]).unwrap());
    let start = Barrier::new(THREADS);

    let mut all: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    let mut mine = Vec::new();
                    loop {
                        match pmm.lock().alloc(1) {
                            Ok(frame) => mine.push(frame.frame_index()),
                            Err(e) => {
                                assert_eq!(e, FrameAllocError::OutOfMemory(1));
                                break;
                            }
                        }
                        thread::yield_now();
                    }
                    mine
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    all.sort_unstable();
    assert_eq!(all, (0..FRAMES).collect::<Vec<_>>());
    assert_eq!(pmm.lock().free_frames(), 0);
}

/// Frees racing with allocations keep the free count consistent.
#[test]
fn concurrent_alloc_and_free_balance() {
    let mut storage = vec![0u64; FRAMES.div_ceil(64)];
    let pmm = SpinLock::new(BitmapFrameAlloc::new(&mut storage, &regions(), &[]).unwrap());
    let start = Barrier::new(THREADS);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                start.wait();
                for _ in 0..200 {
                    let run = pmm.lock().alloc(2).unwrap();
                    assert!(!pmm.lock().is_free(run));
                    pmm.with_lock(|p| p.free(run.base(), 2)).unwrap();
                }
            });
        }
    });

    let pmm = pmm.lock();
    assert_eq!(pmm.free_frames(), FRAMES);
    assert!(pmm.is_free(PhysicalAddress::new(0).page()));
}
