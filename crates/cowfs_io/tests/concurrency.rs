// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Concurrent writers on one file, and caller memory mutated while it is being transferred.

#![cfg(feature = "fakes")]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use cowfs_io::{
    Credentials, Dataset, DurableStore, FileAttributes, FileNode, Host, IoDescriptor, IoFlags,
    MemoryStore, SimulatedHost, UserSegment,
};

const BLOCK: usize = 128 * 1024;
const BLOCKS: usize = 100;

fn setup() -> (Dataset, Arc<SimulatedHost>, Arc<MemoryStore>, Arc<FileNode>) {
    let host = Arc::new(SimulatedHost::new());
    let store = Arc::new(MemoryStore::new());
    let dataset = Dataset::builder(
        Arc::clone(&host) as Arc<dyn Host>,
        Arc::clone(&store) as Arc<dyn DurableStore>,
    )
    .build()
    .unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();
    (dataset, host, store, file)
}

/// Stores random bytes at random places of `[addr, addr + len)` until `stop` is set.
fn mutate_until(
    host: &SimulatedHost,
    addr: u64,
    len: usize,
    stop: &AtomicBool,
    stores: &AtomicUsize,
) {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let mut chunk = [0_u8; 64];

    while !stop.load(Ordering::Relaxed) {
        rng.fill(&mut chunk);
        let at = rng.usize(..len - chunk.len());
        host.store(addr + at as u64, &chunk).unwrap();
        stores.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn concurrent_appends_do_not_interleave() {
    const THREADS: usize = 4;
    const RECORDS: usize = 50;
    const RECORD: usize = 1000;

    let (dataset, _, _, file) = setup();

    thread::scope(|s| {
        for t in 0..THREADS {
            let dataset = &dataset;
            let file = &file;
            s.spawn(move || {
                for _ in 0..RECORDS {
                    let mut uio = IoDescriptor::kernel_space(vec![vec![t as u8 + 1; RECORD]], 0);
                    let n = dataset
                        .write(
                            file,
                            &mut uio,
                            IoFlags::new().with_append(),
                            Credentials::default(),
                        )
                        .unwrap();
                    assert_eq!(n, RECORD);
                }
            });
        }
    });

    let total = THREADS * RECORDS * RECORD;
    assert_eq!(file.size(), total as u64);

    let mut uio = IoDescriptor::kernel_space(vec![vec![0; total]], 0);
    assert_eq!(
        dataset.read(&file, &mut uio, IoFlags::new()).unwrap(),
        total
    );
    let data = uio.into_kernel_buffers().unwrap().remove(0);

    let mut per_thread = [0; THREADS];
    for record in data.chunks(RECORD) {
        let owner = record[0];
        assert!(record.iter().all(|&b| b == owner), "interleaved record");
        per_thread[owner as usize - 1] += 1;
    }
    assert_eq!(per_thread, [RECORDS; THREADS]);
}

#[test]
fn direct_writes_survive_racing_mutation() {
    let (dataset, host, store, file) = setup();

    // Grow the block size first so every direct write replaces whole blocks.
    let mut uio = IoDescriptor::kernel_space(vec![vec![0; BLOCK]], 0);
    dataset
        .write(&file, &mut uio, IoFlags::new(), Credentials::default())
        .unwrap();
    assert_eq!(file.block_size(), BLOCK as u64);

    let buf = host.allocate_filled(BLOCK, 0x11);
    let stop = AtomicBool::new(false);
    let stores = AtomicUsize::new(0);

    thread::scope(|s| {
        s.spawn(|| mutate_until(&host, buf, BLOCK, &stop, &stores));
        while stores.load(Ordering::Relaxed) == 0 {
            thread::yield_now();
        }

        for i in 0..BLOCKS {
            let mut uio = IoDescriptor::user_space(
                Arc::clone(&host) as Arc<dyn Host>,
                vec![UserSegment::new(buf, BLOCK)],
                (i * BLOCK) as u64,
            );
            let n = dataset
                .pwrite(
                    &file,
                    &mut uio,
                    IoFlags::new().with_direct(),
                    Credentials::default(),
                )
                .unwrap();
            assert_eq!(n, BLOCK);
        }

        stop.store(true, Ordering::Relaxed);
    });

    assert_eq!(store.direct_writes(), BLOCKS);
    assert_eq!(host.total_pins(), 0);
    assert!(!host.any_writeback());

    // Every block checksums cleanly: the data written is the data checksummed.
    for i in 0..BLOCKS {
        let mut uio = IoDescriptor::kernel_space(vec![vec![0; BLOCK]], (i * BLOCK) as u64);
        let n = dataset.read(&file, &mut uio, IoFlags::new()).unwrap();
        assert_eq!(n, BLOCK);
    }
}

#[test]
fn direct_reads_survive_racing_mutation() {
    let (dataset, host, store, file) = setup();

    for i in 0..BLOCKS {
        let mut uio = IoDescriptor::kernel_space(vec![vec![i as u8; BLOCK]], (i * BLOCK) as u64);
        dataset
            .write(&file, &mut uio, IoFlags::new(), Credentials::default())
            .unwrap();
    }

    let buf = host.allocate_filled(BLOCK, 0);
    let stop = AtomicBool::new(false);
    let stores = AtomicUsize::new(0);

    thread::scope(|s| {
        s.spawn(|| mutate_until(&host, buf, BLOCK, &stop, &stores));
        while stores.load(Ordering::Relaxed) == 0 {
            thread::yield_now();
        }

        for i in 0..BLOCKS {
            let mut uio = IoDescriptor::user_space(
                Arc::clone(&host) as Arc<dyn Host>,
                vec![UserSegment::new(buf, BLOCK)],
                (i * BLOCK) as u64,
            );
            let n = dataset
                .pread(&file, &mut uio, IoFlags::new().with_direct())
                .unwrap();
            assert_eq!(n, BLOCK);
        }

        stop.store(true, Ordering::Relaxed);
    });

    assert_eq!(store.direct_reads(), BLOCKS);
    assert_eq!(host.total_pins(), 0);
}
