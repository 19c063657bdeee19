// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Direct transfers: alignment, page pinning, stabilization and the fallbacks to buffered mode.

#![cfg(feature = "fakes")]

use std::sync::Arc;

use cowfs_io::{
    CachedPages, Credentials, Dataset, DatasetConfig, DirectPolicy, Direction, DurableStore, Error,
    FileAttributes, FileNode, Host, IoDescriptor, IoFlags, MemoryPageCache, MemoryStore,
    PagePinner, SimulatedHost, UserSegment,
};

const PAGE: usize = cowfs_io::constants::PAGE_SIZE;

fn setup(config: DatasetConfig) -> (Dataset, Arc<SimulatedHost>, Arc<MemoryStore>, Arc<FileNode>) {
    let host = Arc::new(SimulatedHost::new());
    let store = Arc::new(MemoryStore::new());
    let dataset = Dataset::builder(dyn_host(&host), Arc::clone(&store) as Arc<dyn DurableStore>)
        .with_config(config)
        .build()
        .unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();
    (dataset, host, store, file)
}

fn dyn_host(host: &Arc<SimulatedHost>) -> Arc<dyn Host> {
    Arc::clone(host) as Arc<dyn Host>
}

fn user(host: &Arc<SimulatedHost>, addr: u64, len: usize, offset: u64) -> IoDescriptor {
    IoDescriptor::user_space(dyn_host(host), vec![UserSegment::new(addr, len)], offset)
}

/// Writes one whole maximum-size block so the file's block size stops growing.
fn grow_to_max_block(dataset: &Dataset, file: &FileNode) {
    let max = dataset.config().max_block_size() as usize;
    let mut uio = IoDescriptor::kernel_space(vec![vec![0xaa; max]], 0);
    dataset
        .write(file, &mut uio, IoFlags::new(), Credentials::default())
        .unwrap();
    assert_eq!(file.block_size(), max as u64);
}

#[test]
fn misaligned_requests_are_rejected() {
    let (dataset, host, _, file) = setup(DatasetConfig::default());
    let buf = host.allocate_filled(4 * PAGE, 1);
    let direct = IoFlags::new().with_direct();

    // Memory not on a page boundary.
    let mut uio = user(&host, buf + 8, 2 * PAGE, 0);
    let result = dataset.pwrite(&file, &mut uio, direct, Credentials::default());
    assert!(matches!(result, Err(Error::Misaligned)));

    // File offset not on a page boundary.
    let mut uio = user(&host, buf, 2 * PAGE, 100);
    let result = dataset.pwrite(&file, &mut uio, direct, Credentials::default());
    assert!(matches!(result, Err(Error::Misaligned)));

    // Length not a whole number of pages.
    let mut uio = user(&host, buf, PAGE + 1, 0);
    let result = dataset.pread(&file, &mut uio, direct);
    assert!(matches!(result, Err(Error::Misaligned)));

    assert_eq!(Error::Misaligned.errno(), libc::EINVAL);
    assert_eq!(host.total_pins(), 0);
}

#[test]
fn always_policy_serves_misaligned_requests_buffered() {
    let (dataset, host, store, file) =
        setup(DatasetConfig::default().with_direct(DirectPolicy::Always));
    grow_to_max_block(&dataset, &file);

    let buf = host.allocate_filled(4 * PAGE, 2);

    let mut uio = user(&host, buf + 8, 2 * PAGE, 0);
    let n = dataset
        .pwrite(&file, &mut uio, IoFlags::new(), Credentials::default())
        .unwrap();
    assert_eq!(n, 2 * PAGE);
    assert_eq!(store.direct_writes(), 0);

    // Aligned, but shorter than a file block.
    let mut uio = user(&host, buf, 2 * PAGE, 0);
    dataset
        .pwrite(&file, &mut uio, IoFlags::new(), Credentials::default())
        .unwrap();
    assert_eq!(store.direct_writes(), 0);

    // Aligned reads are always direct.
    let mut uio = user(&host, buf, 2 * PAGE, 0);
    dataset.pread(&file, &mut uio, IoFlags::new()).unwrap();
    assert_eq!(store.direct_reads(), 1);
}

#[test]
fn disabled_policy_ignores_direct_requests() {
    let (dataset, host, store, file) =
        setup(DatasetConfig::default().with_direct(DirectPolicy::Disabled));
    grow_to_max_block(&dataset, &file);

    assert!(!dataset.check_direct_enabled(IoFlags::new().with_direct()));

    // Even misaligned requests go through.
    let buf = host.allocate_filled(2 * PAGE, 3);
    let mut uio = user(&host, buf + 1, PAGE, 1);
    dataset
        .pwrite(
            &file,
            &mut uio,
            IoFlags::new().with_direct(),
            Credentials::default(),
        )
        .unwrap();

    assert_eq!(store.direct_writes(), 0);
    assert_eq!(host.total_pins(), 0);
}

#[test]
fn short_pin_is_unsupported_and_unwinds() {
    let (dataset, host, _, file) = setup(DatasetConfig::default());
    grow_to_max_block(&dataset, &file);

    let buf = host.allocate_filled(4 * PAGE, 4);
    host.inject_short_pin(2);

    let mut uio = user(&host, buf, 4 * PAGE, 0);
    let result = dataset.pwrite(
        &file,
        &mut uio,
        IoFlags::new().with_direct(),
        Credentials::default(),
    );

    assert!(matches!(result, Err(Error::Unsupported(_))));
    assert_eq!(uio.resid(), 4 * PAGE);
    assert!(uio.pinned_pages().is_none());
    assert_eq!(host.total_pins(), 0);
    assert!(!host.any_writeback());
}

#[test]
fn unmapped_memory_fails_to_pin() {
    let (dataset, host, _, file) = setup(DatasetConfig::default());
    grow_to_max_block(&dataset, &file);

    let buf = host.allocate_filled(2 * PAGE, 4);
    host.unmap(buf, 2 * PAGE);

    let mut uio = user(&host, buf, 2 * PAGE, 0);
    let result = dataset.pwrite(
        &file,
        &mut uio,
        IoFlags::new().with_direct(),
        Credentials::default(),
    );

    assert!(matches!(result, Err(Error::MemoryFault)));
    assert_eq!(host.total_pins(), 0);
}

#[test]
fn releasing_pinned_pages_twice_is_harmless() {
    let (dataset, host, _, file) = setup(DatasetConfig::default());
    let buf = host.allocate_filled(3 * PAGE, 5);

    let mut uio = user(&host, buf, 3 * PAGE, 0);
    let mut flags = IoFlags::new().with_direct();
    assert!(dataset
        .setup_direct(&file, &mut uio, Direction::Write, &mut flags)
        .unwrap());

    assert!(uio.is_direct());
    assert!(uio.pinned_pages().is_some_and(|p| p.is_stabilized()));
    assert_eq!(host.total_pins(), 3);
    assert!(host.any_writeback());

    uio.release_pinned();
    uio.release_pinned();

    assert!(uio.pinned_pages().is_none());
    assert_eq!(host.total_pins(), 0);
    assert!(!host.any_writeback());
}

#[test]
fn merged_page_is_pinned_once() {
    let host = Arc::new(SimulatedHost::new());
    let pinner = PagePinner::new(dyn_host(&host));

    let buf = host.allocate_filled(2 * PAGE, 6);
    host.merge_pages(buf, buf + PAGE as u64);
    let page = host.translate(buf).unwrap();

    let uio = user(&host, buf, 2 * PAGE, 0);
    let mut pinned = pinner.acquire(&uio, Direction::Write).unwrap();

    assert_eq!(pinned.len(), 2);
    assert_eq!(pinned.references(page), 2);
    assert_eq!(host.pins(buf), 1);

    pinner.stabilize(&mut pinned);
    pinner.release(pinned);

    assert_eq!(host.pins(buf), 0);
    assert!(!host.any_writeback());
}

#[test]
fn untouched_buffer_is_substituted_with_private_zero_pages() {
    let (dataset, host, store, file) = setup(DatasetConfig::default());
    grow_to_max_block(&dataset, &file);

    // Never written to, so every page maps the shared zero page.
    let buf = host.allocate(4 * PAGE);

    let pinner = PagePinner::new(dyn_host(&host));
    let uio = user(&host, buf, 4 * PAGE, 0);
    let mut pinned = pinner.acquire(&uio, Direction::Write).unwrap();
    pinner.stabilize(&mut pinned);
    assert!((0..4).all(|i| pinned.is_zero_substituted(i)));
    assert_eq!(host.total_pins(), 0);
    assert_eq!(host.kernel_pages(), 4);
    let substitutes: std::collections::HashSet<_> = pinned.pages().iter().collect();
    assert_eq!(substitutes.len(), 4);
    pinner.release(pinned);
    assert_eq!(host.kernel_pages(), 0);

    let mut uio = user(&host, buf, 4 * PAGE, 0);
    let n = dataset
        .pwrite(
            &file,
            &mut uio,
            IoFlags::new().with_direct(),
            Credentials::default(),
        )
        .unwrap();
    assert_eq!(n, 4 * PAGE);
    assert_eq!(store.direct_writes(), 1);
    assert_eq!(host.kernel_pages(), 0);

    let mut uio = IoDescriptor::kernel_space(vec![vec![0xff; 4 * PAGE]], 0);
    dataset.read(&file, &mut uio, IoFlags::new()).unwrap();
    assert!(uio.kernel_buffers().unwrap()[0].iter().all(|&b| b == 0));
}

#[test]
fn first_chunk_of_block_growth_is_buffered() {
    let (dataset, host, store, file) = setup(DatasetConfig::default().with_max_block_size(4096));

    let buf = host.allocate_filled(4 * PAGE, 7);
    let mut uio = user(&host, buf, 4 * PAGE, 0);
    let n = dataset
        .pwrite(
            &file,
            &mut uio,
            IoFlags::new().with_direct(),
            Credentials::default(),
        )
        .unwrap();

    assert_eq!(n, 4 * PAGE);
    assert_eq!(file.block_size(), 4096);
    // The first chunk grew the block size through the cache, the other three went direct.
    assert_eq!(store.direct_writes(), 3);
    assert_eq!(host.total_pins(), 0);

    let mut uio = IoDescriptor::kernel_space(vec![vec![0; 4 * PAGE]], 0);
    dataset.read(&file, &mut uio, IoFlags::new()).unwrap();
    assert!(uio.kernel_buffers().unwrap()[0].iter().all(|&b| b == 7));
}

#[test]
fn mapped_range_falls_back_to_buffered() {
    let host = Arc::new(SimulatedHost::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryPageCache::new());
    let dataset = Dataset::builder(dyn_host(&host), Arc::clone(&store) as Arc<dyn DurableStore>)
        .with_cached_pages(Arc::clone(&cache) as Arc<dyn CachedPages>)
        .build()
        .unwrap();
    let file = dataset.create_file(FileAttributes::default()).unwrap();
    grow_to_max_block(&dataset, &file);

    cache.cache_page(file.object(), PAGE as u64, vec![0; PAGE]);

    let buf = host.allocate_filled(2 * PAGE, 8);
    let mut uio = user(&host, buf, 2 * PAGE, 0);
    let mut flags = IoFlags::new().with_direct();

    let direct = dataset
        .setup_direct(&file, &mut uio, Direction::Write, &mut flags)
        .unwrap();
    assert!(!direct);
    assert!(!flags.direct);
    assert_eq!(host.total_pins(), 0);

    dataset
        .pwrite(
            &file,
            &mut uio,
            IoFlags::new().with_direct(),
            Credentials::default(),
        )
        .unwrap();

    assert_eq!(store.direct_writes(), 0);
    // The mapped page sees the written bytes.
    assert!(
        cache
            .page(file.object(), PAGE as u64)
            .unwrap()
            .iter()
            .all(|&b| b == 8)
    );
}
