// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use mockall::mock;

use crate::{Host, MemoryFault, PageId, PageKind};

mock! {
    #[derive(Debug)]
    pub Host { }

    impl Host for Host {
        fn copy_from_user(
            &self,
            dst: &mut [u8],
            addr: u64,
            nofault: bool,
        ) -> Result<(), MemoryFault>;
        fn copy_to_user(&self, addr: u64, src: &[u8]) -> Result<(), MemoryFault>;
        fn fault_in_readable(&self, addr: u64, len: usize) -> Result<(), MemoryFault>;
        fn pin_user_pages(
            &self,
            addr: u64,
            count: usize,
            write: bool,
        ) -> Result<Vec<PageId>, MemoryFault>;
        fn unpin_page(&self, page: PageId);
        fn page_kind(&self, page: PageId) -> PageKind;
        fn alloc_zeroed_page(&self) -> PageId;
        fn free_page(&self, page: PageId);
        fn lock_page(&self, page: PageId);
        fn unlock_page(&self, page: PageId);
        fn wait_on_writeback(&self, page: PageId);
        fn clear_page_dirty_for_io(&self, page: PageId) -> bool;
        fn set_page_writeback(&self, page: PageId);
        fn end_page_writeback(&self, page: PageId);
        fn read_page(&self, page: PageId, offset: usize, dst: &mut [u8]);
        fn write_page(&self, page: PageId, offset: usize, src: &[u8]);
    }
}
