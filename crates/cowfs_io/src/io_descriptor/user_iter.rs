// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::{Host, IoIterator, MemoryFault, UserSegment};

/// An [`IoIterator`] over a list of caller memory ranges.
#[derive(Debug)]
pub struct UserIter {
    host: Arc<dyn Host>,
    segments: Vec<UserSegment>,
    index: usize,
    skip: usize,
    count: usize,
}

impl UserIter {
    /// Creates an iterator positioned at the first byte of `segments`.
    #[must_use]
    pub fn new(host: Arc<dyn Host>, segments: Vec<UserSegment>) -> Self {
        let count = segments.iter().map(|s| s.len).sum();

        Self {
            host,
            segments,
            index: 0,
            skip: 0,
            count,
        }
    }

    /// Calls `copy(addr, start, len)` for each piece of the next `n` bytes, advancing as pieces
    /// complete. Stops at the first fault, after advancing past the bytes it did copy.
    fn walk(
        &mut self,
        n: usize,
        mut copy: impl FnMut(&dyn crate::Host, u64, usize, usize) -> Result<(), MemoryFault>,
    ) -> usize {
        let mut done = 0;

        while done < n && self.index < self.segments.len() {
            let segment = self.segments[self.index];
            let len = (segment.len - self.skip).min(n - done);

            if len > 0 {
                let addr = segment.addr + self.skip as u64;
                match copy(self.host.as_ref(), addr, done, len) {
                    Ok(()) => {
                        self.advance(len);
                        done += len;
                    }
                    Err(fault) => {
                        let copied = fault.copied.min(len);
                        self.advance(copied);
                        return done + copied;
                    }
                }
            } else {
                self.index += 1;
                self.skip = 0;
            }
        }

        done
    }
}

impl IoIterator for UserIter {
    fn count(&self) -> usize {
        self.count
    }

    fn copy_to_iter(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.count);
        self.walk(n, |host, addr, start, len| {
            host.copy_to_user(addr, &src[start..start + len])
        })
    }

    fn copy_from_iter(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.count);
        self.walk(n, |host, addr, start, len| {
            host.copy_from_user(&mut dst[start..start + len], addr, false)
        })
    }

    fn advance(&mut self, n: usize) {
        let mut left = n.min(self.count);
        self.count -= left;

        while left > 0 && self.index < self.segments.len() {
            let step = (self.segments[self.index].len - self.skip).min(left);
            self.skip += step;
            left -= step;

            if self.skip == self.segments[self.index].len {
                self.index += 1;
                self.skip = 0;
            }
        }
    }

    fn revert(&mut self, n: usize) {
        let mut left = n;

        while left > 0 {
            if self.skip == 0 {
                if self.index == 0 {
                    break;
                }

                self.index -= 1;
                self.skip = self.segments[self.index].len;
                continue;
            }

            let step = self.skip.min(left);
            self.skip -= step;
            self.count += step;
            left -= step;
        }
    }

    fn fault_in_readable(&self, n: usize) -> Result<(), MemoryFault> {
        let mut left = n.min(self.count);
        let mut skip = self.skip;

        for segment in self.segments.iter().skip(self.index) {
            if left == 0 {
                break;
            }

            let len = (segment.len - skip).min(left);
            if len > 0 {
                self.host.fault_in_readable(segment.addr + skip as u64, len)?;
            }

            left -= len;
            skip = 0;
        }

        Ok(())
    }

    fn user_segments(&self) -> Option<Vec<UserSegment>> {
        let mut left = self.count;
        let mut skip = self.skip;
        let mut segments = Vec::new();

        for segment in self.segments.iter().skip(self.index) {
            if left == 0 {
                break;
            }

            let len = (segment.len - skip).min(left);
            if len > 0 {
                segments.push(UserSegment::new(segment.addr + skip as u64, len));
            }

            left -= len;
            skip = 0;
        }

        Some(segments)
    }
}
