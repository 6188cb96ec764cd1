//! Region pool
//!
//! A first-fit allocator over a fixed array. Task stacks (words) and queue
//! ring buffers (bytes) are carved out of a pool at creation time and given
//! back when the owner is deleted. Freed regions are kept in an
//! address-ordered hole list and coalesced with their neighbours; a hole
//! that touches the bump top is folded back into it.

use heapless::Vec;

use crate::config::CFG_POOL_FRAGMENTS_MAX;

/// A contiguous run of pool elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub const EMPTY: Region = Region { offset: 0, len: 0 };

    #[inline]
    fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Fixed-size pool of `N` elements
pub struct Pool<T: Copy, const N: usize> {
    mem: [T; N],
    top: usize,
    holes: Vec<Region, CFG_POOL_FRAGMENTS_MAX>,
}

impl<T: Copy, const N: usize> Pool<T, N> {
    pub const fn new(fill: T) -> Self {
        Pool {
            mem: [fill; N],
            top: 0,
            holes: Vec::new(),
        }
    }

    /// Forget every allocation
    pub fn reset(&mut self) {
        self.top = 0;
        self.holes.clear();
    }

    /// Allocate `len` elements, first fit
    pub fn alloc(&mut self, len: usize) -> Option<Region> {
        if len == 0 {
            return None;
        }

        if let Some(pos) = self.holes.iter().position(|h| h.len >= len) {
            let hole = self.holes[pos];
            let region = Region {
                offset: hole.offset,
                len,
            };
            if hole.len == len {
                self.holes.remove(pos);
            } else {
                self.holes[pos] = Region {
                    offset: hole.offset + len,
                    len: hole.len - len,
                };
            }
            return Some(region);
        }

        if N - self.top >= len {
            let region = Region {
                offset: self.top,
                len,
            };
            self.top += len;
            return Some(region);
        }

        None
    }

    /// Give a region back
    pub fn free(&mut self, region: Region) {
        if region.len == 0 {
            return;
        }
        debug_assert!(region.end() <= self.top);

        let pos = self
            .holes
            .iter()
            .position(|h| h.offset > region.offset)
            .unwrap_or(self.holes.len());

        let mut merged = region;

        // Merge with the following hole
        if pos < self.holes.len() && self.holes[pos].offset == merged.end() {
            merged.len += self.holes[pos].len;
            self.holes.remove(pos);
        }

        // Merge with the preceding hole
        if pos > 0 && self.holes[pos - 1].end() == merged.offset {
            let prev = &mut self.holes[pos - 1];
            prev.len += merged.len;
            merged = *prev;
            self.holes.remove(pos - 1);
            return self.reinsert(pos - 1, merged);
        }

        self.reinsert(pos, merged);
    }

    fn reinsert(&mut self, pos: usize, hole: Region) {
        if hole.end() == self.top {
            self.top = hole.offset;
            return;
        }
        if self.holes.insert(pos, hole).is_err() {
            crate::warn!("pool hole list full, {} elements leaked", hole.len);
        }
    }

    /// Elements still available
    pub fn available(&self) -> usize {
        (N - self.top) + self.holes.iter().map(|h| h.len).sum::<usize>()
    }

    #[inline]
    pub fn slice(&self, region: Region) -> &[T] {
        &self.mem[region.offset..region.end()]
    }

    #[inline]
    pub fn slice_mut(&mut self, region: Region) -> &mut [T] {
        &mut self.mem[region.offset..region.end()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_and_exhaustion() {
        let mut pool: Pool<u8, 16> = Pool::new(0);
        let a = pool.alloc(10).unwrap();
        assert_eq!(a, Region { offset: 0, len: 10 });
        assert!(pool.alloc(7).is_none());
        let b = pool.alloc(6).unwrap();
        assert_eq!(b.offset, 10);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_free_top_returns_to_bump() {
        let mut pool: Pool<u32, 32> = Pool::new(0);
        let a = pool.alloc(8).unwrap();
        let b = pool.alloc(8).unwrap();
        pool.free(b);
        pool.free(a);
        assert_eq!(pool.available(), 32);
        assert_eq!(pool.alloc(32).unwrap().offset, 0);
    }

    #[test]
    fn test_hole_reuse_first_fit() {
        let mut pool: Pool<u8, 64> = Pool::new(0);
        let a = pool.alloc(16).unwrap();
        let _b = pool.alloc(16).unwrap();
        pool.free(a);

        let c = pool.alloc(8).unwrap();
        assert_eq!(c.offset, 0);
        let d = pool.alloc(8).unwrap();
        assert_eq!(d.offset, 8);
        let e = pool.alloc(8).unwrap();
        assert_eq!(e.offset, 32);
    }

    #[test]
    fn test_coalescing() {
        let mut pool: Pool<u8, 48> = Pool::new(0);
        let a = pool.alloc(16).unwrap();
        let b = pool.alloc(16).unwrap();
        let _c = pool.alloc(16).unwrap();
        pool.free(a);
        pool.free(b);

        // Two neighbouring holes must serve a request spanning both
        let big = pool.alloc(32).unwrap();
        assert_eq!(big.offset, 0);
    }

    #[test]
    fn test_regions_do_not_alias() {
        let mut pool: Pool<u8, 8> = Pool::new(0);
        let a = pool.alloc(4).unwrap();
        let b = pool.alloc(4).unwrap();
        pool.slice_mut(a).fill(0xAA);
        pool.slice_mut(b).fill(0x55);
        assert!(pool.slice(a).iter().all(|&x| x == 0xAA));
        assert!(pool.slice(b).iter().all(|&x| x == 0x55));
    }
}
