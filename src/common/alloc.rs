//! Bucket-aligned, optionally huge-page-backed memory regions.
//!
//! SIMD loads/stores in the filter bucket arrays need 32-byte-aligned
//! backing storage. On `cfg(unix)`, allocation requests large enough to be
//! huge-page aligned are attempted via `mmap(MAP_HUGETLB)` first since that
//! avoids TLB pressure on the hot insert/find path; anything smaller, or any
//! platform without that support, falls back to a standard aligned heap
//! allocation. Rust's `std::alloc::alloc` always honors the requested
//! alignment, so unlike the reference allocator there is no third
//! "unaligned, over-allocate and remember both pointers" tier.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use super::error::{FilterError, Result};

const HUGE_PAGE_SIZE: u64 = 1 << 21;

fn alignment_ok(alignment: u64) -> bool {
    alignment >= std::mem::size_of::<usize>() as u64 && (alignment & (alignment - 1)) == 0
}

fn truncate(max_bytes: u64, alignment: u64) -> u64 {
    max_bytes & !(alignment - 1)
}

/// How many bytes to request from [`alloc_at_most`] to guarantee at least
/// `exact_bytes` of usable space, given the allocator's alignment tiers.
///
/// With Rust's always-aligned `std::alloc`, this is the identity function
/// except when `exact_bytes` is already huge-page aligned, in which case it
/// is returned unchanged so the mmap path can be attempted directly.
pub fn new_alloc_request(exact_bytes: u64, _alignment: u64) -> u64 {
    exact_bytes
}

fn mmappable(max_bytes: u64, alignment: u64) -> bool {
    if !alignment_ok(alignment) || alignment > HUGE_PAGE_SIZE {
        return false;
    }
    truncate(max_bytes, HUGE_PAGE_SIZE) > 0
}

/// A contiguous, aligned, owned region of memory.
///
/// Releases its backing storage on drop via whichever primitive allocated
/// it (`munmap` for huge-page regions, `std::alloc::dealloc` otherwise).
#[derive(Debug)]
pub struct AlignedRegion {
    block: NonNull<u8>,
    block_bytes: u64,
    alignment: u64,
    huge_page: bool,
    /// Whether the OS guarantees the region arrived zeroed.
    pub zero_filled: bool,
}

// SAFETY: AlignedRegion exclusively owns its memory; no interior mutability
// or shared state is exposed, so it is safe to transfer across threads.
unsafe impl Send for AlignedRegion {}

impl AlignedRegion {
    /// Allocate a region of at most `max_bytes`, aligned to `alignment`
    /// (which must be a power of two at least `size_of::<usize>()`).
    ///
    /// # Errors
    /// Returns [`FilterError::AllocationFailure`] if no backing memory could
    /// be obtained.
    pub fn alloc_at_most(max_bytes: u64, alignment: u64) -> Result<Self> {
        debug_assert!(alignment_ok(alignment));

        #[cfg(unix)]
        if mmappable(max_bytes, alignment) {
            let bytes = truncate(max_bytes, HUGE_PAGE_SIZE);
            if let Some(region) = unix_mmap::alloc(bytes) {
                return Ok(region);
            }
            // Huge pages may be unavailable even when requested; fall
            // through to the standard aligned allocator.
        }

        let block_bytes = truncate(max_bytes, alignment);
        if block_bytes == 0 {
            return Err(FilterError::AllocationFailure {
                requested_bytes: max_bytes,
            });
        }
        let layout = Layout::from_size_align(block_bytes as usize, alignment as usize)
            .map_err(|_| FilterError::AllocationFailure {
                requested_bytes: max_bytes,
            })?;
        // SAFETY: layout has non-zero size, checked above.
        let ptr = unsafe { alloc::alloc(layout) };
        let block = NonNull::new(ptr).ok_or(FilterError::AllocationFailure {
            requested_bytes: max_bytes,
        })?;
        Ok(AlignedRegion {
            block,
            block_bytes,
            alignment,
            huge_page: false,
            zero_filled: false,
        })
    }

    /// Pointer to the start of the region.
    pub fn as_ptr(&self) -> *mut u8 {
        self.block.as_ptr()
    }

    /// Size of the region in bytes.
    pub fn len(&self) -> u64 {
        self.block_bytes
    }

    /// Whether the region is empty (it never is: `alloc_at_most` fails
    /// rather than returning a zero-length region).
    pub fn is_empty(&self) -> bool {
        self.block_bytes == 0
    }

    /// View the region as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: block is valid for block_bytes bytes for the region's lifetime.
        unsafe { std::slice::from_raw_parts(self.block.as_ptr(), self.block_bytes as usize) }
    }

    /// View the region as a mutable byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: block is valid for block_bytes bytes for the region's lifetime.
        unsafe { std::slice::from_raw_parts_mut(self.block.as_ptr(), self.block_bytes as usize) }
    }
}

impl Drop for AlignedRegion {
    fn drop(&mut self) {
        if self.huge_page {
            #[cfg(unix)]
            unix_mmap::free(self.block.as_ptr(), self.block_bytes);
            return;
        }
        // SAFETY: layout matches the one used to allocate this region.
        unsafe {
            let layout =
                Layout::from_size_align_unchecked(self.block_bytes as usize, self.alignment as usize);
            alloc::dealloc(self.block.as_ptr(), layout);
        }
    }
}

impl Clone for AlignedRegion {
    fn clone(&self) -> Self {
        let mut new_region =
            Self::alloc_at_most(self.block_bytes, self.alignment).expect("clone of a live region must be allocatable");
        new_region.as_mut_slice().copy_from_slice(self.as_slice());
        new_region
    }
}

#[cfg(unix)]
mod unix_mmap {
    use super::AlignedRegion;
    use std::ptr::NonNull;

    pub(super) fn alloc(exact_bytes: u64) -> Option<AlignedRegion> {
        if exact_bytes == 0 {
            return None;
        }
        // SAFETY: arguments are well-formed; failure is reported via MAP_FAILED.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                exact_bytes as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | huge_flag(),
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return None;
        }
        let block = NonNull::new(ptr as *mut u8)?;
        Some(AlignedRegion {
            block,
            block_bytes: exact_bytes,
            alignment: 1 << 21,
            huge_page: true,
            zero_filled: cfg!(target_os = "linux"),
        })
    }

    pub(super) fn free(ptr: *mut u8, bytes: u64) {
        // SAFETY: ptr/bytes came from a prior successful mmap in alloc().
        unsafe {
            libc::munmap(ptr as *mut libc::c_void, bytes as usize);
        }
    }

    #[cfg(target_os = "linux")]
    fn huge_flag() -> i32 {
        libc::MAP_HUGETLB
    }

    #[cfg(not(target_os = "linux"))]
    fn huge_flag() -> i32 {
        0
    }
}
