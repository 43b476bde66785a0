//! JIT memory: page-aligned allocations that flip between writable and
//! executable, with the cache maintenance AArch64 requires.
//!
//! Commit ordering is load-bearing: write all code bytes, data memory
//! barrier, instruction-cache invalidation over the committed range,
//! instruction synchronization barrier, then the R/W → R/X protection
//! flip. Only after all five steps is the entry pointer safe to call.
//! The aligned size is remembered separately from the requested size for
//! deallocation and permission flips.

use std::ptr;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum JitError {
    #[error("cannot allocate 0 bytes")]
    ZeroSize,
    #[error("memory already allocated")]
    AlreadyAllocated,
    #[error("no memory allocated")]
    NotAllocated,
    #[error("write of {len} bytes at offset {offset} exceeds allocation of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("mmap failed: {0}")]
    MapFailed(std::io::Error),
    #[error("mprotect failed: {0}")]
    ProtectFailed(std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Writable,
    Executable,
}

/// Owner of one executable region. Dropping unmaps it; any function
/// pointer into the region is valid only while the manager lives.
#[derive(Debug)]
pub struct JitMemoryManager {
    block: *mut u8,
    requested_size: usize,
    aligned_size: usize,
    state: State,
}

// The manager is a unique owner of its mapping; nothing aliases it.
unsafe impl Send for JitMemoryManager {}

impl JitMemoryManager {
    pub fn allocate(size: usize) -> Result<JitMemoryManager, JitError> {
        if size == 0 {
            return Err(JitError::ZeroSize);
        }
        let page = page_size();
        let aligned_size = (size + page - 1) & !(page - 1);

        let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            // Apple Silicon requires MAP_JIT for self-modifying pages.
            flags |= libc::MAP_JIT;
        }
        let block = unsafe {
            libc::mmap(
                ptr::null_mut(),
                aligned_size,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if block == libc::MAP_FAILED {
            return Err(JitError::MapFailed(std::io::Error::last_os_error()));
        }
        debug!(
            target: "jit",
            requested = size,
            aligned = aligned_size,
            base = ?block,
            "jit_pages_mapped"
        );
        Ok(JitMemoryManager {
            block: block as *mut u8,
            requested_size: size,
            aligned_size,
            state: State::Writable,
        })
    }

    pub fn base(&self) -> *const u8 {
        self.block
    }

    pub fn base_address(&self) -> u64 {
        self.block as u64
    }

    pub fn size(&self) -> usize {
        self.requested_size
    }

    pub fn aligned_size(&self) -> usize {
        self.aligned_size
    }

    pub fn is_executable(&self) -> bool {
        self.state == State::Executable
    }

    /// Copy code bytes into the writable region.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), JitError> {
        if self.state != State::Writable {
            return Err(JitError::NotAllocated);
        }
        if offset + bytes.len() > self.aligned_size {
            return Err(JitError::OutOfBounds {
                offset,
                len: bytes.len(),
                size: self.aligned_size,
            });
        }
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.block.add(offset), bytes.len());
        }
        Ok(())
    }

    /// Make the region executable. Performs the mandatory ordering: barrier,
    /// i-cache invalidation, synchronization barrier, protection flip.
    pub fn make_executable(&mut self) -> Result<(), JitError> {
        if self.state == State::Executable {
            return Ok(());
        }
        sync_caches(self.block, self.aligned_size);
        self.protect(libc::PROT_READ | libc::PROT_EXEC)?;
        self.state = State::Executable;
        trace!(target: "jit", base = ?self.block, "jit_pages_executable");
        Ok(())
    }

    /// Flip back to writable (for patching); the next `make_executable`
    /// repeats cache maintenance.
    pub fn make_writable(&mut self) -> Result<(), JitError> {
        if self.state == State::Writable {
            return Ok(());
        }
        self.protect(libc::PROT_READ | libc::PROT_WRITE)?;
        self.state = State::Writable;
        Ok(())
    }

    fn protect(&self, prot: i32) -> Result<(), JitError> {
        let rc = unsafe { libc::mprotect(self.block as *mut libc::c_void, self.aligned_size, prot) };
        if rc != 0 {
            return Err(JitError::ProtectFailed(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Read back bytes (for the commit-coherence check and tests).
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        assert!(offset + len <= self.aligned_size);
        let mut out = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping(self.block.add(offset), out.as_mut_ptr(), len);
        }
        out
    }

    /// The entry pointer for a routine at `offset`, callable once the
    /// region is executable.
    ///
    /// # Safety
    /// The bytes at `offset` must be valid AArch64 code following the C
    /// calling convention, and the region must be executable.
    pub unsafe fn entry_at(&self, offset: usize) -> unsafe extern "C" fn() -> i64 {
        debug_assert!(self.is_executable());
        debug_assert!(offset < self.aligned_size);
        unsafe { std::mem::transmute(self.block.add(offset)) }
    }
}

impl Drop for JitMemoryManager {
    fn drop(&mut self) {
        if !self.block.is_null() {
            unsafe {
                libc::munmap(self.block as *mut libc::c_void, self.aligned_size);
            }
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// dmb ish; per-line dc cvau / ic ivau; dsb ish; isb. Stale instructions
/// execute if any step is skipped.
#[cfg(target_arch = "aarch64")]
fn sync_caches(start: *mut u8, len: usize) {
    #[cfg(target_os = "macos")]
    {
        unsafe extern "C" {
            fn sys_icache_invalidate(start: *mut libc::c_void, len: libc::size_t);
        }
        unsafe {
            std::arch::asm!("dmb ish");
            sys_icache_invalidate(start as *mut libc::c_void, len);
            std::arch::asm!("isb");
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        const LINE: usize = 64;
        unsafe {
            std::arch::asm!("dmb ish");
            let mut p = (start as usize) & !(LINE - 1);
            let end = start as usize + len;
            while p < end {
                std::arch::asm!("dc cvau, {0}", in(reg) p);
                p += LINE;
            }
            std::arch::asm!("dsb ish");
            let mut p = (start as usize) & !(LINE - 1);
            while p < end {
                std::arch::asm!("ic ivau, {0}", in(reg) p);
                p += LINE;
            }
            std::arch::asm!("dsb ish");
            std::arch::asm!("isb");
        }
    }
}

#[cfg(not(target_arch = "aarch64"))]
fn sync_caches(_start: *mut u8, _len: usize) {
    // x86 hosts are coherent; nothing to do when cross-checking layout.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_page_aligned_and_zero_size_rejected() {
        assert!(matches!(
            JitMemoryManager::allocate(0),
            Err(JitError::ZeroSize)
        ));
        let m = JitMemoryManager::allocate(100).unwrap();
        assert!(m.aligned_size() >= 100);
        assert_eq!(m.aligned_size() % page_size(), 0);
        assert_eq!(m.base_address() % page_size() as u64, 0);
    }

    #[test]
    fn write_then_read_back() {
        let mut m = JitMemoryManager::allocate(64).unwrap();
        m.write(0, &[0xC0, 0x03, 0x5F, 0xD6]).unwrap(); // ret
        assert_eq!(m.read(0, 4), vec![0xC0, 0x03, 0x5F, 0xD6]);
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut m = JitMemoryManager::allocate(16).unwrap();
        let too_big = vec![0u8; m.aligned_size() + 1];
        assert!(matches!(
            m.write(0, &too_big),
            Err(JitError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn state_flips_are_idempotent() {
        let mut m = JitMemoryManager::allocate(64).unwrap();
        m.write(0, &0xD65F03C0u32.to_le_bytes()).unwrap();
        m.make_executable().unwrap();
        assert!(m.is_executable());
        m.make_executable().unwrap();
        m.make_writable().unwrap();
        assert!(!m.is_executable());
        m.make_writable().unwrap();
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn committed_ret_is_callable() {
        let mut m = JitMemoryManager::allocate(64).unwrap();
        // movz x0, #7; ret
        m.write(0, &0xD28000E0u32.to_le_bytes()).unwrap();
        m.write(4, &0xD65F03C0u32.to_le_bytes()).unwrap();
        m.make_executable().unwrap();
        let entry = unsafe { m.entry_at(0) };
        assert_eq!(unsafe { entry() }, 7);
    }
}
