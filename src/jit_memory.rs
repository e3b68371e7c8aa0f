use std::os::unix::io::RawFd;
use std::ptr;

use crate::error::JitError;

/// One memfd mapped twice: a writable view for loading code and an
/// executable view for running it. Neither view is ever both.
pub struct DualMappedMemory {
    rw_ptr: *mut u8,
    rx_ptr: *const u8,
    size: usize,
    fd: RawFd,
}

impl DualMappedMemory {
    pub fn new(size: usize) -> Result<Self, JitError> {
        let size = size.max(1);
        unsafe {
            let fd = libc::memfd_create(b"irforge_jit\0".as_ptr() as *const libc::c_char, libc::MFD_CLOEXEC);
            if fd < 0 {
                return Err(JitError::Memory("memfd_create failed".to_string()));
            }

            if libc::ftruncate(fd, size as libc::off_t) < 0 {
                libc::close(fd);
                return Err(JitError::Memory("ftruncate failed".to_string()));
            }

            let rw_ptr = libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if rw_ptr == libc::MAP_FAILED {
                libc::close(fd);
                return Err(JitError::Memory("mmap RW failed".to_string()));
            }

            let rx_ptr = libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_EXEC,
                libc::MAP_SHARED,
                fd,
                0,
            );
            if rx_ptr == libc::MAP_FAILED {
                libc::munmap(rw_ptr, size);
                libc::close(fd);
                return Err(JitError::Memory("mmap RX failed".to_string()));
            }

            Ok(DualMappedMemory {
                rw_ptr: rw_ptr as *mut u8,
                rx_ptr: rx_ptr as *const u8,
                size,
                fd,
            })
        }
    }

    /// Copies `code` to the start of the region and makes it visible to
    /// instruction fetch.
    pub fn load(&self, code: &[u8]) -> Result<(), JitError> {
        if code.len() > self.size {
            return Err(JitError::Memory(format!(
                "{} bytes of code do not fit in {} bytes",
                code.len(),
                self.size
            )));
        }
        unsafe {
            ptr::copy_nonoverlapping(code.as_ptr(), self.rw_ptr, code.len());
        }
        self.flush_icache();
        Ok(())
    }

    /// x86 keeps instruction and data caches coherent; draining the store
    /// buffer is enough.
    fn flush_icache(&self) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            std::arch::asm!("mfence", options(nostack));
        }
    }

    /// Executable address of byte `offset`.
    pub fn entry(&self, offset: usize) -> Option<*const u8> {
        (offset < self.size).then(|| self.rx_ptr.wrapping_add(offset))
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for DualMappedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.rw_ptr as *mut _, self.size);
            libc::munmap(self.rx_ptr as *mut _, self.size);
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_execute() {
        // mov eax, 42; ret
        let code = [0xb8, 0x2a, 0x00, 0x00, 0x00, 0xc3];
        let memory = DualMappedMemory::new(4096).unwrap();
        memory.load(&code).unwrap();
        let entry = memory.entry(0).unwrap();
        let f: extern "C" fn() -> i64 = unsafe { std::mem::transmute(entry) };
        assert_eq!(f() & 0xffff_ffff, 42);
    }

    #[test]
    fn test_oversized_load_is_rejected() {
        let memory = DualMappedMemory::new(16).unwrap();
        assert!(matches!(memory.load(&[0x90; 32]), Err(JitError::Memory(_))));
        assert!(memory.entry(16).is_none());
    }
}
