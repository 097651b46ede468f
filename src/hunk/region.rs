use std::io;
use std::ptr::{self, NonNull};

use crate::{Error, ErrorKind, Result};

/// OSから取得した、ゼロ初期化済みの生のメモリ領域.
///
/// Unix系OSでは匿名`mmap`を、それ以外では`std::alloc::alloc_zeroed`を用いて確保される.
/// 破棄時にOSに返却される.
#[derive(Debug)]
pub(crate) struct RawRegion {
    ptr: NonNull<u8>,
    len: usize,
}
unsafe impl Send for RawRegion {}
unsafe impl Sync for RawRegion {}
impl RawRegion {
    #[cfg(unix)]
    pub fn map(len: usize) -> Result<Self> {
        track_assert!(len > 0, ErrorKind::InvalidInput);
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(track!(Error::from(io::Error::last_os_error()); len));
        }
        let ptr = track_assert_some!(NonNull::new(ptr as *mut u8), ErrorKind::Other);
        Ok(RawRegion { ptr, len })
    }

    #[cfg(not(unix))]
    pub fn map(len: usize) -> Result<Self> {
        track_assert!(len > 0, ErrorKind::InvalidInput);
        let layout = track!(Self::layout(len))?;
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = track_assert_some!(
            NonNull::new(ptr),
            ErrorKind::Other,
            "Cannot allocate {} bytes",
            len
        );
        Ok(RawRegion { ptr, len })
    }

    #[cfg(not(unix))]
    fn layout(len: usize) -> Result<std::alloc::Layout> {
        std::alloc::Layout::from_size_align(len, page_size())
            .map_err(|e| track!(Error::from(io::Error::new(io::ErrorKind::InvalidInput, e))))
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }
}
impl Drop for RawRegion {
    #[cfg(unix)]
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {
        if let Ok(layout) = Self::layout(self.len) {
            unsafe { std::alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

/// OSのページサイズを返す.
#[cfg(unix)]
pub(crate) fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 && (size as usize).is_power_of_two() {
        size as usize
    } else {
        DEFAULT_PAGE_SIZE
    }
}

/// OSのページサイズを返す.
#[cfg(not(unix))]
pub(crate) fn page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// 現在利用可能な物理メモリのバイト数を返す.
///
/// 取得できない環境では`None`が返される.
#[cfg(target_os = "linux")]
pub(crate) fn available_memory() -> Option<u64> {
    let pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };
    if pages > 0 {
        Some(pages as u64 * page_size() as u64)
    } else {
        None
    }
}

/// 現在利用可能な物理メモリのバイト数を返す.
///
/// 取得できない環境では`None`が返される.
#[cfg(not(target_os = "linux"))]
pub(crate) fn available_memory() -> Option<u64> {
    None
}

const DEFAULT_PAGE_SIZE: usize = 4096;
