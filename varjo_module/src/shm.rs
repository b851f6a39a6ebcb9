//! Named shared memory published by the companion, opened with the raw
//! Windows file mapping API.

use crate::error::{Result, VarjoError};
use crate::frame::{RawFrame, FRAME_SIZE};

/// A mapped view of at least `FRAME_SIZE` bytes.
pub trait SharedRegion {
    /// Copies the record at offset 0 into `frame`.
    fn read(&self, frame: &mut RawFrame);
    /// Copies `frame` over the record at offset 0.
    fn write(&mut self, frame: &RawFrame);
}

/// How many times a snapshot is retried before the tick is given up.
pub const SNAPSHOT_TRIES: usize = 3;

/// Reads the record twice and accepts it only if both copies agree. The
/// layout has no sequence field, so this is the only way to notice that the
/// companion was mid-write.
pub fn read_stable<R: SharedRegion + ?Sized>(region: &R) -> Result<RawFrame> {
    let mut first = RawFrame::default();
    let mut second = RawFrame::default();
    for _ in 0..SNAPSHOT_TRIES {
        region.read(&mut first);
        region.read(&mut second);
        if first == second {
            return Ok(first);
        }
    }
    Err(VarjoError::TornRead)
}

#[cfg(windows)]
pub use self::windows_impl::MappedRegion;

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{CloseHandle, ERROR_FILE_NOT_FOUND, HANDLE};
    use windows::Win32::System::Memory::{
        MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_READ, FILE_MAP_WRITE,
        MEMORY_MAPPED_VIEW_ADDRESS,
    };

    pub struct MappedRegion {
        handle: HANDLE,
        view: MEMORY_MAPPED_VIEW_ADDRESS,
    }

    // SAFETY: the view is only touched through &self/&mut self by the owning bridge.
    unsafe impl Send for MappedRegion {}

    impl MappedRegion {
        /// Opens an existing mapping. A missing mapping is reported as
        /// `RegionNotFound` so the caller can retry; anything else is fatal.
        pub fn open(name: &str) -> Result<Self> {
            let name_wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();

            unsafe {
                let handle = OpenFileMappingW(
                    (FILE_MAP_READ | FILE_MAP_WRITE).0,
                    false,
                    PCWSTR(name_wide.as_ptr()),
                )
                .map_err(|e| {
                    if e.code() == ERROR_FILE_NOT_FOUND.to_hresult() {
                        VarjoError::RegionNotFound {
                            name: name.to_string(),
                        }
                    } else {
                        VarjoError::region_open(name, e)
                    }
                })?;

                let view = MapViewOfFile(handle, FILE_MAP_READ | FILE_MAP_WRITE, 0, 0, FRAME_SIZE);
                if view.Value.is_null() {
                    let err = windows::core::Error::from_thread();
                    let _ = CloseHandle(handle);
                    return Err(VarjoError::region_open(name, err));
                }

                Ok(Self { handle, view })
            }
        }
    }

    // The companion writes concurrently; volatile keeps every read a real
    // load so the two copies in `read_stable` are never merged.
    impl SharedRegion for MappedRegion {
        fn read(&self, frame: &mut RawFrame) {
            let bytes =
                unsafe { std::ptr::read_volatile(self.view.Value as *const [u8; FRAME_SIZE]) };
            *frame = RawFrame::from_bytes(bytes);
        }

        fn write(&mut self, frame: &RawFrame) {
            unsafe {
                std::ptr::write_volatile(
                    self.view.Value as *mut [u8; FRAME_SIZE],
                    *frame.as_bytes(),
                );
            }
        }
    }

    impl Drop for MappedRegion {
        fn drop(&mut self) {
            unsafe {
                let _ = UnmapViewOfFile(self.view);
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// In-memory region. `writer_bumps` simulates a companion that is in the
    /// middle of a write for the first N reads.
    #[derive(Default)]
    pub struct MemoryRegion {
        pub bytes: RefCell<RawFrame>,
        pub writes: Vec<RawFrame>,
        pub writer_bumps: Cell<usize>,
        pub reads: Cell<usize>,
    }

    impl MemoryRegion {
        pub fn with(frame: RawFrame) -> Self {
            Self {
                bytes: RefCell::new(frame),
                ..Default::default()
            }
        }
    }

    impl SharedRegion for MemoryRegion {
        fn read(&self, frame: &mut RawFrame) {
            self.reads.set(self.reads.get() + 1);
            *frame = *self.bytes.borrow();
            if self.writer_bumps.get() > 0 {
                self.writer_bumps.set(self.writer_bumps.get() - 1);
                let mut bytes = self.bytes.borrow_mut();
                let b = &mut bytes.as_bytes_mut()[16];
                *b = b.wrapping_add(1);
            }
        }

        fn write(&mut self, frame: &RawFrame) {
            *self.bytes.borrow_mut() = *frame;
            self.writes.push(*frame);
        }
    }

    #[test]
    fn test_stable_read() {
        let region = MemoryRegion::with(RawFrame::from_bytes([7; FRAME_SIZE]));
        let frame = read_stable(&region).unwrap();
        assert_eq!(frame.as_bytes(), &[7; FRAME_SIZE]);
        assert_eq!(region.reads.get(), 2);
    }

    #[test]
    fn test_torn_read_is_retried() {
        let region = MemoryRegion::with(RawFrame::default());
        region.writer_bumps.set(1);
        let frame = read_stable(&region).unwrap();
        assert_eq!(frame.as_bytes()[16], 1);
        assert_eq!(region.reads.get(), 4);
    }

    #[cfg(windows)]
    #[test]
    fn test_mapped_region_sees_other_view() {
        use windows::core::PCWSTR;
        use windows::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
        use windows::Win32::System::Memory::{CreateFileMappingW, PAGE_READWRITE};

        let name = format!("VarjoEyeTrackingTest{}", std::process::id());
        assert!(matches!(
            MappedRegion::open(&name),
            Err(VarjoError::RegionNotFound { .. })
        ));

        let name_wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let owner = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                FRAME_SIZE as u32,
                PCWSTR(name_wide.as_ptr()),
            )
        }
        .unwrap();

        let mut writer = MappedRegion::open(&name).unwrap();
        let reader = MappedRegion::open(&name).unwrap();
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[1] = 1;
        bytes[3] = 0xAB;
        writer.write(&RawFrame::from_bytes(bytes));

        let frame = read_stable(&reader).unwrap();
        assert_eq!(frame.as_bytes(), &bytes);
        assert!(frame.decode().is_calibrated);

        drop(writer);
        drop(reader);
        unsafe {
            let _ = CloseHandle(owner);
        }
    }

    #[test]
    fn test_persistent_tearing_gives_up() {
        let region = MemoryRegion::with(RawFrame::default());
        region.writer_bumps.set(usize::MAX);
        assert!(matches!(read_stable(&region), Err(VarjoError::TornRead)));
        assert_eq!(region.reads.get(), SNAPSHOT_TRIES * 2);
    }
}
