use super::ffi::*;
use crate::error::{Result, VarjoError};
use libloading::{Library, Symbol};
use std::ffi::CStr;
use std::path::Path;
use std::ptr::NonNull;

/// Non-null session pointer handed out by `varjo_SessionInit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle(NonNull<Session>);

impl SessionHandle {
    pub fn new(ptr: *mut Session) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut Session {
        self.0.as_ptr()
    }
}

/// The slice of the VarjoLib C API the bridge uses.
pub trait VarjoApi {
    fn session_init(&self) -> Option<SessionHandle>;
    fn session_shutdown(&self, session: SessionHandle);
    fn is_gaze_allowed(&self, session: SessionHandle) -> bool;
    fn gaze_init(&self, session: SessionHandle);
    fn sync_properties(&self, session: SessionHandle);
    fn gaze_data(
        &self,
        session: SessionHandle,
        gaze: &mut Gaze,
        measurements: &mut EyeMeasurements,
    ) -> bool;
    /// Error code of the last failed call and its description.
    fn last_error(&self, session: SessionHandle) -> (i64, String);
    fn property_bool(&self, session: SessionHandle, key: PropertyKey) -> bool;
    fn property_int(&self, session: SessionHandle, key: PropertyKey) -> i32;
    fn property_string_size(&self, session: SessionHandle, key: PropertyKey) -> i32;
    fn property_string(&self, session: SessionHandle, key: PropertyKey, buffer: &mut [u8]);
}

/// VarjoLib.dll with its exports resolved up front.
pub struct VarjoLibrary {
    _lib: Library,
    session_init: SessionInitFn,
    session_shut_down: SessionShutDownFn,
    gaze_init: GazeInitFn,
    is_gaze_allowed: IsGazeAllowedFn,
    get_gaze_data: GetGazeDataFn,
    get_error: GetErrorFn,
    get_error_desc: GetErrorDescFn,
    get_property_bool: GetPropertyBoolFn,
    get_property_int: GetPropertyIntFn,
    get_property_string_size: GetPropertyStringSizeFn,
    get_property_string: GetPropertyStringFn,
    sync_properties: SyncPropertiesFn,
}

impl VarjoLibrary {
    pub fn load(path: &Path) -> Result<Self> {
        let err = |e: libloading::Error| VarjoError::library_load(path, e);

        unsafe {
            let lib = Library::new(path).map_err(err)?;

            let session_init: Symbol<SessionInitFn> = lib.get(b"varjo_SessionInit").map_err(err)?;
            let session_shut_down: Symbol<SessionShutDownFn> =
                lib.get(b"varjo_SessionShutDown").map_err(err)?;
            let gaze_init: Symbol<GazeInitFn> = lib.get(b"varjo_GazeInit").map_err(err)?;
            let is_gaze_allowed: Symbol<IsGazeAllowedFn> =
                lib.get(b"varjo_IsGazeAllowed").map_err(err)?;
            let get_gaze_data: Symbol<GetGazeDataFn> =
                lib.get(b"varjo_GetGazeData").map_err(err)?;
            let get_error: Symbol<GetErrorFn> = lib.get(b"varjo_GetError").map_err(err)?;
            let get_error_desc: Symbol<GetErrorDescFn> =
                lib.get(b"varjo_GetErrorDesc").map_err(err)?;
            let get_property_bool: Symbol<GetPropertyBoolFn> =
                lib.get(b"varjo_GetPropertyBool").map_err(err)?;
            let get_property_int: Symbol<GetPropertyIntFn> =
                lib.get(b"varjo_GetPropertyInt").map_err(err)?;
            let get_property_string_size: Symbol<GetPropertyStringSizeFn> =
                lib.get(b"varjo_GetPropertyStringSize").map_err(err)?;
            let get_property_string: Symbol<GetPropertyStringFn> =
                lib.get(b"varjo_GetPropertyString").map_err(err)?;
            let sync_properties: Symbol<SyncPropertiesFn> =
                lib.get(b"varjo_SyncProperties").map_err(err)?;

            Ok(Self {
                session_init: *session_init,
                session_shut_down: *session_shut_down,
                gaze_init: *gaze_init,
                is_gaze_allowed: *is_gaze_allowed,
                get_gaze_data: *get_gaze_data,
                get_error: *get_error,
                get_error_desc: *get_error_desc,
                get_property_bool: *get_property_bool,
                get_property_int: *get_property_int,
                get_property_string_size: *get_property_string_size,
                get_property_string: *get_property_string,
                sync_properties: *sync_properties,
                _lib: lib,
            })
        }
    }
}

impl VarjoApi for VarjoLibrary {
    fn session_init(&self) -> Option<SessionHandle> {
        SessionHandle::new(unsafe { (self.session_init)() })
    }

    fn session_shutdown(&self, session: SessionHandle) {
        unsafe { (self.session_shut_down)(session.as_ptr()) }
    }

    fn is_gaze_allowed(&self, session: SessionHandle) -> bool {
        unsafe { (self.is_gaze_allowed)(session.as_ptr()) != 0 }
    }

    fn gaze_init(&self, session: SessionHandle) {
        unsafe { (self.gaze_init)(session.as_ptr()) }
    }

    fn sync_properties(&self, session: SessionHandle) {
        unsafe { (self.sync_properties)(session.as_ptr()) }
    }

    fn gaze_data(
        &self,
        session: SessionHandle,
        gaze: &mut Gaze,
        measurements: &mut EyeMeasurements,
    ) -> bool {
        unsafe { (self.get_gaze_data)(session.as_ptr(), gaze, measurements) != 0 }
    }

    fn last_error(&self, session: SessionHandle) -> (i64, String) {
        unsafe {
            let code = (self.get_error)(session.as_ptr());
            let desc = (self.get_error_desc)(code);
            let description = if desc.is_null() {
                String::new()
            } else {
                CStr::from_ptr(desc).to_string_lossy().into_owned()
            };
            (code, description)
        }
    }

    fn property_bool(&self, session: SessionHandle, key: PropertyKey) -> bool {
        unsafe { (self.get_property_bool)(session.as_ptr(), key as i64) != 0 }
    }

    fn property_int(&self, session: SessionHandle, key: PropertyKey) -> i32 {
        unsafe { (self.get_property_int)(session.as_ptr(), key as i64) }
    }

    fn property_string_size(&self, session: SessionHandle, key: PropertyKey) -> i32 {
        unsafe { (self.get_property_string_size)(session.as_ptr(), key as i64) }
    }

    fn property_string(&self, session: SessionHandle, key: PropertyKey, buffer: &mut [u8]) {
        let size = i32::try_from(buffer.len()).unwrap_or(i32::MAX);
        unsafe {
            (self.get_property_string)(
                session.as_ptr(),
                key as i64,
                buffer.as_mut_ptr().cast(),
                size,
            )
        }
    }
}
