//! In-process Varjo SDK session.

pub mod ffi;
pub mod library;
pub mod session;

pub use library::{SessionHandle, VarjoApi, VarjoLibrary};
pub use session::{NativeInterface, NativePlatform, SessionState, SystemNative};
