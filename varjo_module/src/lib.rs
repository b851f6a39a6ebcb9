//! Varjo eye tracking for the module host.
//!
//! Two ways to get gaze data out of a Varjo headset:
//! - [`companion`]: an external companion process owns the SDK and publishes
//!   a [`GazeFrame`] through named shared memory.
//! - [`native`]: VarjoLib is loaded in-process; opening the session happens
//!   under a short-lived [`hook::HookScope`] so the library accepts the host.
//!
//! Both are gated on [`probe::is_available`].

pub mod companion;
pub mod config;
pub mod error;
pub mod frame;
pub mod hook;
pub mod mapping;
pub mod native;
pub mod probe;
pub mod shm;
pub mod varjo;

pub use error::{ErrorKind, Result, VarjoError};
pub use frame::{EyeSample, GazeFrame, RawFrame, FRAME_SIZE};
pub use varjo::{GazeSource, VarjoModule};

use api::TrackingModule;

#[no_mangle]
#[allow(improper_ctypes_definitions)]
pub extern "C" fn create_module() -> Box<dyn TrackingModule> {
    Box::new(VarjoModule::new())
}
