//! Scoped `GetCurrentProcessId` interception.
//!
//! VarjoLib refuses to open a session for processes it does not recognise,
//! and it finds out who is calling by asking for the current process id.
//! While a [`HookScope`] is alive, calls to `GetCurrentProcessId` that come
//! from VarjoLib or VarjoRuntime on the installing thread get the real id
//! plus [`SPOOF_OFFSET`]; every other caller sees the real id.
//!
//! Only one scope may exist at a time. The handler runs inside an arbitrary
//! caller's stack frame, so it only reads atomics and asks the loader which
//! module an address belongs to: no allocation, no logging, no locks.

use crate::error::{Result, VarjoError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Added to the real process id for SDK callers. Any stable non-zero value works.
pub const SPOOF_OFFSET: u32 = 42;

/// Modules whose calls get the spoofed id.
pub const SDK_MODULES: [&str; 2] = ["VarjoLib.dll", "VarjoRuntime.dll"];

/// Maps code addresses to the handle of the module that contains them.
pub trait ModuleMap {
    fn module_of(&self, address: usize) -> Option<usize>;
    /// Handles of [`SDK_MODULES`], `None` for the ones not loaded.
    fn sdk_modules(&self) -> [Option<usize>; 2];
}

/// Process id to hand to a caller returning to `return_address`.
pub fn process_id_for_caller<M: ModuleMap + ?Sized>(
    real: u32,
    return_address: usize,
    modules: &M,
) -> u32 {
    let Some(caller) = modules.module_of(return_address) else {
        return real;
    };
    if modules.sdk_modules().contains(&Some(caller)) {
        real.wrapping_add(SPOOF_OFFSET)
    } else {
        real
    }
}

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// True while a [`HookScope`] exists.
pub fn is_active() -> bool {
    ACTIVE.load(Ordering::Acquire)
}

/// Exclusive claim on the interception slot.
struct ActiveFlag;

impl ActiveFlag {
    fn acquire() -> Result<Self> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VarjoError::Hook(
                "another GetCurrentProcessId interception is already active".to_string(),
            ));
        }
        Ok(Self)
    }
}

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Release);
    }
}

/// Guard that keeps the interception installed. Dropping it removes the
/// detour; there is no other way to uninstall.
pub struct HookScope {
    #[cfg(all(windows, target_arch = "x86_64"))]
    _detour: detour::ProcessIdDetour,
    // dropped after the detour
    _flag: ActiveFlag,
}

impl HookScope {
    #[cfg(all(windows, target_arch = "x86_64"))]
    pub fn install() -> Result<Self> {
        let flag = ActiveFlag::acquire()?;
        let detour = detour::ProcessIdDetour::attach()?;
        Ok(Self {
            _detour: detour,
            _flag: flag,
        })
    }

    #[cfg(not(all(windows, target_arch = "x86_64")))]
    pub fn install() -> Result<Self> {
        let _flag = ActiveFlag::acquire()?;
        Err(VarjoError::Unsupported("GetCurrentProcessId interception"))
    }
}

#[cfg(windows)]
pub use self::loader::LoaderModules;

#[cfg(windows)]
mod loader {
    use super::{ModuleMap, SDK_MODULES};
    use windows::core::{w, PCWSTR};
    use windows::Win32::Foundation::HMODULE;
    use windows::Win32::System::LibraryLoader::{
        GetModuleHandleExW, GetModuleHandleW, GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
        GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    };

    const SDK_MODULE_NAMES: [PCWSTR; 2] = [w!("VarjoLib.dll"), w!("VarjoRuntime.dll")];
    const _: () = assert!(SDK_MODULE_NAMES.len() == SDK_MODULES.len());

    /// Asks the Windows loader.
    pub struct LoaderModules;

    impl ModuleMap for LoaderModules {
        fn module_of(&self, address: usize) -> Option<usize> {
            let mut module = HMODULE::default();
            unsafe {
                GetModuleHandleExW(
                    GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS
                        | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
                    PCWSTR(address as *const u16),
                    &mut module,
                )
                .ok()?;
            }
            Some(module.0 as usize)
        }

        fn sdk_modules(&self) -> [Option<usize>; 2] {
            SDK_MODULE_NAMES.map(|name| unsafe {
                GetModuleHandleW(name).ok().map(|m| m.0 as usize)
            })
        }
    }
}

#[cfg(all(windows, target_arch = "x86_64"))]
mod detour {
    use super::{is_active, process_id_for_caller, LoaderModules};
    use crate::error::{Result, VarjoError};
    use retour::GenericDetour;
    use std::sync::atomic::{AtomicU32, Ordering};
    use windows::core::{s, w};
    use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
    use windows::Win32::System::Threading::GetCurrentThreadId;

    type GetCurrentProcessIdFn = unsafe extern "system" fn() -> u32;

    static REAL_PID: AtomicU32 = AtomicU32::new(0);
    static OWNER_THREAD: AtomicU32 = AtomicU32::new(0);

    pub struct ProcessIdDetour {
        detour: GenericDetour<GetCurrentProcessIdFn>,
    }

    impl ProcessIdDetour {
        pub fn attach() -> Result<Self> {
            // The id never changes for the life of the process, so the handler
            // can answer from this copy instead of calling back into the hooked function.
            REAL_PID.store(std::process::id(), Ordering::Release);
            OWNER_THREAD.store(unsafe { GetCurrentThreadId() }, Ordering::Release);

            unsafe {
                let kernel32 = GetModuleHandleW(w!("kernel32.dll"))
                    .map_err(|e| VarjoError::Hook(e.to_string()))?;
                let target = GetProcAddress(kernel32, s!("GetCurrentProcessId")).ok_or_else(
                    || VarjoError::Hook("GetCurrentProcessId not exported".to_string()),
                )?;
                let target: GetCurrentProcessIdFn = std::mem::transmute(target);

                let detour = GenericDetour::<GetCurrentProcessIdFn>::new(
                    target,
                    get_current_process_id_detour,
                )
                .map_err(|e| VarjoError::Hook(e.to_string()))?;
                detour
                    .enable()
                    .map_err(|e| VarjoError::Hook(e.to_string()))?;

                Ok(Self { detour })
            }
        }
    }

    impl Drop for ProcessIdDetour {
        fn drop(&mut self) {
            OWNER_THREAD.store(0, Ordering::Release);
            // Must be unpatched before the trampoline is freed.
            let disabled = unsafe { self.detour.disable() };
            debug_assert!(
                disabled.is_ok() && !self.detour.is_enabled(),
                "GetCurrentProcessId detour still installed: {:?}",
                disabled.err()
            );
        }
    }

    // Entered in place of GetCurrentProcessId. [rsp] still holds the caller's
    // return address; pass it in rcx and tail-jump so the handler returns
    // straight to the caller.
    #[unsafe(naked)]
    unsafe extern "system" fn get_current_process_id_detour() -> u32 {
        core::arch::naked_asm!(
            "mov rcx, [rsp]",
            "jmp {handler}",
            handler = sym intercepted_process_id,
        )
    }

    extern "system" fn intercepted_process_id(return_address: usize) -> u32 {
        let real = REAL_PID.load(Ordering::Acquire);
        if !is_active() || unsafe { GetCurrentThreadId() } != OWNER_THREAD.load(Ordering::Acquire) {
            return real;
        }
        process_id_for_caller(real, return_address, &LoaderModules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Range;
    use std::sync::Mutex;

    // Tests that claim the global interception slot run one at a time.
    static SERIAL: Mutex<()> = Mutex::new(());

    struct SyntheticModules {
        modules: Vec<(Range<usize>, usize)>,
        sdk: [Option<usize>; 2],
    }

    impl ModuleMap for SyntheticModules {
        fn module_of(&self, address: usize) -> Option<usize> {
            self.modules
                .iter()
                .find(|(range, _)| range.contains(&address))
                .map(|(_, handle)| *handle)
        }

        fn sdk_modules(&self) -> [Option<usize>; 2] {
            self.sdk
        }
    }

    const HOST: usize = 0x1_4000_0000;
    const VARJO_LIB: usize = 0x7ff8_1000_0000;
    const VARJO_RUNTIME: usize = 0x7ff8_2000_0000;
    const KERNEL32: usize = 0x7ffa_0000_0000;

    fn loaded() -> SyntheticModules {
        SyntheticModules {
            modules: vec![
                (HOST..HOST + 0x10_0000, HOST),
                (VARJO_LIB..VARJO_LIB + 0x8_0000, VARJO_LIB),
                (VARJO_RUNTIME..VARJO_RUNTIME + 0x20_0000, VARJO_RUNTIME),
                (KERNEL32..KERNEL32 + 0xC_0000, KERNEL32),
            ],
            sdk: [Some(VARJO_LIB), Some(VARJO_RUNTIME)],
        }
    }

    #[test]
    fn test_spoof_table() {
        let modules = loaded();
        let real = 4242;
        let cases = [
            (HOST + 0x1234, real),
            (KERNEL32 + 0x10, real),
            (VARJO_LIB, real + SPOOF_OFFSET),
            (VARJO_LIB + 0x7_ffff, real + SPOOF_OFFSET),
            (VARJO_LIB + 0x8_0000, real),
            (VARJO_RUNTIME + 0x1_0000, real + SPOOF_OFFSET),
            (0x10, real),
            (usize::MAX, real),
        ];
        for (address, expected) in cases {
            assert_eq!(
                process_id_for_caller(real, address, &modules),
                expected,
                "return address {:#x}",
                address
            );
        }
    }

    #[test]
    fn test_runtime_not_loaded_yet() {
        let mut modules = loaded();
        modules.sdk = [Some(VARJO_LIB), None];
        assert_eq!(process_id_for_caller(7, VARJO_LIB + 4, &modules), 7 + SPOOF_OFFSET);
        assert_eq!(process_id_for_caller(7, VARJO_RUNTIME + 4, &modules), 7);
    }

    #[test]
    fn test_spoofed_value_is_deterministic() {
        let modules = loaded();
        let a = process_id_for_caller(1000, VARJO_LIB + 8, &modules);
        let b = process_id_for_caller(1000, VARJO_LIB + 8, &modules);
        assert_eq!(a, b);
        assert_ne!(a, 1000);
    }

    #[test]
    fn test_only_one_scope_at_a_time() {
        let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

        let first = ActiveFlag::acquire().unwrap();
        assert!(is_active());
        assert!(matches!(ActiveFlag::acquire(), Err(VarjoError::Hook(_))));
        drop(first);
        assert!(!is_active());
        let again = ActiveFlag::acquire().unwrap();
        drop(again);
        assert!(!is_active());
    }

    #[cfg(not(all(windows, target_arch = "x86_64")))]
    #[test]
    fn test_install_unsupported_releases_slot() {
        let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

        assert!(matches!(
            HookScope::install(),
            Err(VarjoError::Unsupported(_))
        ));
        assert!(!is_active());
    }

    #[cfg(all(windows, target_arch = "x86_64"))]
    #[test]
    fn test_scope_removed_on_drop() {
        let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        let real = std::process::id();

        {
            let _scope = HookScope::install().unwrap();
            assert!(is_active());
            // Called from this test binary, which is not an SDK module.
            assert_eq!(unsafe { windows::Win32::System::Threading::GetCurrentProcessId() }, real);
            assert!(matches!(HookScope::install(), Err(VarjoError::Hook(_))));
        }

        assert!(!is_active());
        assert_eq!(unsafe { windows::Win32::System::Threading::GetCurrentProcessId() }, real);

        // a clean removal leaves kernel32 patchable again
        let again = HookScope::install().unwrap();
        drop(again);
        assert!(!is_active());
    }
}
