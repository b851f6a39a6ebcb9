use anyhow::Result;
use api::{EyeTrackingData, LogLevel, ModuleLogger, TrackingModule};
use log::{debug, error, info, trace, warn};
use std::ffi::c_char;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use varjo_module::VarjoModule;

const TICK: Duration = Duration::from_millis(16);

extern "C" fn module_log_callback(level: LogLevel, target: *const c_char, message: *const c_char) {
    unsafe {
        let target_str = std::ffi::CStr::from_ptr(target)
            .to_str()
            .unwrap_or("unknown");
        let message_str = std::ffi::CStr::from_ptr(message).to_str().unwrap_or("");

        match level {
            LogLevel::Error => error!(target: target_str, "{}", message_str),
            LogLevel::Warn => warn!(target: target_str, "{}", message_str),
            LogLevel::Info => info!(target: target_str, "{}", message_str),
            LogLevel::Debug => debug!(target: target_str, "{}", message_str),
            LogLevel::Trace => trace!(target: target_str, "{}", message_str),
        }
    }
}

fn config_arg() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received Ctrl-C, shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut module = match config_arg() {
        Some(path) => VarjoModule::new().with_config_path(path),
        None => VarjoModule::new(),
    };

    let logger = ModuleLogger::new(module_log_callback, "varjo_module".to_string());
    module.initialize(logger)?;

    let mut data = EyeTrackingData::default();
    let mut last_data: Option<EyeTrackingData> = None;

    while running.load(Ordering::SeqCst) {
        if let Err(e) = module.update(&mut data) {
            error!("Update failed: {}", e);
        }

        if last_data.as_ref() != Some(&data) {
            println!("{}", serde_json::to_string(&data)?);
            last_data = Some(data.clone());
        }

        std::thread::sleep(TICK);
    }

    module.unload();
    info!("Stopped");
    Ok(())
}
