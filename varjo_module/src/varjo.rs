use crate::companion::{CompanionInterface, CompanionPlatform, SystemCompanion};
use crate::config::{self, BridgeMode, VarjoConfig, CONFIG_FILE_NAME};
use crate::error::{ErrorKind, VarjoError};
use crate::frame::GazeFrame;
use crate::mapping;
use crate::native::{NativeInterface, NativePlatform, SystemNative};
use anyhow::{anyhow, Result};
use api::{EyeTrackingData, ModuleLogger, TrackingModule};
use std::path::{Path, PathBuf};

/// Either transport, driven the same way by the module.
pub trait GazeSource {
    /// Connects or opens the session. `logger` receives the transport's own events.
    fn start(&mut self, logger: &ModuleLogger) -> Result<(), VarjoError>;
    fn update(&mut self) -> Result<bool, VarjoError>;
    fn frame(&self) -> &GazeFrame;
    fn teardown(&mut self);
    /// Shown in the log after a successful start.
    fn describe(&self) -> String;
}

impl<P: CompanionPlatform> GazeSource for CompanionInterface<P> {
    fn start(&mut self, logger: &ModuleLogger) -> Result<(), VarjoError> {
        self.set_logger(logger.clone());
        self.connect()
    }

    fn update(&mut self) -> Result<bool, VarjoError> {
        CompanionInterface::update(self)
    }

    fn frame(&self) -> &GazeFrame {
        CompanionInterface::frame(self)
    }

    fn teardown(&mut self) {
        CompanionInterface::teardown(self)
    }

    fn describe(&self) -> String {
        "Varjo companion (shared memory)".to_string()
    }
}

impl<P: NativePlatform> GazeSource for NativeInterface<P> {
    fn start(&mut self, logger: &ModuleLogger) -> Result<(), VarjoError> {
        self.set_logger(logger.clone());
        self.initialize()
    }

    fn update(&mut self) -> Result<bool, VarjoError> {
        NativeInterface::update(self)
    }

    fn frame(&self) -> &GazeFrame {
        NativeInterface::frame(self)
    }

    fn teardown(&mut self) {
        NativeInterface::teardown(self)
    }

    fn describe(&self) -> String {
        match self.device_name() {
            name if name.is_empty() => "Varjo HMD (native)".to_string(),
            name => format!("{} (native)", name),
        }
    }
}

pub fn system_source(config: &VarjoConfig, install_dir: Option<&Path>) -> Box<dyn GazeSource> {
    match config.mode {
        BridgeMode::Companion => {
            let dir = install_dir.unwrap_or_else(|| Path::new("."));
            Box::new(CompanionInterface::new(
                SystemCompanion::default(),
                dir,
                &config.companion,
            ))
        }
        BridgeMode::Native => Box::new(NativeInterface::new(
            SystemNative,
            install_dir.map(|dir| dir.join(&config.native.library)),
        )),
    }
}

pub struct VarjoModule {
    source: Option<Box<dyn GazeSource>>,
    logger: Option<ModuleLogger>,
    config_path: Option<PathBuf>,
    failing: bool,
    failed_ticks: u64,
}

impl VarjoModule {
    pub fn new() -> Self {
        Self {
            source: None,
            logger: None,
            config_path: None,
            failing: false,
            failed_ticks: 0,
        }
    }

    /// Uses `source` instead of building one from the config file.
    pub fn with_source(source: Box<dyn GazeSource>) -> Self {
        Self {
            source: Some(source),
            ..Self::new()
        }
    }

    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn frame(&self) -> Option<&GazeFrame> {
        self.source.as_deref().map(|s| s.frame())
    }

    fn load_config(&self, logger: &ModuleLogger, install_dir: Option<&Path>) -> VarjoConfig {
        let path = match (&self.config_path, install_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(CONFIG_FILE_NAME),
            (None, None) => PathBuf::from(CONFIG_FILE_NAME),
        };
        config::load_config(&path).unwrap_or_else(|e| {
            logger.warn(&format!(
                "Failed to load config {:?}: {}. Using defaults.",
                path, e
            ));
            VarjoConfig::default()
        })
    }
}

impl Default for VarjoModule {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingModule for VarjoModule {
    fn initialize(&mut self, logger: ModuleLogger) -> Result<()> {
        logger.info("Initializing Varjo Module");

        if self.source.is_none() {
            let install_dir = config::install_dir();
            let config = self.load_config(&logger, install_dir.as_deref());
            logger.debug(&format!("Config: {:?}", config));
            self.source = Some(system_source(&config, install_dir.as_deref()));
        }

        let result = match self.source.as_mut() {
            Some(source) => source.start(&logger).map(|_| source.describe()),
            None => Err(VarjoError::Unsupported("Varjo module without a gaze source")),
        };

        let outcome = match result {
            Ok(description) => {
                logger.info(&format!("Eye tracking started: {}", description));
                Ok(())
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::Unavailable => logger.warn("Varjo headset isn't detected"),
                    _ => logger.error(&format!("Failed to initialize Varjo eye tracking: {}", e)),
                }
                Err(anyhow!(e))
            }
        };

        self.logger = Some(logger);
        outcome
    }

    fn update(&mut self, data: &mut EyeTrackingData) -> Result<()> {
        let Some(source) = self.source.as_mut() else {
            return Ok(());
        };

        match source.update() {
            Ok(true) => {
                mapping::update_eye(data, source.frame());
                #[cfg(feature = "xtralog")]
                if let Some(logger) = &self.logger {
                    logger.trace(&format!("Frame: {:?}", source.frame()));
                }
                if self.failing {
                    if let Some(logger) = &self.logger {
                        logger.info(&format!(
                            "Gaze data is back after {} failed ticks",
                            self.failed_ticks
                        ));
                    }
                    self.failing = false;
                    self.failed_ticks = 0;
                }
            }
            Ok(false) => {}
            Err(e) => {
                self.failed_ticks += 1;
                // Only the first failure of a streak is logged; the host ticks far too often.
                if !self.failing {
                    if let Some(logger) = &self.logger {
                        logger.warn(&format!("Error while getting gaze data: {}", e));
                    }
                    self.failing = true;
                }
            }
        }

        Ok(())
    }

    fn unload(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.teardown();
        }
        if let Some(logger) = &self.logger {
            logger.info("Varjo Module unloaded");
        }
    }
}
