//! Shared-memory transport: the companion executable owns the Varjo SDK and
//! publishes a `GazeFrame` into a named mapping that we poll every tick.

use crate::config::CompanionConfig;
use crate::error::{Result, VarjoError};
use crate::frame::{GazeFrame, RawFrame};
use crate::probe;
use crate::shm::{self, SharedRegion};
use api::ModuleLogger;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

/// OS services the transport needs. Swapped out in tests.
pub trait CompanionPlatform {
    type Region: SharedRegion;

    fn runtime_available(&self) -> bool;
    fn launch(&mut self, executable: &Path) -> Result<()>;
    fn open_region(&mut self, name: &str) -> Result<Self::Region>;
    fn terminate(&mut self);
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

pub struct CompanionInterface<P: CompanionPlatform> {
    platform: P,
    executable: PathBuf,
    map_name: String,
    open_attempts: u32,
    retry_delay: Duration,
    state: ConnectionState,
    region: Option<P::Region>,
    raw: RawFrame,
    frame: GazeFrame,
    logger: Option<ModuleLogger>,
}

impl<P: CompanionPlatform> CompanionInterface<P> {
    pub fn new(platform: P, install_dir: &Path, config: &CompanionConfig) -> Self {
        Self {
            platform,
            executable: install_dir.join(&config.executable),
            map_name: config.map_name.clone(),
            open_attempts: config.open_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            state: ConnectionState::Disconnected,
            region: None,
            raw: RawFrame::default(),
            frame: GazeFrame::default(),
            logger: None,
        }
    }

    /// Connection events go to the host through this logger.
    pub fn set_logger(&mut self, logger: ModuleLogger) {
        self.logger = Some(logger);
    }

    fn info(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger.info(message);
        }
    }

    fn debug(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger.debug(message);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn frame(&self) -> &GazeFrame {
        &self.frame
    }

    /// Starts the companion and waits for it to publish the mapping. A no-op
    /// while already connected.
    pub fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        if !self.platform.runtime_available() {
            return Err(VarjoError::Unavailable);
        }

        self.state = ConnectionState::Connecting;
        if let Err(e) = self.platform.launch(&self.executable) {
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }
        self.debug(&format!("Started companion {:?}", self.executable));

        match self.open_with_retry() {
            Ok(region) => {
                self.region = Some(region);
                self.state = ConnectionState::Connected;
                self.info(&format!("Connected to shared memory '{}'", self.map_name));
                Ok(())
            }
            Err(e) => {
                self.platform.terminate();
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    fn open_with_retry(&mut self) -> Result<P::Region> {
        let mut attempt = 1;
        loop {
            match self.platform.open_region(&self.map_name) {
                Ok(region) => return Ok(region),
                Err(e @ VarjoError::RegionNotFound { .. }) => {
                    self.debug(&format!(
                        "'{}' not published yet (attempt {}/{})",
                        self.map_name, attempt, self.open_attempts
                    ));
                    if attempt >= self.open_attempts {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
            attempt += 1;
            self.platform.sleep(self.retry_delay);
        }
    }

    /// Pulls the current record. `Ok(false)` when not connected; on a torn
    /// read the previous frame is kept.
    pub fn update(&mut self) -> Result<bool> {
        let Some(region) = &self.region else {
            return Ok(false);
        };

        let raw = shm::read_stable(region)?;
        self.raw = raw;
        self.frame = raw.decode();
        Ok(true)
    }

    /// Signals shutdown through the record, releases the mapping and stops
    /// the companion. Safe to call more than once.
    pub fn teardown(&mut self) {
        let Some(mut region) = self.region.take() else {
            return;
        };

        // The companion may ignore the flag, so it is killed afterwards anyway.
        self.raw.request_shutdown();
        self.frame.shutdown_requested = true;
        region.write(&self.raw);
        drop(region);

        self.platform.terminate();
        self.state = ConnectionState::Closed;
        self.info(&format!("Disconnected from shared memory '{}'", self.map_name));
    }
}

impl<P: CompanionPlatform> Drop for CompanionInterface<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Real processes and real mappings.
#[derive(Default)]
pub struct SystemCompanion {
    child: Option<Child>,
}

impl CompanionPlatform for SystemCompanion {
    #[cfg(windows)]
    type Region = shm::MappedRegion;
    #[cfg(not(windows))]
    type Region = UnsupportedRegion;

    fn runtime_available(&self) -> bool {
        probe::is_available()
    }

    fn launch(&mut self, executable: &Path) -> Result<()> {
        self.terminate();

        let mut command = Command::new(executable);
        if let Some(dir) = executable.parent() {
            command.current_dir(dir);
        }
        let child = command
            .spawn()
            .map_err(|source| VarjoError::CompanionLaunch {
                path: executable.to_path_buf(),
                source,
            })?;
        self.child = Some(child);
        Ok(())
    }

    #[cfg(windows)]
    fn open_region(&mut self, name: &str) -> Result<Self::Region> {
        shm::MappedRegion::open(name)
    }

    #[cfg(not(windows))]
    fn open_region(&mut self, _name: &str) -> Result<Self::Region> {
        Err(VarjoError::Unsupported("Named shared memory"))
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Placeholder region type for targets without named mappings; never constructed.
#[cfg(not(windows))]
pub enum UnsupportedRegion {}

#[cfg(not(windows))]
impl SharedRegion for UnsupportedRegion {
    fn read(&self, _frame: &mut RawFrame) {
        match *self {}
    }

    fn write(&mut self, _frame: &RawFrame) {
        match *self {}
    }
}
