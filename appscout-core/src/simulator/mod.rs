mod driver;
mod error;
mod metrics;
mod profile;

pub use driver::{
    CommandExecutor, DeviceDriver, PreferenceValue, SimctlDriver, SwipeDirection,
    SystemCommandExecutor,
};
pub use error::{SimulatorError, SimulatorResult};
pub use metrics::ExplorationMetrics;
pub use profile::{DeviceProfile, DEVICE_PROFILES};
