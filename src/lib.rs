//! Camera scan sessions with live face positioning, text capture and
//! persistence of processed captures.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod imaging;
pub mod overlay;
pub mod persist;
pub mod scan;
pub mod sdk;
pub mod session;

pub use config::ScanConfig;
pub use error::{Result, ScanError};
pub use persist::SaveOutcome;
pub use scan::{FaceScanSession, TextScanSession};
pub use sdk::ScanSdk;
pub use session::{LifecycleEvent, SessionController, SessionState};
