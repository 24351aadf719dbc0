//! Core modules for proxlock

pub mod proximity;
pub mod store;
pub mod selector;
pub mod pairing;
pub mod scanner;
pub mod btmgmt;
pub mod actuator;
pub mod monitor;
pub mod api;

pub use proximity::ProximityEngine;
pub use store::{MonitorLock, TrustStore};
pub use selector::{PairingSelector, choose_candidate, derive_threshold};
pub use pairing::PairingSession;
pub use scanner::{SampleSource, DeviceDiscovery, ScanHandle, ScriptStep, ScriptedSource};
pub use btmgmt::{BtmgmtScanner, parse_btmgmt_output};
pub use actuator::{LockActuator, LockMethod, SystemLockActuator, DisabledActuator};
pub use monitor::{Monitor, MonitorOutcome, MonitorRegistry, MonitorGuard};
pub use api::{AppState, PairingEvent, create_router, local_ip, pairing_url, render_qr, run_server};
