#![doc = include_str!("../README.md")]

pub mod capture;
pub mod clock;
pub mod command;
pub mod environment;
pub mod error;
pub mod logs;
pub mod process;
pub mod scenario;
pub mod session;
pub mod wait;

// --- 주요 타입 re-export ---

pub use capture::{OutputCapture, ReadStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use environment::{AmbientEnv, ChildEnvironment};
pub use error::{ScenarioError, SessionError};
pub use process::ExitOutcome;
pub use scenario::{Scenario, ScenarioOutput};
pub use session::{Session, SessionBuilder, TeardownReport};
pub use wait::{WaitOutcome, WaitRequest};
