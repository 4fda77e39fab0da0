#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, HarnessError};

// 설정
pub use config::{GeneralConfig, HarnessConfig, LogsConfig, SessionConfig};

// 도메인 타입
pub use types::{Backend, Severity, Stream};
