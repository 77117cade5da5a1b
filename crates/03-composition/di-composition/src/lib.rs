//! # DI Composition
//!
//! 容器的组合层：从 TOML、JSON 和环境变量加载设置，按需初始化日志，
//! 运行类型扫描器并引导 [`Container`](di_impl::Container)。
//!
//! ```toml
//! [container]
//! max_resolution_depth = 32
//!
//! [beans]
//! alternatives = ["MockMailer"]
//!
//! [logging]
//! enabled = true
//! level = "debug"
//! ```

pub mod bootstrapper;
pub mod logging;
pub mod scanner;
pub mod settings;

pub use bootstrapper::ContainerBootstrapper;
pub use logging::{init_logging, LoggingConfig};
pub use scanner::StaticTypeScanner;
pub use settings::{ContainerSettings, SettingsLoader, SettingsSource};
