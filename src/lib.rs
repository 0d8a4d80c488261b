pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use app::session::{IdentHub, ScreenFactories, SessionOrchestrator, SessionOutcome};
pub use config::{Configuration, SdkConfig};
pub use core::registry::ModuleRegistry;
pub use domain::model::{IdentificationMethod, IdentificationStep, ModuleName};
pub use utils::error::{IdentError, Result};

/// 把這次建置有編進來的選用模組註冊到登錄表
///
/// 沒有開啟 `qes` feature 時什麼都不做，解析器會把 QES 視為不存在。
pub fn register_optional_modules(registry: &ModuleRegistry) {
    #[cfg(feature = "qes")]
    app::modules::qes::QesModule::register(registry);

    #[cfg(not(feature = "qes"))]
    let _ = registry;
}
