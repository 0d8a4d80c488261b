use crate::app::modules::qes::{QesCoordinatorFactory, QES_MODULE_SYMBOL};
use crate::core::module::ModuleServiceLocator;
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use thiserror::Error;

/// 由 service locator 建出模組能力的建構函式
pub type ModuleConstructor = fn(ModuleServiceLocator) -> Box<dyn Any + Send>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleResolutionError {
    #[error("no module registered under '{symbol}'")]
    NotRegistered { symbol: String },

    #[error("module '{symbol}' does not provide {expected}")]
    CapabilityMismatch {
        symbol: String,
        expected: &'static str,
    },
}

/// 以穩定字串名稱對應模組建構函式的外掛登錄表
///
/// 編譯進來的模組在啟動時自行註冊；沒有註冊的名稱代表模組不存在，
/// 查詢時回傳錯誤而不是 panic。
#[derive(Default)]
pub struct ModuleRegistry {
    constructors: RwLock<HashMap<String, ModuleConstructor>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by [`RuntimeModuleFactory::global`].
    pub fn global() -> Arc<ModuleRegistry> {
        static GLOBAL: OnceLock<Arc<ModuleRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ModuleRegistry::new())).clone()
    }

    pub fn register(&self, symbol: &str, constructor: ModuleConstructor) {
        let mut constructors = self
            .constructors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if constructors.insert(symbol.to_string(), constructor).is_some() {
            tracing::debug!("Module '{}' registered again, replacing constructor", symbol);
        } else {
            tracing::debug!("Registered module '{}'", symbol);
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(symbol)
    }

    /// 建構 `symbol` 對應的模組，並轉成呼叫端預期的能力型別 `T`
    pub fn resolve<T: 'static>(
        &self,
        symbol: &str,
        locator: ModuleServiceLocator,
    ) -> Result<T, ModuleResolutionError> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(symbol)
            .copied()
            .ok_or_else(|| ModuleResolutionError::NotRegistered {
                symbol: symbol.to_string(),
            })?;

        constructor(locator)
            .downcast::<T>()
            .map(|capability| *capability)
            .map_err(|_| ModuleResolutionError::CapabilityMismatch {
                symbol: symbol.to_string(),
                expected: type_name::<T>(),
            })
    }
}

/// 建立選用模組的工廠；模組不存在時回傳 `None`，呼叫端視為功能不可用
pub trait ModuleFactory: Send + Sync {
    fn make_qes(&self, locator: ModuleServiceLocator) -> Option<Arc<dyn QesCoordinatorFactory>>;
}

/// 透過 [`ModuleRegistry`] 依名稱查找模組的正式實作
#[derive(Clone)]
pub struct RuntimeModuleFactory {
    registry: Arc<ModuleRegistry>,
}

impl RuntimeModuleFactory {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn global() -> Self {
        Self::new(ModuleRegistry::global())
    }

    pub fn try_make_qes(
        &self,
        locator: ModuleServiceLocator,
    ) -> Result<Arc<dyn QesCoordinatorFactory>, ModuleResolutionError> {
        self.registry
            .resolve::<Arc<dyn QesCoordinatorFactory>>(QES_MODULE_SYMBOL, locator)
    }
}

impl ModuleFactory for RuntimeModuleFactory {
    fn make_qes(&self, locator: ModuleServiceLocator) -> Option<Arc<dyn QesCoordinatorFactory>> {
        match self.try_make_qes(locator) {
            Ok(factory) => Some(factory),
            Err(e @ ModuleResolutionError::NotRegistered { .. }) => {
                tracing::debug!("QES module not linked: {}", e);
                None
            }
            Err(e @ ModuleResolutionError::CapabilityMismatch { .. }) => {
                tracing::warn!("⚠️ QES module present but misconfigured: {}", e);
                None
            }
        }
    }
}
