use crate::config::theme::SharedConfiguration;
use crate::core::storage::{FileStorage, Storage};
use crate::domain::model::ModuleName;
use crate::domain::ports::{AlertsService, NetworkClient, Presenter};
use std::fmt;
use std::sync::Arc;

/// 單一模組啟用時取得的協作者集合
///
/// 網路、設定、presenter 與對話框是整個 session 共用的單例，
/// 兩個儲存則只屬於 `module`。
#[derive(Clone)]
pub struct ModuleServiceLocator {
    pub module: ModuleName,
    pub network: Arc<dyn NetworkClient>,
    pub configuration: SharedConfiguration,
    pub file_storage: Arc<dyn FileStorage>,
    pub storage: Arc<Storage>,
    pub presenter: Arc<dyn Presenter>,
    pub alerts: Arc<dyn AlertsService>,
}

impl fmt::Debug for ModuleServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleServiceLocator")
            .field("module", &self.module)
            .field("file_storage", &self.file_storage.root())
            .finish_non_exhaustive()
    }
}

/// 可獨立部署的功能模組
///
/// 只能從一個 [`ModuleServiceLocator`] 建構，並透過各自的
/// `*CoordinatorFactory` 能力產生協調器。
pub trait Module: Send + Sync + Sized + 'static {
    const NAME: ModuleName;

    fn new(locator: ModuleServiceLocator) -> Self;
}
