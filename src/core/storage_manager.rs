use crate::core::storage::{FileStorage, SandboxFileStorage, Storage};
use crate::domain::model::ModuleName;
use std::path::Path;
use std::sync::Arc;

/// 一次完整清除的結果，列出檔案沙盒清除失敗的模組
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub failed: Vec<(ModuleName, String)>,
}

impl ClearReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 擁有並分割所有模組的持久化狀態
///
/// 建立時即為每個 [`ModuleName`] 各建立一個 key/value 儲存與一個檔案沙盒，
/// 之後只會借出參考，不會再新增。
pub struct ModulesStorageManager {
    storages: [Arc<Storage>; 4],
    file_storages: [Arc<dyn FileStorage>; 4],
}

impl ModulesStorageManager {
    /// `<root>/defaults/<module>.json` 與 `<root>/files/<module>/`
    pub fn new(root: &Path) -> Self {
        let defaults = root.join("defaults");
        let files = root.join("files");
        Self::with_backends(
            |module| Storage::persistent(module, &defaults),
            |module| Arc::new(SandboxFileStorage::new(module, &files)) as Arc<dyn FileStorage>,
        )
    }

    /// Key/value 只存在記憶體中，檔案仍寫入 `<root>/files/<module>/`
    pub fn in_memory(root: &Path) -> Self {
        let files = root.join("files");
        Self::with_backends(Storage::in_memory, |module| {
            Arc::new(SandboxFileStorage::new(module, &files)) as Arc<dyn FileStorage>
        })
    }

    pub fn with_backends(
        mut make_storage: impl FnMut(ModuleName) -> Storage,
        mut make_file_storage: impl FnMut(ModuleName) -> Arc<dyn FileStorage>,
    ) -> Self {
        let storages = ModuleName::ALL.map(|module| Arc::new(make_storage(module)));
        let file_storages = ModuleName::ALL.map(|module| make_file_storage(module));
        Self {
            storages,
            file_storages,
        }
    }

    pub fn storage(&self, module: ModuleName) -> Arc<Storage> {
        Arc::clone(&self.storages[module.index()])
    }

    pub fn file_storage(&self, module: ModuleName) -> Arc<dyn FileStorage> {
        Arc::clone(&self.file_storages[module.index()])
    }

    /// 清除所有模組的資料，單一模組失敗只記錄並繼續
    pub fn clear_all_data(&self) -> ClearReport {
        let mut report = ClearReport::default();

        for module in ModuleName::ALL {
            if let Err(e) = self.storages[module.index()].clear() {
                tracing::warn!("⚠️ Failed to clear {} storage: {}", module, e);
                report.failed.push((module, e.to_string()));
            }

            if let Err(e) = self.file_storages[module.index()].clear() {
                tracing::warn!("⚠️ Failed to clear {} file storage: {}", module, e);
                report.failed.push((module, e.to_string()));
            }
        }

        if report.is_complete() {
            tracing::info!("🧹 Cleared stored data for all modules");
        }
        report
    }
}
