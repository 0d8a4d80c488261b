use crate::domain::model::{ModuleName, StorageKey};
use crate::utils::error::{IdentError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// 單一模組的 key/value 儲存
///
/// 每個模組有自己的 suite，不同模組即使用同名的鍵也不會互相覆蓋。
/// 寫入採 last-write-wins；寫檔失敗時記憶體內容會還原成寫入前的狀態。
#[derive(Debug)]
pub struct Storage {
    module: ModuleName,
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl Storage {
    pub fn in_memory(module: ModuleName) -> Self {
        Self {
            module,
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    /// 以 `<dir>/<module>.json` 持久化，建立時讀回既有內容
    pub fn persistent(module: ModuleName, dir: &Path) -> Self {
        let path = dir.join(format!("{}.json", module.as_str()));
        let values = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(
                        "Discarding unreadable storage suite {}: {}",
                        path.display(),
                        e
                    );
                    Map::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Map::new(),
            Err(e) => {
                tracing::warn!("Could not read storage suite {}: {}", path.display(), e);
                Map::new()
            }
        };

        Self {
            module,
            path: Some(path),
            values: Mutex::new(values),
        }
    }

    pub fn module(&self) -> ModuleName {
        self.module
    }

    pub fn get<T: DeserializeOwned>(&self, key: &StorageKey<T>) -> Option<T> {
        let values = self.lock();
        let raw = values.get(key.name())?.clone();
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(
                    "Stored value for {}.{} has an unexpected type: {}",
                    self.module,
                    key.name(),
                    e
                );
                None
            }
        }
    }

    pub fn contains<T>(&self, key: &StorageKey<T>) -> bool {
        self.lock().contains_key(key.name())
    }

    /// 寫入 `None` 等同於刪除該鍵
    pub fn set<T: Serialize>(&self, key: &StorageKey<T>, value: Option<T>) -> Result<()> {
        let mut values = self.lock();
        let snapshot = values.clone();
        match value {
            Some(value) => {
                values.insert(key.name().to_string(), serde_json::to_value(value)?);
            }
            None => {
                values.remove(key.name());
            }
        }
        self.flush_or_restore(&mut values, snapshot)
    }

    pub fn remove<T>(&self, key: &StorageKey<T>) -> Result<()> {
        let mut values = self.lock();
        let snapshot = values.clone();
        if values.remove(key.name()).is_some() {
            self.flush_or_restore(&mut values, snapshot)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut values = self.lock();

        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(self.storage_error(format!("failed to clear suite: {}", e))),
            }
        }
        values.clear();
        Ok(())
    }

    fn flush(&self, values: &Map<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(values)?)?;
        Ok(())
    }

    fn flush_or_restore(
        &self,
        values: &mut Map<String, Value>,
        snapshot: Map<String, Value>,
    ) -> Result<()> {
        let result = self.flush(values);
        if result.is_err() {
            *values = snapshot;
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn storage_error(&self, message: String) -> IdentError {
        IdentError::StorageError {
            module: self.module,
            message,
        }
    }
}

/// 模組專屬的檔案沙盒
pub trait FileStorage: Send + Sync {
    fn module(&self) -> ModuleName;

    fn root(&self) -> &Path;

    /// 把 `source` 複製到沙盒內的 `filename`，回傳本地路徑
    fn write(&self, source: &Url, filename: &str) -> Result<PathBuf>;

    /// 刪除整個沙盒資料夾
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SandboxFileStorage {
    module: ModuleName,
    root: PathBuf,
}

impl SandboxFileStorage {
    pub fn new(module: ModuleName, base_path: &Path) -> Self {
        Self {
            module,
            root: base_path.join(module.as_str()),
        }
    }

    fn storage_error(&self, message: String) -> IdentError {
        IdentError::StorageError {
            module: self.module,
            message,
        }
    }
}

impl FileStorage for SandboxFileStorage {
    fn module(&self) -> ModuleName {
        self.module
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn write(&self, source: &Url, filename: &str) -> Result<PathBuf> {
        let file_name = Path::new(filename);
        let single_component = file_name.components().count() == 1
            && file_name.file_name().map(|n| n == file_name.as_os_str()) == Some(true);
        if filename.is_empty() || !single_component {
            return Err(self.storage_error(format!("invalid file name '{}'", filename)));
        }

        if source.scheme() != "file" {
            return Err(self.storage_error(format!(
                "unsupported source scheme '{}'",
                source.scheme()
            )));
        }
        let source_path = source
            .to_file_path()
            .map_err(|_| self.storage_error(format!("not a local file: {}", source)))?;

        fs::create_dir_all(&self.root)?;
        let destination = self.root.join(file_name);
        fs::copy(&source_path, &destination)?;

        tracing::debug!(
            "Stored {} into {} sandbox as {}",
            source_path.display(),
            self.module,
            destination.display()
        );
        Ok(destination)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.storage_error(format!("failed to clear sandbox: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{keys, IdentificationStep};
    use tempfile::TempDir;

    const TEST_KEY: StorageKey<String> = StorageKey::new("testKey");

    #[test]
    fn test_set_get_and_remove_on_none() {
        let storage = Storage::in_memory(ModuleName::Bank);
        assert_eq!(storage.get(&TEST_KEY), None);

        storage.set(&TEST_KEY, Some("X".to_string())).unwrap();
        assert_eq!(storage.get(&TEST_KEY).as_deref(), Some("X"));

        storage.set(&TEST_KEY, None).unwrap();
        assert!(!storage.contains(&TEST_KEY));
    }

    #[test]
    fn test_typed_values() {
        let storage = Storage::in_memory(ModuleName::Bank);
        storage.set(&keys::RETRIES_COUNT, Some(3)).unwrap();
        storage
            .set(&keys::FALLBACK_IDENT_STEP, Some(IdentificationStep::FourthlineSigning))
            .unwrap();

        assert_eq!(storage.get(&keys::RETRIES_COUNT), Some(3));
        assert_eq!(
            storage.get(&keys::FALLBACK_IDENT_STEP),
            Some(IdentificationStep::FourthlineSigning)
        );
    }

    #[test]
    fn test_type_mismatch_reads_as_absent() {
        let storage = Storage::in_memory(ModuleName::Core);
        storage.set(&TEST_KEY, Some("not a number".to_string())).unwrap();

        let as_number: StorageKey<u32> = StorageKey::new("testKey");
        assert_eq!(storage.get(&as_number), None);
    }

    #[test]
    fn test_persistent_suite_survives_reload() {
        let temp_dir = TempDir::new().unwrap();

        let storage = Storage::persistent(ModuleName::Fourthline, temp_dir.path());
        storage.set(&keys::IDENTIFICATION_UID, Some("uid-9".to_string())).unwrap();
        drop(storage);

        assert!(temp_dir.path().join("fourthline.json").exists());
        let reloaded = Storage::persistent(ModuleName::Fourthline, temp_dir.path());
        assert_eq!(reloaded.get(&keys::IDENTIFICATION_UID).as_deref(), Some("uid-9"));

        reloaded.clear().unwrap();
        assert!(!temp_dir.path().join("fourthline.json").exists());
        assert_eq!(reloaded.get(&keys::IDENTIFICATION_UID), None);
    }

    #[test]
    fn test_failed_write_keeps_memory_in_sync_with_disk() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::persistent(ModuleName::Bank, temp_dir.path());
        storage.set(&keys::RETRIES_COUNT, Some(3)).unwrap();

        // 目標路徑變成資料夾後寫檔必定失敗
        let suite = temp_dir.path().join("bank.json");
        fs::remove_file(&suite).unwrap();
        fs::create_dir(&suite).unwrap();

        assert!(storage.set(&keys::RETRIES_COUNT, Some(1)).is_err());
        assert_eq!(storage.get(&keys::RETRIES_COUNT), Some(3));

        assert!(storage.remove(&keys::RETRIES_COUNT).is_err());
        assert_eq!(storage.get(&keys::RETRIES_COUNT), Some(3));

        assert!(storage.clear().is_err());
        assert_eq!(storage.get(&keys::RETRIES_COUNT), Some(3));
    }

    #[test]
    fn test_corrupt_suite_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("core.json"), b"{not json").unwrap();

        let storage = Storage::persistent(ModuleName::Core, temp_dir.path());
        assert_eq!(storage.get(&keys::MOBILE_NUMBER), None);
    }

    #[test]
    fn test_sandbox_write_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("capture.jpg");
        fs::write(&source, b"jpeg bytes").unwrap();

        let files = SandboxFileStorage::new(ModuleName::Fourthline, &temp_dir.path().join("files"));
        let url = Url::from_file_path(&source).unwrap();
        let stored = files.write(&url, "selfie.jpg").unwrap();

        assert_eq!(stored, temp_dir.path().join("files/fourthline/selfie.jpg"));
        assert_eq!(fs::read(&stored).unwrap(), b"jpeg bytes");

        files.clear().unwrap();
        assert!(!files.root().exists());
        // 再清一次也不算錯誤
        files.clear().unwrap();
    }

    #[test]
    fn test_sandbox_rejects_escaping_file_names() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("capture.jpg");
        fs::write(&source, b"x").unwrap();
        let url = Url::from_file_path(&source).unwrap();

        let files = SandboxFileStorage::new(ModuleName::Bank, temp_dir.path());
        assert!(files.write(&url, "../core/stolen.jpg").is_err());
        assert!(files.write(&url, "nested/dir.jpg").is_err());
        assert!(files.write(&url, "").is_err());
    }

    #[test]
    fn test_sandbox_rejects_remote_sources() {
        let temp_dir = TempDir::new().unwrap();
        let files = SandboxFileStorage::new(ModuleName::Qes, temp_dir.path());
        let url = Url::parse("https://example.com/document.pdf").unwrap();

        match files.write(&url, "document.pdf") {
            Err(IdentError::StorageError { module, .. }) => assert_eq!(module, ModuleName::Qes),
            other => panic!("expected storage error, got {:?}", other),
        }
    }
}
