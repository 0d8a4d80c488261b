use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;

/// SDK 內的功能模組名稱，同時作為儲存分區的鍵
///
/// 字串值會寫到磁碟上（資料夾名稱與 key/value suite 名稱），不可更改。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleName {
    Core,
    Qes,
    Fourthline,
    Bank,
}

impl ModuleName {
    pub const ALL: [ModuleName; 4] = [
        ModuleName::Core,
        ModuleName::Qes,
        ModuleName::Fourthline,
        ModuleName::Bank,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleName::Core => "core",
            ModuleName::Qes => "qes",
            ModuleName::Fourthline => "fourthline",
            ModuleName::Bank => "bank",
        }
    }

    /// Position in [`ModuleName::ALL`].
    pub fn index(&self) -> usize {
        match self {
            ModuleName::Core => 0,
            ModuleName::Qes => 1,
            ModuleName::Fourthline => 2,
            ModuleName::Bank => 3,
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 跨模組的流程步驟詞彙
///
/// 無法辨識的字串一律解碼為 [`IdentificationStep::Unspecified`]，
/// 讓舊版 SDK 遇到後端新增的步驟時不會解碼失敗。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentificationStep {
    MobileNumber,
    BankIban,
    BankId,
    BankQes,
    BankIdQes,
    BankIdFourthline,
    Fourthline,
    FourthlineQes,
    FourthlineSigning,
    Qes,
    PartnerFallback,
    Abort,
    Unspecified,
}

impl IdentificationStep {
    pub const ALL: [IdentificationStep; 13] = [
        IdentificationStep::MobileNumber,
        IdentificationStep::BankIban,
        IdentificationStep::BankId,
        IdentificationStep::BankQes,
        IdentificationStep::BankIdQes,
        IdentificationStep::BankIdFourthline,
        IdentificationStep::Fourthline,
        IdentificationStep::FourthlineQes,
        IdentificationStep::FourthlineSigning,
        IdentificationStep::Qes,
        IdentificationStep::PartnerFallback,
        IdentificationStep::Abort,
        IdentificationStep::Unspecified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentificationStep::MobileNumber => "mobile_number",
            IdentificationStep::BankIban => "bank/iban",
            IdentificationStep::BankId => "bank_id/iban",
            IdentificationStep::BankQes => "bank/qes",
            IdentificationStep::BankIdQes => "bank_id/qes",
            IdentificationStep::BankIdFourthline => "bank_id/fourthline",
            IdentificationStep::Fourthline => "fourthline/simplified",
            IdentificationStep::FourthlineQes => "fourthline/qes",
            IdentificationStep::FourthlineSigning => "fourthline_signing",
            IdentificationStep::Qes => "qes",
            IdentificationStep::PartnerFallback => "partner_fallback",
            IdentificationStep::Abort => "abort",
            IdentificationStep::Unspecified => "unspecified",
        }
    }

    /// 執行此步驟需要哪些模組
    pub fn required_modules(&self) -> BTreeSet<ModuleName> {
        use IdentificationStep::*;
        let modules: &[ModuleName] = match self {
            MobileNumber => &[ModuleName::Core],
            BankIban | BankId => &[ModuleName::Bank],
            BankQes | BankIdQes => &[ModuleName::Bank, ModuleName::Qes],
            BankIdFourthline => &[ModuleName::Bank, ModuleName::Fourthline],
            Fourthline | FourthlineSigning => &[ModuleName::Fourthline],
            FourthlineQes => &[ModuleName::Fourthline, ModuleName::Qes],
            Qes => &[ModuleName::Qes],
            PartnerFallback | Abort | Unspecified => &[],
        };
        modules.iter().copied().collect()
    }
}

impl FromStr for IdentificationStep {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IdentificationStep::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .unwrap_or(IdentificationStep::Unspecified))
    }
}

impl fmt::Display for IdentificationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for IdentificationStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IdentificationStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let step = raw.parse().unwrap_or(IdentificationStep::Unspecified);
        if step == IdentificationStep::Unspecified && raw != "unspecified" {
            tracing::debug!("Unknown identification step '{}', treating as unspecified", raw);
        }
        Ok(step)
    }
}

/// 後端宣告的驗證方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationMethod {
    pub first_step: IdentificationStep,
    #[serde(default)]
    pub fallback_step: Option<IdentificationStep>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub provider: Option<String>,
}

impl IdentificationMethod {
    pub fn new(first_step: IdentificationStep, fallback_step: Option<IdentificationStep>) -> Self {
        Self {
            first_step,
            fallback_step,
            retries: 0,
            provider: None,
        }
    }

    /// 執行 first_step 與 fallback_step 所需的模組聯集
    pub fn required_modules(&self) -> BTreeSet<ModuleName> {
        let mut modules = self.first_step.required_modules();
        if let Some(fallback) = self.fallback_step {
            modules.extend(fallback.required_modules());
        }
        modules
    }
}

/// 帶型別的儲存鍵，值型別在編譯期決定
pub struct StorageKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> StorageKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StorageKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StorageKey<T> {}

impl<T> fmt::Debug for StorageKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StorageKey").field(&self.name).finish()
    }
}

/// Keys shared by more than one module's screens.
pub mod keys {
    use super::{IdentificationStep, StorageKey};

    pub const IDENTIFICATION_UID: StorageKey<String> = StorageKey::new("identificationUID");
    pub const IDENTIFICATION_STEP: StorageKey<IdentificationStep> =
        StorageKey::new("identificationStep");
    pub const RETRIES_COUNT: StorageKey<u32> = StorageKey::new("retriesCount");
    pub const FALLBACK_IDENT_STEP: StorageKey<IdentificationStep> =
        StorageKey::new("fallbackIdentStep");
    pub const MOBILE_NUMBER: StorageKey<String> = StorageKey::new("mobileNumber");
    pub const IDENTIFICATION_METHOD: StorageKey<super::IdentificationMethod> =
        StorageKey::new("identificationMethod");
}

/// 後端 API 錯誤，協調器只負責原封不動地往上傳遞
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    #[error("server error")]
    ServerError,
    #[error("authorization failed")]
    AuthorizationFailed,
    #[error("resource not found")]
    ResourceNotFound,
    #[error("request error: {0}")]
    RequestError(String),
    #[error("unexpected response (status {status}): {message}")]
    Unknown { status: u16, message: String },
}

impl ApiError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => ApiError::AuthorizationFailed,
            404 => ApiError::ResourceNotFound,
            500..=599 => ApiError::ServerError,
            _ => ApiError::Unknown {
                status,
                message: message.into(),
            },
        }
    }
}
