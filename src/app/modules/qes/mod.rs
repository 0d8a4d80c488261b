//! QES（合格電子簽章）模組的對外契約
//!
//! 契約本身永遠編譯；實作只在 `qes` feature 開啟時存在，
//! 並以 [`QES_MODULE_SYMBOL`] 註冊到 [`crate::core::registry::ModuleRegistry`]。

use crate::core::coordinator::{EventSink, FlowCoordinator, FlowEvent};
use crate::domain::model::{ApiError, IdentificationStep};
use crate::domain::ports::ShowableRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(feature = "qes")]
mod coordinator;

#[cfg(feature = "qes")]
pub use coordinator::{QesCoordinator, QesModule};

/// 解析器與選用模組之間的穩定名稱，不可更改
pub const QES_MODULE_SYMBOL: &str = "IdentHubSDKQES.QESModule";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QesStep {
    DocumentsOverview,
    SignDocuments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QesInput {
    pub step: QesStep,
    pub identification_uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QesOutput {
    Confirmed {
        identification_token: String,
    },
    /// 簽署前後端改派其他步驟時交棒
    NextStep {
        step: IdentificationStep,
        identification_uid: String,
    },
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QesEvent {
    DocumentsAccepted,
    Signed { identification_token: String },
    NextStep(IdentificationStep),
    Failure(ApiError),
    Quit,
    QuitDecision(bool),
}

impl FlowEvent for QesEvent {
    fn quit_decision(confirmed: bool) -> Self {
        QesEvent::QuitDecision(confirmed)
    }

    fn as_quit_decision(&self) -> Option<bool> {
        match self {
            QesEvent::QuitDecision(confirmed) => Some(*confirmed),
            _ => None,
        }
    }

    fn is_quit_request(&self) -> bool {
        matches!(self, QesEvent::Quit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QesScreenInput {
    pub identification_uid: String,
}

pub trait QesShowableFactory: Send + Sync {
    fn make_documents_overview(
        &self,
        input: QesScreenInput,
        events: EventSink<QesEvent>,
    ) -> Option<ShowableRef>;

    fn make_sign_documents(
        &self,
        input: QesScreenInput,
        events: EventSink<QesEvent>,
    ) -> Option<ShowableRef>;
}

pub type QesFlow = dyn FlowCoordinator<Input = QesInput, Output = QesOutput, Event = QesEvent>;

/// 選用模組提供給解析器的能力
pub trait QesCoordinatorFactory: Send + Sync {
    fn make_qes_coordinator(&self, screens: Arc<dyn QesShowableFactory>) -> Box<QesFlow>;
}
