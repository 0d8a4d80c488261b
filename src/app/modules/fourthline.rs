use crate::core::coordinator::{
    EventSink, FlowCallback, FlowCoordinator, FlowDriver, FlowError, FlowEvent, FlowPhase,
};
use crate::core::module::{Module, ModuleServiceLocator};
use crate::domain::model::{keys, ApiError, IdentificationStep, ModuleName, StorageKey};
use crate::domain::ports::ShowableRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

const KYC_SESSION: StorageKey<KycSession> = StorageKey::new("kycSession");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FourthlineFlow {
    /// 證件 + 自拍
    Simplified,
    /// 簽署前只需要自拍
    Signing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FourthlineStep {
    Welcome,
    DocumentPicker,
    DocumentScanner,
    Selfie,
    Upload,
    Result,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FourthlineInput {
    pub step: FourthlineStep,
    pub flow: FourthlineFlow,
    pub identification_uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FourthlineOutput {
    Complete {
        identification_uid: String,
    },
    NextStep {
        step: IdentificationStep,
        identification_uid: String,
    },
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    IdCard,
    ResidencePermit,
}

impl DocumentType {
    fn file_prefix(&self) -> &'static str {
        match self {
            DocumentType::Passport => "passport",
            DocumentType::IdCard => "id_card",
            DocumentType::ResidencePermit => "residence_permit",
        }
    }
}

/// 視覺 SDK 掃描後交回的證件影像位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCapture {
    pub document_type: DocumentType,
    pub number: Option<String>,
    pub front: Url,
    pub back: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfieCapture {
    pub image: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub document_type: DocumentType,
    pub number: Option<String>,
    pub front: PathBuf,
    pub back: Option<PathBuf>,
    pub captured_at: DateTime<Utc>,
}

/// 單次驗證 session 蒐集到的 KYC 資料
///
/// 只屬於一個協調器，不是全域容器；重新進入模組時從模組儲存讀回。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycSession {
    pub identification_uid: String,
    pub document: Option<StoredDocument>,
    pub selfie: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl KycSession {
    pub fn new(identification_uid: String) -> Self {
        Self {
            identification_uid,
            document: None,
            selfie: None,
            started_at: Utc::now(),
        }
    }

    pub fn is_ready_for_upload(&self, flow: FourthlineFlow) -> bool {
        match flow {
            FourthlineFlow::Simplified => self.document.is_some() && self.selfie.is_some(),
            FourthlineFlow::Signing => self.selfie.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FourthlineEvent {
    WelcomeConfirmed,
    DocumentSelected(DocumentType),
    DocumentScanned(DocumentCapture),
    SelfieCaptured(SelfieCapture),
    UploadFinished,
    /// `None` 代表驗證完成，沒有後續模組
    VerificationResult { next_step: Option<IdentificationStep> },
    NextStep(IdentificationStep),
    Failure(ApiError),
    Quit,
    QuitDecision(bool),
}

impl FlowEvent for FourthlineEvent {
    fn quit_decision(confirmed: bool) -> Self {
        FourthlineEvent::QuitDecision(confirmed)
    }

    fn as_quit_decision(&self) -> Option<bool> {
        match self {
            FourthlineEvent::QuitDecision(confirmed) => Some(*confirmed),
            _ => None,
        }
    }

    fn is_quit_request(&self) -> bool {
        matches!(self, FourthlineEvent::Quit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FourthlineScreenInput {
    pub identification_uid: String,
    pub flow: FourthlineFlow,
    pub document_type: Option<DocumentType>,
}

pub trait FourthlineShowableFactory: Send + Sync {
    fn make_welcome(
        &self,
        input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef>;

    fn make_document_picker(
        &self,
        input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef>;

    fn make_document_scanner(
        &self,
        input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef>;

    fn make_selfie(
        &self,
        input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef>;

    fn make_upload(
        &self,
        session: KycSession,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef>;

    fn make_result(
        &self,
        input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef>;
}

pub trait FourthlineCoordinatorFactory: Send + Sync {
    fn make_fourthline_coordinator(
        &self,
        screens: Arc<dyn FourthlineShowableFactory>,
    ) -> FourthlineCoordinator;
}

pub struct FourthlineModule {
    locator: ModuleServiceLocator,
}

impl Module for FourthlineModule {
    const NAME: ModuleName = ModuleName::Fourthline;

    fn new(locator: ModuleServiceLocator) -> Self {
        Self { locator }
    }
}

impl FourthlineCoordinatorFactory for FourthlineModule {
    fn make_fourthline_coordinator(
        &self,
        screens: Arc<dyn FourthlineShowableFactory>,
    ) -> FourthlineCoordinator {
        FourthlineCoordinator::new(self.locator.clone(), screens)
    }
}

pub struct FourthlineCoordinator {
    locator: ModuleServiceLocator,
    screens: Arc<dyn FourthlineShowableFactory>,
    driver: FlowDriver<FourthlineEvent, FourthlineOutput>,
    flow: FourthlineFlow,
    step: Option<FourthlineStep>,
    document_type: Option<DocumentType>,
    session: Option<KycSession>,
    active: Option<ShowableRef>,
}

impl FourthlineCoordinator {
    pub fn new(locator: ModuleServiceLocator, screens: Arc<dyn FourthlineShowableFactory>) -> Self {
        Self {
            locator,
            screens,
            driver: FlowDriver::new(ModuleName::Fourthline),
            flow: FourthlineFlow::Simplified,
            step: None,
            document_type: None,
            session: None,
            active: None,
        }
    }

    pub fn current_step(&self) -> Option<FourthlineStep> {
        self.step
    }

    pub fn session(&self) -> Option<&KycSession> {
        self.session.as_ref()
    }

    fn identification_uid(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.identification_uid.clone())
            .unwrap_or_default()
    }

    fn show(&mut self, step: FourthlineStep, push: bool) -> Option<ShowableRef> {
        let input = FourthlineScreenInput {
            identification_uid: self.identification_uid(),
            flow: self.flow,
            document_type: self.document_type,
        };
        let events = self.driver.sink();
        let screens = Arc::clone(&self.screens);
        let (screen, showable) = match step {
            FourthlineStep::Welcome => ("welcome", screens.make_welcome(input, events)),
            FourthlineStep::DocumentPicker => {
                ("document_picker", screens.make_document_picker(input, events))
            }
            FourthlineStep::DocumentScanner => {
                ("document_scanner", screens.make_document_scanner(input, events))
            }
            FourthlineStep::Selfie => ("selfie", screens.make_selfie(input, events)),
            FourthlineStep::Upload => {
                let session = self
                    .session
                    .clone()
                    .unwrap_or_else(|| KycSession::new(input.identification_uid.clone()));
                ("upload", screens.make_upload(session, events))
            }
            FourthlineStep::Result => ("result", screens.make_result(input, events)),
        };

        let Some(showable) = showable else {
            tracing::error!("❌ Fourthline screen '{}' could not be created", screen);
            self.driver.finish(Err(FlowError::ScreenUnavailable { screen }));
            return None;
        };

        tracing::debug!("Fourthline flow entering {:?}", step);
        self.step = Some(step);
        self.active = Some(Arc::clone(&showable));
        if push {
            self.locator.presenter.push(Arc::clone(&showable), true);
        }
        Some(showable)
    }

    fn persist_session(&self) {
        if let Some(session) = &self.session {
            if let Err(e) = self.locator.storage.set(&KYC_SESSION, Some(session.clone())) {
                tracing::warn!("⚠️ Could not persist KYC session: {}", e);
            }
        }
    }

    fn store_capture(&self, source: &Url, name: &str) -> Result<PathBuf, FlowError> {
        let extension = Path::new(source.path())
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("jpg");
        self.locator
            .file_storage
            .write(source, &format!("{}.{}", name, extension))
            .map_err(|e| FlowError::Storage(e.to_string()))
    }

    fn document_scanned(&mut self, capture: DocumentCapture) {
        let prefix = capture.document_type.file_prefix();
        let stored = self
            .store_capture(&capture.front, &format!("{}_front", prefix))
            .and_then(|front| {
                let back = match &capture.back {
                    Some(url) => Some(self.store_capture(url, &format!("{}_back", prefix))?),
                    None => None,
                };
                Ok(StoredDocument {
                    document_type: capture.document_type,
                    number: capture.number.clone(),
                    front,
                    back,
                    captured_at: Utc::now(),
                })
            });

        match stored {
            Ok(document) => {
                if let Some(session) = self.session.as_mut() {
                    session.document = Some(document);
                }
                self.persist_session();
                self.show(FourthlineStep::Selfie, true);
            }
            Err(e) => self.driver.finish(Err(e)),
        }
    }

    fn selfie_captured(&mut self, capture: SelfieCapture) {
        match self.store_capture(&capture.image, "selfie") {
            Ok(path) => {
                if let Some(session) = self.session.as_mut() {
                    session.selfie = Some(path);
                }
                self.persist_session();

                let ready = self
                    .session
                    .as_ref()
                    .map(|s| s.is_ready_for_upload(self.flow))
                    .unwrap_or(false);
                if ready {
                    self.show(FourthlineStep::Upload, true);
                } else {
                    tracing::debug!("KYC data incomplete, asking for a document");
                    self.show(FourthlineStep::DocumentPicker, true);
                }
            }
            Err(e) => self.driver.finish(Err(e)),
        }
    }

    fn finish_with(&mut self, next_step: Option<IdentificationStep>) {
        let identification_uid = self.identification_uid();
        let output = match next_step {
            Some(step) => {
                tracing::info!("➡️ Fourthline flow hands off to {}", step);
                FourthlineOutput::NextStep {
                    step,
                    identification_uid,
                }
            }
            None => {
                tracing::info!("✅ Fourthline verification complete");
                if let Err(e) = self.locator.storage.remove(&KYC_SESSION) {
                    tracing::warn!("⚠️ Could not drop finished KYC session: {}", e);
                }
                FourthlineOutput::Complete { identification_uid }
            }
        };
        self.driver.finish(Ok(output));
    }
}

impl FlowCoordinator for FourthlineCoordinator {
    type Input = FourthlineInput;
    type Output = FourthlineOutput;
    type Event = FourthlineEvent;

    fn start(
        &mut self,
        input: FourthlineInput,
        callback: FlowCallback<FourthlineOutput>,
    ) -> Option<ShowableRef> {
        if !self.driver.begin(callback) {
            return None;
        }
        self.flow = input.flow;

        let session = match self.locator.storage.get(&KYC_SESSION) {
            Some(stored) if stored.identification_uid == input.identification_uid => {
                tracing::debug!("Resuming KYC session for {}", stored.identification_uid);
                stored
            }
            _ => KycSession::new(input.identification_uid.clone()),
        };
        self.document_type = session.document.as_ref().map(|d| d.document_type);
        self.session = Some(session);
        self.persist_session();
        if let Err(e) = self
            .locator
            .storage
            .set(&keys::IDENTIFICATION_UID, Some(input.identification_uid))
        {
            tracing::warn!("⚠️ Could not persist fourthline context: {}", e);
        }

        self.show(input.step, false)
    }

    fn handle_event(&mut self, event: FourthlineEvent) {
        let Some(event) = self.driver.admit(event, || FourthlineOutput::Abort) else {
            return;
        };

        use FourthlineStep as Step;
        match (event, self.step) {
            (FourthlineEvent::WelcomeConfirmed, Some(Step::Welcome)) => {
                self.show(Step::DocumentPicker, true);
            }
            (FourthlineEvent::DocumentSelected(document_type), Some(Step::DocumentPicker)) => {
                self.document_type = Some(document_type);
                self.show(Step::DocumentScanner, true);
            }
            (FourthlineEvent::DocumentScanned(capture), Some(Step::DocumentScanner)) => {
                self.document_scanned(capture)
            }
            (FourthlineEvent::SelfieCaptured(capture), Some(Step::Selfie)) => {
                self.selfie_captured(capture)
            }
            (FourthlineEvent::UploadFinished, Some(Step::Upload)) => {
                self.show(Step::Result, true);
            }
            (FourthlineEvent::VerificationResult { next_step }, Some(Step::Result)) => {
                self.finish_with(next_step)
            }
            (FourthlineEvent::NextStep(step), _) => self.finish_with(Some(step)),
            (FourthlineEvent::Failure(error), _) => {
                tracing::info!("Fourthline flow failed: {}", error);
                self.driver.finish(Err(FlowError::Api(error)));
            }
            (FourthlineEvent::Quit, _) => self.driver.request_quit(self.locator.alerts.as_ref()),
            (event, step) => {
                tracing::warn!("⚠️ Ignoring fourthline event {:?} during {:?}", event, step);
            }
        }
    }

    fn flow_driver(&mut self) -> &mut FlowDriver<FourthlineEvent, FourthlineOutput> {
        &mut self.driver
    }

    fn phase(&self) -> FlowPhase {
        self.driver.phase()
    }
}
