use anyhow::Result;
use httpmock::prelude::*;
use identhub_flow::adapters::{FixedAnswerAlerts, HttpNetworkClient, TracingPresenter};
use identhub_flow::app::modules::bank::{
    BankEvent, BankShowableFactory, IbanScreenInput, PaymentScreenInput,
};
use identhub_flow::app::modules::core_flow::{CoreEvent, CoreScreenInput, CoreShowableFactory};
use identhub_flow::app::modules::fourthline::{
    DocumentCapture, DocumentType, FourthlineEvent, FourthlineScreenInput,
    FourthlineShowableFactory, KycSession, SelfieCapture,
};
use identhub_flow::app::modules::qes::{
    QesCoordinatorFactory, QesEvent, QesScreenInput, QesShowableFactory,
};
use identhub_flow::app::session::SessionCompletion;
use identhub_flow::core::{EventSink, ModuleFactory, ModulesStorageManager, ResolverContext};
use identhub_flow::core::{ModuleServiceLocator, RuntimeModuleFactory};
use identhub_flow::domain::model::{keys, ApiError, IdentificationStep, ModuleName};
use identhub_flow::domain::ports::{Showable, ShowableRef};
use identhub_flow::{
    Configuration, IdentError, IdentHub, IdentificationMethod, ModuleRegistry, ScreenFactories,
    SessionOutcome,
};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

struct Named(&'static str);

impl Showable for Named {
    fn name(&self) -> &str {
        self.0
    }
}

fn named(name: &'static str) -> Option<ShowableRef> {
    Some(Arc::new(Named(name)))
}

/// 主機端畫面的替身：只保留最新的事件通道
#[derive(Default)]
struct HostScreens {
    bank: Mutex<Option<EventSink<BankEvent>>>,
    fourthline: Mutex<Option<EventSink<FourthlineEvent>>>,
    built: Mutex<Vec<&'static str>>,
    uploads: Mutex<Vec<KycSession>>,
}

impl HostScreens {
    fn bank(&self) -> EventSink<BankEvent> {
        self.bank.lock().unwrap().clone().expect("bank screen")
    }

    fn fourthline(&self) -> EventSink<FourthlineEvent> {
        self.fourthline.lock().unwrap().clone().expect("fourthline screen")
    }

    fn bank_screen(&self, name: &'static str, events: EventSink<BankEvent>) -> Option<ShowableRef> {
        self.built.lock().unwrap().push(name);
        *self.bank.lock().unwrap() = Some(events);
        named(name)
    }

    fn fourthline_screen(
        &self,
        name: &'static str,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef> {
        self.built.lock().unwrap().push(name);
        *self.fourthline.lock().unwrap() = Some(events);
        named(name)
    }
}

impl CoreShowableFactory for HostScreens {
    fn make_terms_and_conditions(
        &self,
        _input: CoreScreenInput,
        _events: EventSink<CoreEvent>,
    ) -> Option<ShowableRef> {
        None
    }

    fn make_phone_verification(
        &self,
        _input: CoreScreenInput,
        _events: EventSink<CoreEvent>,
    ) -> Option<ShowableRef> {
        None
    }

    fn make_phone_confirmation(
        &self,
        _input: CoreScreenInput,
        _events: EventSink<CoreEvent>,
    ) -> Option<ShowableRef> {
        None
    }
}

impl BankShowableFactory for HostScreens {
    fn make_iban_verification(
        &self,
        _input: IbanScreenInput,
        events: EventSink<BankEvent>,
    ) -> Option<ShowableRef> {
        self.bank_screen("iban", events)
    }

    fn make_payment_verification(
        &self,
        _input: PaymentScreenInput,
        events: EventSink<BankEvent>,
    ) -> Option<ShowableRef> {
        self.bank_screen("payment", events)
    }
}

impl FourthlineShowableFactory for HostScreens {
    fn make_welcome(
        &self,
        _input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef> {
        self.fourthline_screen("welcome", events)
    }

    fn make_document_picker(
        &self,
        _input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef> {
        self.fourthline_screen("document_picker", events)
    }

    fn make_document_scanner(
        &self,
        _input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef> {
        self.fourthline_screen("document_scanner", events)
    }

    fn make_selfie(
        &self,
        _input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef> {
        self.fourthline_screen("selfie", events)
    }

    fn make_upload(
        &self,
        session: KycSession,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef> {
        self.uploads.lock().unwrap().push(session);
        self.fourthline_screen("upload", events)
    }

    fn make_result(
        &self,
        _input: FourthlineScreenInput,
        events: EventSink<FourthlineEvent>,
    ) -> Option<ShowableRef> {
        self.fourthline_screen("result", events)
    }
}

impl QesShowableFactory for HostScreens {
    fn make_documents_overview(
        &self,
        _input: QesScreenInput,
        _events: EventSink<QesEvent>,
    ) -> Option<ShowableRef> {
        None
    }

    fn make_sign_documents(
        &self,
        _input: QesScreenInput,
        _events: EventSink<QesEvent>,
    ) -> Option<ShowableRef> {
        None
    }
}

fn hub(
    server: &MockServer,
    temp_dir: &TempDir,
    factory: Arc<dyn ModuleFactory>,
) -> Result<IdentHub> {
    let network =
        HttpNetworkClient::new(&server.base_url(), "session-token", Duration::from_secs(5))?;
    let context = ResolverContext {
        network: Arc::new(network),
        configuration: Configuration::default().shared(),
        storage_manager: Arc::new(ModulesStorageManager::new(temp_dir.path())),
        presenter: Arc::new(TracingPresenter),
        alerts: Arc::new(FixedAnswerAlerts::new(true)),
    };
    Ok(IdentHub::new(context, factory))
}

fn capture(dir: &Path, name: &str) -> Result<Url> {
    let path = dir.join(name);
    std::fs::write(&path, b"image-bytes")?;
    Ok(Url::from_file_path(path).expect("absolute path"))
}

type Outcomes = Rc<RefCell<Vec<identhub_flow::Result<SessionOutcome>>>>;

fn outcomes() -> (SessionCompletion, Outcomes) {
    let results: Outcomes = Rc::new(RefCell::new(Vec::new()));
    let sink = results.clone();
    (Box::new(move |result| sink.borrow_mut().push(result)), results)
}

fn screen_factories(screens: &Arc<HostScreens>) -> ScreenFactories {
    ScreenFactories {
        core: screens.clone(),
        bank: screens.clone(),
        fourthline: screens.clone(),
        qes: screens.clone(),
    }
}

/// 模組不存在的工廠
struct NoQes;

impl ModuleFactory for NoQes {
    fn make_qes(
        &self,
        _locator: ModuleServiceLocator,
    ) -> Option<Arc<dyn QesCoordinatorFactory>> {
        None
    }
}

/// 完整流程：
/// 1. 從後端取得驗證方式 (bank/iban，後備 fourthline/simplified)
/// 2. IBAN 被拒絕、重試用完後交棒給 Fourthline
/// 3. 證件與自拍存入 Fourthline 沙盒
/// 4. 驗證完成，最後清除所有資料
#[test]
fn test_bank_falls_back_to_fourthline_and_completes() -> Result<()> {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/identification_method")
            .header("Authorization", "Bearer session-token");
        then.status(200).json_body(serde_json::json!({
            "first_step": "bank/iban",
            "fallback_step": "fourthline/simplified",
            "retries": 1
        }));
    });

    let temp_dir = TempDir::new()?;
    let hub = hub(&server, &temp_dir, Arc::new(NoQes))?;
    let method = tokio_test::block_on(hub.load_identification_method())?;
    api_mock.assert();
    assert_eq!(method.fallback_step, Some(IdentificationStep::Fourthline));

    let screens = Arc::new(HostScreens::default());
    let mut session = hub.session(screen_factories(&screens));
    let (done, results) = outcomes();

    let first = session.start(method, "uid-42", done);
    assert_eq!(first.map(|s| s.name().to_string()), Some("iban".to_string()));

    screens.bank().send(BankEvent::IbanRejected);
    session.dispatch_pending();
    assert_eq!(session.active_module(), Some(ModuleName::Fourthline));

    let bank_storage = hub.context().storage_manager.storage(ModuleName::Bank);
    assert_eq!(bank_storage.get(&keys::RETRIES_COUNT), Some(0));

    let fourthline = screens.fourthline();
    fourthline.send(FourthlineEvent::WelcomeConfirmed);
    fourthline.send(FourthlineEvent::DocumentSelected(DocumentType::IdCard));
    fourthline.send(FourthlineEvent::DocumentScanned(DocumentCapture {
        document_type: DocumentType::IdCard,
        number: Some("T22000129".to_string()),
        front: capture(temp_dir.path(), "front.jpg")?,
        back: Some(capture(temp_dir.path(), "back.jpg")?),
    }));
    fourthline.send(FourthlineEvent::SelfieCaptured(SelfieCapture {
        image: capture(temp_dir.path(), "selfie.png")?,
    }));
    fourthline.send(FourthlineEvent::UploadFinished);
    fourthline.send(FourthlineEvent::VerificationResult { next_step: None });
    session.dispatch_pending();

    assert!(session.is_finished());
    {
        let results = results.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &SessionOutcome::Completed {
                identification_uid: "uid-42".to_string()
            }
        );
    }
    assert_eq!(
        *screens.built.lock().unwrap(),
        vec![
            "iban",
            "welcome",
            "document_picker",
            "document_scanner",
            "selfie",
            "upload",
            "result"
        ]
    );

    let uploads = screens.uploads.lock().unwrap();
    let selfie = uploads[0].selfie.clone().expect("selfie stored");
    assert!(selfie.starts_with(temp_dir.path().join("files").join("fourthline")));
    assert!(selfie.exists());

    let report = hub.clear_all_data();
    assert!(report.is_complete());
    assert!(!selfie.exists());
    assert!(!bank_storage.contains(&keys::RETRIES_COUNT));
    Ok(())
}

#[test]
fn test_backend_method_needing_missing_qes_is_rejected() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/identification_method");
        then.status(200).json_body(serde_json::json!({
            "first_step": "bank/qes",
            "fallback_step": "fourthline_signing"
        }));
    });

    let temp_dir = TempDir::new()?;
    let hub = hub(&server, &temp_dir, Arc::new(NoQes))?;
    let method = tokio_test::block_on(hub.load_identification_method())?;

    let screens = Arc::new(HostScreens::default());
    let mut session = hub.session(screen_factories(&screens));
    let (done, results) = outcomes();
    assert!(session.start(method, "uid-43", done).is_none());

    let results = results.borrow();
    assert!(matches!(
        results[0],
        Err(IdentError::UnsupportedConfiguration {
            step: IdentificationStep::BankQes
        })
    ));
    assert!(screens.built.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_global_registry_provides_qes_when_compiled_in() -> Result<()> {
    let server = MockServer::start();
    let temp_dir = TempDir::new()?;
    identhub_flow::register_optional_modules(&ModuleRegistry::global());

    let hub = hub(&server, &temp_dir, Arc::new(RuntimeModuleFactory::global()))?;
    assert_eq!(
        hub.resolver().is_available(ModuleName::Qes),
        cfg!(feature = "qes")
    );

    let method = IdentificationMethod::new(IdentificationStep::Qes, None);
    assert_eq!(method.required_modules().len(), 1);
    Ok(())
}

#[test]
fn test_expired_session_token_surfaces_api_error() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/identification_method");
        then.status(403);
    });

    let temp_dir = TempDir::new()?;
    let hub = hub(&server, &temp_dir, Arc::new(NoQes))?;
    let err = tokio_test::block_on(hub.load_identification_method()).unwrap_err();

    assert!(matches!(
        err,
        IdentError::ApiError(ApiError::AuthorizationFailed)
    ));
    assert!(!hub
        .context()
        .storage_manager
        .storage(ModuleName::Core)
        .contains(&keys::IDENTIFICATION_METHOD));
    Ok(())
}
