use super::{
    QesCoordinatorFactory, QesEvent, QesFlow, QesInput, QesOutput, QesScreenInput,
    QesShowableFactory, QesStep, QES_MODULE_SYMBOL,
};
use crate::core::coordinator::{FlowCallback, FlowCoordinator, FlowDriver, FlowError, FlowPhase};
use crate::core::module::{Module, ModuleServiceLocator};
use crate::core::registry::ModuleRegistry;
use crate::domain::model::{keys, IdentificationStep, ModuleName};
use crate::domain::ports::ShowableRef;
use std::any::Any;
use std::sync::Arc;

pub struct QesModule {
    locator: ModuleServiceLocator,
}

impl QesModule {
    /// 把 QES 模組掛到登錄表上
    pub fn register(registry: &ModuleRegistry) {
        registry.register(QES_MODULE_SYMBOL, construct);
    }
}

fn construct(locator: ModuleServiceLocator) -> Box<dyn Any + Send> {
    let factory: Arc<dyn QesCoordinatorFactory> = Arc::new(QesModule::new(locator));
    Box::new(factory)
}

impl Module for QesModule {
    const NAME: ModuleName = ModuleName::Qes;

    fn new(locator: ModuleServiceLocator) -> Self {
        Self { locator }
    }
}

impl QesCoordinatorFactory for QesModule {
    fn make_qes_coordinator(&self, screens: Arc<dyn QesShowableFactory>) -> Box<QesFlow> {
        Box::new(QesCoordinator::new(self.locator.clone(), screens))
    }
}

pub struct QesCoordinator {
    locator: ModuleServiceLocator,
    screens: Arc<dyn QesShowableFactory>,
    driver: FlowDriver<QesEvent, QesOutput>,
    step: Option<QesStep>,
    active: Option<ShowableRef>,
}

impl QesCoordinator {
    pub fn new(locator: ModuleServiceLocator, screens: Arc<dyn QesShowableFactory>) -> Self {
        Self {
            locator,
            screens,
            driver: FlowDriver::new(ModuleName::Qes),
            step: None,
            active: None,
        }
    }

    pub fn current_step(&self) -> Option<QesStep> {
        self.step
    }

    fn show(&mut self, step: QesStep, push: bool) -> Option<ShowableRef> {
        let input = QesScreenInput {
            identification_uid: self
                .locator
                .storage
                .get(&keys::IDENTIFICATION_UID)
                .unwrap_or_default(),
        };
        let events = self.driver.sink();
        let (screen, showable) = match step {
            QesStep::DocumentsOverview => (
                "documents_overview",
                self.screens.make_documents_overview(input, events),
            ),
            QesStep::SignDocuments => (
                "sign_documents",
                self.screens.make_sign_documents(input, events),
            ),
        };

        let Some(showable) = showable else {
            tracing::error!("❌ QES screen '{}' could not be created", screen);
            self.driver.finish(Err(FlowError::ScreenUnavailable { screen }));
            return None;
        };

        tracing::debug!("QES flow entering {:?}", step);
        self.step = Some(step);
        self.active = Some(Arc::clone(&showable));
        if push {
            self.locator.presenter.push(Arc::clone(&showable), true);
        }
        Some(showable)
    }

    fn hand_off(&mut self, step: IdentificationStep) {
        tracing::info!("➡️ QES flow hands off to {}", step);
        let identification_uid = self
            .locator
            .storage
            .get(&keys::IDENTIFICATION_UID)
            .unwrap_or_default();
        self.driver.finish(Ok(QesOutput::NextStep {
            step,
            identification_uid,
        }));
    }
}

impl FlowCoordinator for QesCoordinator {
    type Input = QesInput;
    type Output = QesOutput;
    type Event = QesEvent;

    fn start(&mut self, input: QesInput, callback: FlowCallback<QesOutput>) -> Option<ShowableRef> {
        if !self.driver.begin(callback) {
            return None;
        }
        if let Err(e) = self
            .locator
            .storage
            .set(&keys::IDENTIFICATION_UID, Some(input.identification_uid))
        {
            tracing::warn!("⚠️ Could not persist QES context: {}", e);
        }
        self.show(input.step, false)
    }

    fn handle_event(&mut self, event: QesEvent) {
        let Some(event) = self.driver.admit(event, || QesOutput::Abort) else {
            return;
        };

        match (event, self.step) {
            (QesEvent::DocumentsAccepted, Some(QesStep::DocumentsOverview)) => {
                self.show(QesStep::SignDocuments, true);
            }
            (QesEvent::Signed { identification_token }, Some(QesStep::SignDocuments)) => {
                tracing::info!("✅ Documents signed");
                self.driver
                    .finish(Ok(QesOutput::Confirmed { identification_token }));
            }
            (QesEvent::NextStep(step), _) => self.hand_off(step),
            (QesEvent::Failure(error), _) => {
                tracing::info!("QES flow failed: {}", error);
                self.driver.finish(Err(FlowError::Api(error)));
            }
            (QesEvent::Quit, _) => self.driver.request_quit(self.locator.alerts.as_ref()),
            (event, step) => {
                tracing::warn!("⚠️ Ignoring QES event {:?} during {:?}", event, step);
            }
        }
    }

    fn flow_driver(&mut self) -> &mut FlowDriver<QesEvent, QesOutput> {
        &mut self.driver
    }

    fn phase(&self) -> FlowPhase {
        self.driver.phase()
    }
}
