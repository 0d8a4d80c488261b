use crate::core::coordinator::{
    EventSink, FlowCallback, FlowCoordinator, FlowDriver, FlowError, FlowEvent, FlowPhase,
};
use crate::core::module::{Module, ModuleServiceLocator};
use crate::domain::model::{keys, ApiError, IdentificationStep, ModuleName};
use crate::domain::ports::ShowableRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreStep {
    TermsAndConditions,
    PhoneVerification,
    PhoneConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreInput {
    pub step: CoreStep,
    pub identification_uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreOutput {
    NextStep {
        step: IdentificationStep,
        identification_uid: String,
    },
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    TermsAccepted,
    PhoneNumberSubmitted { phone_number: String },
    /// 後端確認手機號碼，並告知下一個步驟
    PhoneConfirmed { next_step: IdentificationStep },
    NextStep(IdentificationStep),
    Failure(ApiError),
    Quit,
    QuitDecision(bool),
}

impl FlowEvent for CoreEvent {
    fn quit_decision(confirmed: bool) -> Self {
        CoreEvent::QuitDecision(confirmed)
    }

    fn as_quit_decision(&self) -> Option<bool> {
        match self {
            CoreEvent::QuitDecision(confirmed) => Some(*confirmed),
            _ => None,
        }
    }

    fn is_quit_request(&self) -> bool {
        matches!(self, CoreEvent::Quit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreScreenInput {
    pub identification_uid: String,
    pub phone_number: Option<String>,
}

pub trait CoreShowableFactory: Send + Sync {
    fn make_terms_and_conditions(
        &self,
        input: CoreScreenInput,
        events: EventSink<CoreEvent>,
    ) -> Option<ShowableRef>;

    fn make_phone_verification(
        &self,
        input: CoreScreenInput,
        events: EventSink<CoreEvent>,
    ) -> Option<ShowableRef>;

    fn make_phone_confirmation(
        &self,
        input: CoreScreenInput,
        events: EventSink<CoreEvent>,
    ) -> Option<ShowableRef>;
}

pub trait CoreCoordinatorFactory: Send + Sync {
    fn make_core_coordinator(&self, screens: Arc<dyn CoreShowableFactory>) -> CoreCoordinator;
}

pub struct CoreModule {
    locator: ModuleServiceLocator,
}

impl Module for CoreModule {
    const NAME: ModuleName = ModuleName::Core;

    fn new(locator: ModuleServiceLocator) -> Self {
        Self { locator }
    }
}

impl CoreCoordinatorFactory for CoreModule {
    fn make_core_coordinator(&self, screens: Arc<dyn CoreShowableFactory>) -> CoreCoordinator {
        CoreCoordinator::new(self.locator.clone(), screens)
    }
}

/// 條款同意與手機驗證流程
pub struct CoreCoordinator {
    locator: ModuleServiceLocator,
    screens: Arc<dyn CoreShowableFactory>,
    driver: FlowDriver<CoreEvent, CoreOutput>,
    step: Option<CoreStep>,
    active: Option<ShowableRef>,
}

impl CoreCoordinator {
    pub fn new(locator: ModuleServiceLocator, screens: Arc<dyn CoreShowableFactory>) -> Self {
        Self {
            locator,
            screens,
            driver: FlowDriver::new(ModuleName::Core),
            step: None,
            active: None,
        }
    }

    pub fn current_step(&self) -> Option<CoreStep> {
        self.step
    }

    fn screen_input(&self) -> CoreScreenInput {
        CoreScreenInput {
            identification_uid: self
                .locator
                .storage
                .get(&keys::IDENTIFICATION_UID)
                .unwrap_or_default(),
            phone_number: self.locator.storage.get(&keys::MOBILE_NUMBER),
        }
    }

    fn show(&mut self, step: CoreStep, push: bool) -> Option<ShowableRef> {
        let input = self.screen_input();
        let events = self.driver.sink();
        let (screen, showable) = match step {
            CoreStep::TermsAndConditions => (
                "terms_and_conditions",
                self.screens.make_terms_and_conditions(input, events),
            ),
            CoreStep::PhoneVerification => (
                "phone_verification",
                self.screens.make_phone_verification(input, events),
            ),
            CoreStep::PhoneConfirmation => (
                "phone_confirmation",
                self.screens.make_phone_confirmation(input, events),
            ),
        };

        let Some(showable) = showable else {
            tracing::error!("❌ Core screen '{}' could not be created", screen);
            self.driver.finish(Err(FlowError::ScreenUnavailable { screen }));
            return None;
        };

        tracing::debug!("Core flow entering {:?}", step);
        self.step = Some(step);
        self.active = Some(Arc::clone(&showable));
        if push {
            self.locator.presenter.push(Arc::clone(&showable), true);
        }
        Some(showable)
    }

    fn hand_off(&mut self, step: IdentificationStep) {
        tracing::info!("➡️ Core flow hands off to {}", step);
        let identification_uid = self
            .locator
            .storage
            .get(&keys::IDENTIFICATION_UID)
            .unwrap_or_default();
        self.driver.finish(Ok(CoreOutput::NextStep {
            step,
            identification_uid,
        }));
    }
}

impl FlowCoordinator for CoreCoordinator {
    type Input = CoreInput;
    type Output = CoreOutput;
    type Event = CoreEvent;

    fn start(&mut self, input: CoreInput, callback: FlowCallback<CoreOutput>) -> Option<ShowableRef> {
        if !self.driver.begin(callback) {
            return None;
        }
        if let Err(e) = self
            .locator
            .storage
            .set(&keys::IDENTIFICATION_UID, Some(input.identification_uid))
        {
            tracing::warn!("⚠️ Could not persist core context: {}", e);
        }
        self.show(input.step, false)
    }

    fn handle_event(&mut self, event: CoreEvent) {
        let Some(event) = self.driver.admit(event, || CoreOutput::Abort) else {
            return;
        };

        match (event, self.step) {
            (CoreEvent::TermsAccepted, Some(CoreStep::TermsAndConditions)) => {
                self.show(CoreStep::PhoneVerification, true);
            }
            (CoreEvent::PhoneNumberSubmitted { phone_number }, Some(CoreStep::PhoneVerification)) => {
                if let Err(e) = self
                    .locator
                    .storage
                    .set(&keys::MOBILE_NUMBER, Some(phone_number))
                {
                    tracing::warn!("⚠️ Could not persist phone number: {}", e);
                }
                self.show(CoreStep::PhoneConfirmation, true);
            }
            (CoreEvent::PhoneConfirmed { next_step }, Some(CoreStep::PhoneConfirmation)) => {
                self.hand_off(next_step)
            }
            (CoreEvent::NextStep(step), _) => self.hand_off(step),
            (CoreEvent::Failure(error), _) => {
                tracing::info!("Core flow failed: {}", error);
                self.driver.finish(Err(FlowError::Api(error)));
            }
            (CoreEvent::Quit, _) => self.driver.request_quit(self.locator.alerts.as_ref()),
            (event, step) => {
                tracing::warn!("⚠️ Ignoring core event {:?} during {:?}", event, step);
            }
        }
    }

    fn flow_driver(&mut self) -> &mut FlowDriver<CoreEvent, CoreOutput> {
        &mut self.driver
    }

    fn phase(&self) -> FlowPhase {
        self.driver.phase()
    }
}
