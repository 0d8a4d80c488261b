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
pub enum BankVerificationStep {
    Iban,
    Payment,
}

/// Bank 模組的進入點
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankStep {
    BankVerification(BankVerificationStep),
    /// 回到 Bank 模組時直接把流程交給下一個模組
    NextStep(IdentificationStep),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankInput {
    pub step: BankStep,
    pub retries_count: u32,
    pub fallback_ident_step: Option<IdentificationStep>,
    pub identification_uid: String,
    pub identification_step: Option<IdentificationStep>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankOutput {
    NextStep {
        step: IdentificationStep,
        identification_uid: String,
    },
    Abort,
}

/// 子畫面回報給 Bank 協調器的事件
#[derive(Debug, Clone, PartialEq)]
pub enum BankEvent {
    IbanVerified,
    /// 後端判定 IBAN 不符，消耗一次重試
    IbanRejected,
    PaymentVerified { next_step: IdentificationStep },
    NextStep(IdentificationStep),
    Failure(ApiError),
    Quit,
    QuitDecision(bool),
}

impl FlowEvent for BankEvent {
    fn quit_decision(confirmed: bool) -> Self {
        BankEvent::QuitDecision(confirmed)
    }

    fn as_quit_decision(&self) -> Option<bool> {
        match self {
            BankEvent::QuitDecision(confirmed) => Some(*confirmed),
            _ => None,
        }
    }

    fn is_quit_request(&self) -> bool {
        matches!(self, BankEvent::Quit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IbanScreenInput {
    pub identification_uid: String,
    pub retries_left: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentScreenInput {
    pub identification_uid: String,
}

pub trait BankShowableFactory: Send + Sync {
    fn make_iban_verification(
        &self,
        input: IbanScreenInput,
        events: EventSink<BankEvent>,
    ) -> Option<ShowableRef>;

    fn make_payment_verification(
        &self,
        input: PaymentScreenInput,
        events: EventSink<BankEvent>,
    ) -> Option<ShowableRef>;
}

pub trait BankCoordinatorFactory: Send + Sync {
    fn make_bank_coordinator(&self, screens: Arc<dyn BankShowableFactory>) -> BankCoordinator;
}

pub struct BankModule {
    locator: ModuleServiceLocator,
}

impl Module for BankModule {
    const NAME: ModuleName = ModuleName::Bank;

    fn new(locator: ModuleServiceLocator) -> Self {
        Self { locator }
    }
}

impl BankCoordinatorFactory for BankModule {
    fn make_bank_coordinator(&self, screens: Arc<dyn BankShowableFactory>) -> BankCoordinator {
        BankCoordinator::new(self.locator.clone(), screens)
    }
}

pub struct BankCoordinator {
    locator: ModuleServiceLocator,
    screens: Arc<dyn BankShowableFactory>,
    driver: FlowDriver<BankEvent, BankOutput>,
    step: Option<BankVerificationStep>,
    active: Option<ShowableRef>,
}

impl BankCoordinator {
    pub fn new(locator: ModuleServiceLocator, screens: Arc<dyn BankShowableFactory>) -> Self {
        Self {
            locator,
            screens,
            driver: FlowDriver::new(ModuleName::Bank),
            step: None,
            active: None,
        }
    }

    pub fn current_step(&self) -> Option<BankVerificationStep> {
        self.step
    }

    pub fn active_screen(&self) -> Option<&ShowableRef> {
        self.active.as_ref()
    }

    /// 重新進入 Bank 模組時能接續原本的上下文
    fn persist_context(&self, input: &BankInput) {
        let storage = &self.locator.storage;
        let results = [
            storage.set(&keys::RETRIES_COUNT, Some(input.retries_count)),
            storage.set(&keys::FALLBACK_IDENT_STEP, input.fallback_ident_step),
            storage.set(
                &keys::IDENTIFICATION_UID,
                Some(input.identification_uid.clone()),
            ),
            storage.set(&keys::IDENTIFICATION_STEP, input.identification_step),
        ];
        for result in results {
            if let Err(e) = result {
                tracing::warn!("⚠️ Could not persist bank context: {}", e);
            }
        }
    }

    fn identification_uid(&self) -> String {
        self.locator
            .storage
            .get(&keys::IDENTIFICATION_UID)
            .unwrap_or_default()
    }

    fn show(&mut self, step: BankVerificationStep, push: bool) -> Option<ShowableRef> {
        let identification_uid = self.identification_uid();
        let events = self.driver.sink();
        let (screen, showable) = match step {
            BankVerificationStep::Iban => {
                let retries_left = self.locator.storage.get(&keys::RETRIES_COUNT).unwrap_or(0);
                (
                    "iban_verification",
                    self.screens.make_iban_verification(
                        IbanScreenInput {
                            identification_uid,
                            retries_left,
                        },
                        events,
                    ),
                )
            }
            BankVerificationStep::Payment => (
                "payment_verification",
                self.screens
                    .make_payment_verification(PaymentScreenInput { identification_uid }, events),
            ),
        };

        let Some(showable) = showable else {
            tracing::error!("❌ Bank screen '{}' could not be created", screen);
            self.driver
                .finish(Err(FlowError::ScreenUnavailable { screen }));
            return None;
        };

        tracing::debug!("Bank flow entering {:?}", step);
        self.step = Some(step);
        self.active = Some(Arc::clone(&showable));
        if push {
            self.locator.presenter.push(Arc::clone(&showable), true);
        }
        Some(showable)
    }

    fn hand_off(&mut self, step: IdentificationStep) {
        tracing::info!("➡️ Bank flow hands off to {}", step);
        let identification_uid = self.identification_uid();
        self.driver.finish(Ok(BankOutput::NextStep {
            step,
            identification_uid,
        }));
    }

    fn iban_rejected(&mut self) {
        let storage = &self.locator.storage;
        let retries_left = storage
            .get(&keys::RETRIES_COUNT)
            .unwrap_or(0u32)
            .saturating_sub(1);
        if let Err(e) = storage.set(&keys::RETRIES_COUNT, Some(retries_left)) {
            tracing::warn!("⚠️ Could not persist bank retries: {}", e);
        }

        if retries_left > 0 {
            tracing::debug!("IBAN rejected, {} retries left", retries_left);
            return;
        }

        match storage.get(&keys::FALLBACK_IDENT_STEP) {
            Some(fallback) => self.hand_off(fallback),
            None => self.driver.finish(Err(FlowError::Api(ApiError::RequestError(
                "IBAN verification retries exhausted".to_string(),
            )))),
        }
    }
}

impl FlowCoordinator for BankCoordinator {
    type Input = BankInput;
    type Output = BankOutput;
    type Event = BankEvent;

    fn start(&mut self, input: BankInput, callback: FlowCallback<BankOutput>) -> Option<ShowableRef> {
        if !self.driver.begin(callback) {
            return None;
        }
        self.persist_context(&input);

        match input.step {
            BankStep::NextStep(step) => {
                self.hand_off(step);
                None
            }
            BankStep::BankVerification(step) => self.show(step, false),
        }
    }

    fn handle_event(&mut self, event: BankEvent) {
        let Some(event) = self.driver.admit(event, || BankOutput::Abort) else {
            return;
        };

        match (event, self.step) {
            (BankEvent::IbanVerified, Some(BankVerificationStep::Iban)) => {
                self.show(BankVerificationStep::Payment, true);
            }
            (BankEvent::IbanRejected, Some(BankVerificationStep::Iban)) => self.iban_rejected(),
            (BankEvent::PaymentVerified { next_step }, Some(BankVerificationStep::Payment)) => {
                self.hand_off(next_step)
            }
            (BankEvent::NextStep(step), _) => self.hand_off(step),
            (BankEvent::Failure(error), _) => {
                tracing::info!("Bank flow failed: {}", error);
                self.driver.finish(Err(FlowError::Api(error)));
            }
            (BankEvent::Quit, _) => self.driver.request_quit(self.locator.alerts.as_ref()),
            (event, step) => {
                tracing::warn!("⚠️ Ignoring bank event {:?} during {:?}", event, step);
            }
        }
    }

    fn flow_driver(&mut self) -> &mut FlowDriver<BankEvent, BankOutput> {
        &mut self.driver
    }

    fn phase(&self) -> FlowPhase {
        self.driver.phase()
    }
}
