use crate::adapters::HttpNetworkClient;
use crate::app::modules::bank::{
    BankCoordinator, BankCoordinatorFactory, BankInput, BankOutput, BankShowableFactory, BankStep,
    BankVerificationStep,
};
use crate::app::modules::core_flow::{
    CoreCoordinator, CoreCoordinatorFactory, CoreInput, CoreOutput, CoreShowableFactory, CoreStep,
};
use crate::app::modules::fourthline::{
    FourthlineCoordinator, FourthlineCoordinatorFactory, FourthlineFlow, FourthlineInput,
    FourthlineOutput, FourthlineShowableFactory, FourthlineStep,
};
use crate::app::modules::qes::{QesFlow, QesInput, QesOutput, QesShowableFactory, QesStep};
use crate::config::SdkConfig;
use crate::core::coordinator::{run_until_finished, FlowCoordinator, FlowError, FlowPhase};
use crate::core::registry::{ModuleFactory, RuntimeModuleFactory};
use crate::core::resolver::{ModuleResolver, ResolverContext};
use crate::core::storage_manager::{ClearReport, ModulesStorageManager};
use crate::domain::model::{keys, IdentificationMethod, IdentificationStep, ModuleName};
use crate::domain::ports::{AlertsService, NetworkClient, Presenter, ShowableRef};
use crate::utils::error::{IdentError, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// SDK 的組合根：持有共用單例與模組解析器
pub struct IdentHub {
    context: ResolverContext,
    factory: Arc<dyn ModuleFactory>,
    resolver: ModuleResolver,
}

impl IdentHub {
    pub fn new(context: ResolverContext, factory: Arc<dyn ModuleFactory>) -> Self {
        let resolver = ModuleResolver::new(context.clone(), Arc::clone(&factory));
        Self {
            context,
            factory,
            resolver,
        }
    }

    /// 依設定檔建立 HTTP 客戶端與儲存區，選用模組從全域登錄表解析
    pub fn from_config(
        config: &SdkConfig,
        presenter: Arc<dyn Presenter>,
        alerts: Arc<dyn AlertsService>,
    ) -> Result<Self> {
        let network = Arc::new(HttpNetworkClient::from_config(config)?);
        let root = config.storage_root();
        let storage_manager = if config.persist_storage() {
            ModulesStorageManager::new(&root)
        } else {
            ModulesStorageManager::in_memory(&root)
        };

        let context = ResolverContext {
            network,
            configuration: config.configuration().shared(),
            storage_manager: Arc::new(storage_manager),
            presenter,
            alerts,
        };
        Ok(Self::new(context, Arc::new(RuntimeModuleFactory::global())))
    }

    pub fn context(&self) -> &ResolverContext {
        &self.context
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    /// 以目前的 context 重建解析器，丟棄所有已快取的模組
    pub fn update_module_resolver(&mut self) {
        tracing::debug!("Rebuilding module resolver");
        self.resolver = ModuleResolver::new(self.context.clone(), Arc::clone(&self.factory));
    }

    pub fn set_network(&mut self, network: Arc<dyn NetworkClient>) {
        self.context.network = network;
        self.update_module_resolver();
    }

    /// 向後端查詢驗證方式，並記在 core 模組的儲存區
    pub async fn load_identification_method(&self) -> Result<IdentificationMethod> {
        let method = self.context.network.fetch_identification_method().await?;

        let storage = self.context.storage_manager.storage(ModuleName::Core);
        if let Err(e) = storage.set(&keys::IDENTIFICATION_METHOD, Some(method.clone())) {
            tracing::warn!("⚠️ Could not persist identification method: {}", e);
        }
        Ok(method)
    }

    /// 呼叫端必須確保沒有進行中的流程
    pub fn clear_all_data(&self) -> ClearReport {
        self.context.storage_manager.clear_all_data()
    }

    pub fn session(&self, screens: ScreenFactories) -> SessionOrchestrator<'_> {
        SessionOrchestrator::new(&self.resolver, screens)
    }
}

/// 各模組的畫面工廠，由主機端提供
#[derive(Clone)]
pub struct ScreenFactories {
    pub core: Arc<dyn CoreShowableFactory>,
    pub bank: Arc<dyn BankShowableFactory>,
    pub fourthline: Arc<dyn FourthlineShowableFactory>,
    pub qes: Arc<dyn QesShowableFactory>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// 文件已簽署
    Confirmed { identification_token: String },
    /// 驗證完成，不需要簽署
    Completed { identification_uid: String },
    PartnerFallback { identification_uid: String },
    Aborted,
}

pub type SessionCompletion = Box<dyn FnOnce(Result<SessionOutcome>)>;

enum Handoff {
    Next {
        step: IdentificationStep,
        identification_uid: String,
    },
    Outcome(SessionOutcome),
    Failed(FlowError),
}

enum ActiveFlow {
    Core(CoreCoordinator),
    Bank(BankCoordinator),
    Fourthline(FourthlineCoordinator),
    Qes(Box<QesFlow>),
}

impl ActiveFlow {
    fn module(&self) -> ModuleName {
        match self {
            ActiveFlow::Core(_) => ModuleName::Core,
            ActiveFlow::Bank(_) => ModuleName::Bank,
            ActiveFlow::Fourthline(_) => ModuleName::Fourthline,
            ActiveFlow::Qes(_) => ModuleName::Qes,
        }
    }

    fn dispatch_pending(&mut self) -> usize {
        match self {
            ActiveFlow::Core(c) => c.dispatch_pending(),
            ActiveFlow::Bank(c) => c.dispatch_pending(),
            ActiveFlow::Fourthline(c) => c.dispatch_pending(),
            ActiveFlow::Qes(c) => c.dispatch_pending(),
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            ActiveFlow::Core(c) => c.is_finished(),
            ActiveFlow::Bank(c) => c.is_finished(),
            ActiveFlow::Fourthline(c) => c.is_finished(),
            ActiveFlow::Qes(c) => c.is_finished(),
        }
    }

    async fn run_until_finished(&mut self) {
        match self {
            ActiveFlow::Core(c) => run_until_finished(c).await,
            ActiveFlow::Bank(c) => run_until_finished(c).await,
            ActiveFlow::Fourthline(c) => run_until_finished(c).await,
            ActiveFlow::Qes(c) => run_until_finished(c.as_mut()).await,
        }
    }
}

fn deliver(handoffs: &UnboundedSender<Handoff>, result: std::result::Result<Handoff, FlowError>) {
    let handoff = result.unwrap_or_else(Handoff::Failed);
    if handoffs.send(handoff).is_err() {
        tracing::warn!("⚠️ Session is gone, dropping module result");
    }
}

/// 依後端的驗證方式啟動第一個模組，並在模組交棒時解析、啟動下一個
///
/// 每個模組完成時回報 `NextStep` 或終止結果；session 的結果只會交付一次。
pub struct SessionOrchestrator<'a> {
    resolver: &'a ModuleResolver,
    screens: ScreenFactories,
    method: Option<IdentificationMethod>,
    identification_uid: String,
    active: Option<ActiveFlow>,
    handoffs: UnboundedSender<Handoff>,
    pending: UnboundedReceiver<Handoff>,
    completion: Option<SessionCompletion>,
    phase: FlowPhase,
}

impl<'a> SessionOrchestrator<'a> {
    pub fn new(resolver: &'a ModuleResolver, screens: ScreenFactories) -> Self {
        let (handoffs, pending) = mpsc::unbounded_channel();
        Self {
            resolver,
            screens,
            method: None,
            identification_uid: String::new(),
            active: None,
            handoffs,
            pending,
            completion: None,
            phase: FlowPhase::Idle,
        }
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == FlowPhase::Finished
    }

    pub fn active_module(&self) -> Option<ModuleName> {
        self.active.as_ref().map(ActiveFlow::module)
    }

    pub fn start(
        &mut self,
        method: IdentificationMethod,
        identification_uid: impl Into<String>,
        completion: SessionCompletion,
    ) -> Option<ShowableRef> {
        if self.phase != FlowPhase::Idle {
            tracing::error!("❌ Session was started twice; ignoring the second start");
            return None;
        }
        self.phase = FlowPhase::Running;
        self.completion = Some(completion);
        self.identification_uid = identification_uid.into();

        let steps = std::iter::once(method.first_step).chain(method.fallback_step);
        for step in steps {
            if let Some(module) = self.missing_module(step) {
                tracing::warn!(
                    "⚠️ Step {} needs the {} module, which is not available",
                    step,
                    module
                );
                self.finish(Err(IdentError::UnsupportedConfiguration { step }));
                return None;
            }
        }

        tracing::info!("🚀 Starting identification with {}", method.first_step);
        let first_step = method.first_step;
        self.method = Some(method);
        self.route(first_step)
    }

    /// 處理目前模組與交棒佇列中的所有事件，回傳處理數量
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let mut progressed = 0;
            if let Some(flow) = self.active.as_mut() {
                progressed += flow.dispatch_pending();
            }
            while let Ok(handoff) = self.pending.try_recv() {
                self.apply(handoff);
                progressed += 1;
            }
            if progressed == 0 {
                return handled;
            }
            handled += progressed;
        }
    }

    pub async fn run_until_finished(&mut self) {
        loop {
            self.dispatch_pending();
            if self.phase != FlowPhase::Running {
                return;
            }
            match self.active.as_mut() {
                Some(flow) if !flow.is_finished() => flow.run_until_finished().await,
                _ => {
                    tracing::warn!("⚠️ Session has no running module, stopping");
                    return;
                }
            }
        }
    }

    fn missing_module(&self, step: IdentificationStep) -> Option<ModuleName> {
        step.required_modules()
            .into_iter()
            .find(|module| !self.resolver.is_available(*module))
    }

    fn apply(&mut self, handoff: Handoff) {
        if self.phase != FlowPhase::Running {
            tracing::warn!("⚠️ Session already finished, dropping module result");
            return;
        }
        self.active = None;

        match handoff {
            Handoff::Next {
                step,
                identification_uid,
            } => {
                if !identification_uid.is_empty() {
                    self.identification_uid = identification_uid;
                }
                if let Some(first) = self.route(step) {
                    self.resolver.context().presenter.push(first, true);
                }
            }
            Handoff::Outcome(outcome) => self.finish(Ok(outcome)),
            Handoff::Failed(error) => self.finish(Err(error.into())),
        }
    }

    fn finish(&mut self, result: Result<SessionOutcome>) {
        let Some(completion) = self.completion.take() else {
            tracing::warn!("⚠️ Session already delivered its result");
            return;
        };
        match &result {
            Ok(outcome) => tracing::info!("🏁 Session finished: {:?}", outcome),
            Err(e) => tracing::error!("❌ Session failed: {}", e),
        }
        self.phase = FlowPhase::Finished;
        self.active = None;
        completion(result);
    }

    fn route(&mut self, step: IdentificationStep) -> Option<ShowableRef> {
        if let Some(module) = self.missing_module(step) {
            tracing::warn!("⚠️ Cannot continue with {}: {} module missing", step, module);
            self.finish(Err(IdentError::UnsupportedConfiguration { step }));
            return None;
        }

        let identification_uid = self.identification_uid.clone();
        let handoffs = self.handoffs.clone();

        use IdentificationStep::*;
        let (flow, first) = match step {
            MobileNumber => {
                let mut coordinator = self
                    .resolver
                    .core()
                    .make_core_coordinator(Arc::clone(&self.screens.core));
                let first = coordinator.start(
                    CoreInput {
                        step: CoreStep::TermsAndConditions,
                        identification_uid,
                    },
                    Box::new(move |result| {
                        deliver(
                            &handoffs,
                            result.map(|output| match output {
                                CoreOutput::NextStep {
                                    step,
                                    identification_uid,
                                } => Handoff::Next {
                                    step,
                                    identification_uid,
                                },
                                CoreOutput::Abort => Handoff::Outcome(SessionOutcome::Aborted),
                            }),
                        )
                    }),
                );
                (ActiveFlow::Core(coordinator), first)
            }
            BankIban | BankId | BankQes | BankIdQes | BankIdFourthline => {
                let (retries_count, fallback_ident_step) = self
                    .method
                    .as_ref()
                    .map(|m| (m.retries, m.fallback_step))
                    .unwrap_or((0, None));
                let mut coordinator = self
                    .resolver
                    .bank()
                    .make_bank_coordinator(Arc::clone(&self.screens.bank));
                let first = coordinator.start(
                    BankInput {
                        step: BankStep::BankVerification(BankVerificationStep::Iban),
                        retries_count,
                        fallback_ident_step,
                        identification_uid,
                        identification_step: Some(step),
                    },
                    Box::new(move |result| {
                        deliver(
                            &handoffs,
                            result.map(|output| match output {
                                BankOutput::NextStep {
                                    step,
                                    identification_uid,
                                } => Handoff::Next {
                                    step,
                                    identification_uid,
                                },
                                BankOutput::Abort => Handoff::Outcome(SessionOutcome::Aborted),
                            }),
                        )
                    }),
                );
                (ActiveFlow::Bank(coordinator), first)
            }
            Fourthline | FourthlineQes | FourthlineSigning => {
                let (start_step, flow) = if step == FourthlineSigning {
                    (FourthlineStep::Selfie, FourthlineFlow::Signing)
                } else {
                    (FourthlineStep::Welcome, FourthlineFlow::Simplified)
                };
                let mut coordinator = self
                    .resolver
                    .fourthline()
                    .make_fourthline_coordinator(Arc::clone(&self.screens.fourthline));
                let first = coordinator.start(
                    FourthlineInput {
                        step: start_step,
                        flow,
                        identification_uid,
                    },
                    Box::new(move |result| {
                        deliver(
                            &handoffs,
                            result.map(|output| match output {
                                FourthlineOutput::Complete { identification_uid } => {
                                    Handoff::Outcome(SessionOutcome::Completed {
                                        identification_uid,
                                    })
                                }
                                FourthlineOutput::NextStep {
                                    step,
                                    identification_uid,
                                } => Handoff::Next {
                                    step,
                                    identification_uid,
                                },
                                FourthlineOutput::Abort => {
                                    Handoff::Outcome(SessionOutcome::Aborted)
                                }
                            }),
                        )
                    }),
                );
                (ActiveFlow::Fourthline(coordinator), first)
            }
            Qes => {
                let Some(factory) = self.resolver.qes() else {
                    self.finish(Err(IdentError::ModuleUnavailable {
                        module: ModuleName::Qes,
                    }));
                    return None;
                };
                let mut coordinator = factory.make_qes_coordinator(Arc::clone(&self.screens.qes));
                let first = coordinator.start(
                    QesInput {
                        step: QesStep::DocumentsOverview,
                        identification_uid,
                    },
                    Box::new(move |result| {
                        deliver(
                            &handoffs,
                            result.map(|output| match output {
                                QesOutput::Confirmed {
                                    identification_token,
                                } => Handoff::Outcome(SessionOutcome::Confirmed {
                                    identification_token,
                                }),
                                QesOutput::NextStep {
                                    step,
                                    identification_uid,
                                } => Handoff::Next {
                                    step,
                                    identification_uid,
                                },
                                QesOutput::Abort => Handoff::Outcome(SessionOutcome::Aborted),
                            }),
                        )
                    }),
                );
                (ActiveFlow::Qes(coordinator), first)
            }
            PartnerFallback => {
                tracing::info!("↩️ Handing over to the partner fallback");
                self.finish(Ok(SessionOutcome::PartnerFallback { identification_uid }));
                return None;
            }
            Abort => {
                self.finish(Ok(SessionOutcome::Aborted));
                return None;
            }
            Unspecified => {
                self.finish(Err(IdentError::UnsupportedConfiguration { step }));
                return None;
            }
        };

        tracing::info!("▶️ {} module takes over for {}", flow.module(), step);
        self.active = Some(flow);
        first
    }
}
