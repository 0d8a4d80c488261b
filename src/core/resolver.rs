use crate::app::modules::bank::BankModule;
use crate::app::modules::core_flow::CoreModule;
use crate::app::modules::fourthline::FourthlineModule;
use crate::app::modules::qes::QesCoordinatorFactory;
use crate::config::theme::SharedConfiguration;
use crate::core::module::{Module, ModuleServiceLocator};
use crate::core::registry::ModuleFactory;
use crate::core::storage_manager::ModulesStorageManager;
use crate::domain::model::ModuleName;
use crate::domain::ports::{AlertsService, NetworkClient, Presenter};
use std::cell::OnceCell;
use std::sync::Arc;

/// 建立每個模組 service locator 時共用的單例
#[derive(Clone)]
pub struct ResolverContext {
    pub network: Arc<dyn NetworkClient>,
    pub configuration: SharedConfiguration,
    pub storage_manager: Arc<ModulesStorageManager>,
    pub presenter: Arc<dyn Presenter>,
    pub alerts: Arc<dyn AlertsService>,
}

impl ResolverContext {
    pub fn service_locator(&self, module: ModuleName) -> ModuleServiceLocator {
        ModuleServiceLocator {
            module,
            network: Arc::clone(&self.network),
            configuration: Arc::clone(&self.configuration),
            file_storage: self.storage_manager.file_storage(module),
            storage: self.storage_manager.storage(module),
            presenter: Arc::clone(&self.presenter),
            alerts: Arc::clone(&self.alerts),
        }
    }
}

/// 延遲建立各模組的協調器工廠，第一次存取後快取到 [`ModuleResolver::reset`] 為止
///
/// 選用模組（目前只有 QES）交給 [`ModuleFactory`] 建立，不存在時回傳 `None`。
pub struct ModuleResolver {
    context: ResolverContext,
    factory: Arc<dyn ModuleFactory>,
    core: OnceCell<Arc<CoreModule>>,
    bank: OnceCell<Arc<BankModule>>,
    fourthline: OnceCell<Arc<FourthlineModule>>,
    qes: OnceCell<Option<Arc<dyn QesCoordinatorFactory>>>,
}

impl ModuleResolver {
    pub fn new(context: ResolverContext, factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            context,
            factory,
            core: OnceCell::new(),
            bank: OnceCell::new(),
            fourthline: OnceCell::new(),
            qes: OnceCell::new(),
        }
    }

    pub fn context(&self) -> &ResolverContext {
        &self.context
    }

    pub fn core(&self) -> Arc<CoreModule> {
        self.core.get_or_init(|| self.build()).clone()
    }

    pub fn bank(&self) -> Arc<BankModule> {
        self.bank.get_or_init(|| self.build()).clone()
    }

    pub fn fourthline(&self) -> Arc<FourthlineModule> {
        self.fourthline.get_or_init(|| self.build()).clone()
    }

    pub fn qes(&self) -> Option<Arc<dyn QesCoordinatorFactory>> {
        self.qes
            .get_or_init(|| {
                let locator = self.context.service_locator(ModuleName::Qes);
                let factory = self.factory.make_qes(locator);
                if factory.is_none() {
                    tracing::info!("QES module is not available in this build");
                }
                factory
            })
            .clone()
    }

    pub fn is_available(&self, module: ModuleName) -> bool {
        match module {
            ModuleName::Core | ModuleName::Bank | ModuleName::Fourthline => true,
            ModuleName::Qes => self.qes().is_some(),
        }
    }

    /// 丟棄所有快取，下次存取時重新建立
    pub fn reset(&mut self) {
        self.core = OnceCell::new();
        self.bank = OnceCell::new();
        self.fourthline = OnceCell::new();
        self.qes = OnceCell::new();
    }

    fn build<M: Module>(&self) -> Arc<M> {
        tracing::debug!("Activating {} module", M::NAME);
        Arc::new(M::new(self.context.service_locator(M::NAME)))
    }
}
