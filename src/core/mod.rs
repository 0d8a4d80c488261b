pub mod coordinator;
pub mod module;
pub mod registry;
pub mod resolver;
pub mod storage;
pub mod storage_manager;

pub use crate::utils::error::Result;
pub use coordinator::{run_until_finished, EventSink, FlowCoordinator, FlowError, FlowPhase};
pub use module::{Module, ModuleServiceLocator};
pub use registry::{ModuleFactory, ModuleRegistry, ModuleResolutionError, RuntimeModuleFactory};
pub use resolver::{ModuleResolver, ResolverContext};
pub use storage::{FileStorage, SandboxFileStorage, Storage};
pub use storage_manager::{ClearReport, ModulesStorageManager};
