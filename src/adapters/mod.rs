// Adapters layer: concrete implementations of the domain ports (http backend, headless presenter).

pub mod http;
pub mod presenter;

pub use http::HttpNetworkClient;
pub use presenter::{FixedAnswerAlerts, TracingPresenter};
