pub mod bank;
pub mod core_flow;
pub mod fourthline;
pub mod qes;
