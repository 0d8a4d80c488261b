// Application layer: the four module flows and the session that chains them.

pub mod modules;
pub mod session;
