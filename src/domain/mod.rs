// Domain layer: shared vocabulary and collaborator capabilities. No I/O here.

pub mod model;
pub mod ports;
