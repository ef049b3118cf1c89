// Domain layer: models and the ports the core drives. No I/O here.

pub mod model;
pub mod ports;
