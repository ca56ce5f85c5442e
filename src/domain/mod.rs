// Domain layer: task data, fitted parameters and the ports the pipelines are written against.

pub mod model;
pub mod ports;
