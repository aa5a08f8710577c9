// Domain layer: tabular model and the resolver port.

pub mod model;
pub mod ports;
