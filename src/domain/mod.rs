// Domain layer - Core data model and static format table

pub mod format;
pub mod model;
