pub mod pipeline;
pub mod predict;
pub mod status;
