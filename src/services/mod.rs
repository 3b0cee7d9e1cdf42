pub mod error;
pub mod vision;
