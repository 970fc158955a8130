pub mod generation;
pub mod plan;
pub mod profile;
pub mod social;
pub mod user;
