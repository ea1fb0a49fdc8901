//! Domain model module declarations.

pub mod request;
pub mod state;
