//! Session domain: lifecycle status, backend selection, messages and memory

pub mod memory;
pub mod message;
pub mod model_backend;
pub mod response;
pub mod status;
