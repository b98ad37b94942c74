pub mod domain;
pub mod error;
pub mod import;
pub mod protocol;
