pub mod handlers;
pub mod machine;
pub mod profile;
pub mod questions;
pub mod service;
