pub mod handlers;
pub mod services;
pub mod tool;
