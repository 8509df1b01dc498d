mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use repo_types::{object_type, AuditAction};
pub use services::{record, AuditEntry};
