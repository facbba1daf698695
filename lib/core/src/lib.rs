//! Core domain types and utilities for storelink.
//!
//! This crate provides the foundational types, error handling, and the error
//! reporting contract shared by the vault, the executor, and the dispatcher.

pub mod domain;
pub mod error;
pub mod id;
pub mod report;

pub use domain::ShopDomain;
pub use error::{DomainError, Result};
pub use id::{DispatchId, ParseIdError, ReportId};
pub use report::{ErrorCategory, ErrorReport, ErrorReporter, Severity, TracingReporter};
