//! LSP protocol feature implementations.
//!
//! This module provides implementations for LSP features:
//! - Diagnostics conversion from template diagnostics
//! - Completion delegated to the code and markup services
//! - Custom request and response types

mod completion;
mod custom;
mod diagnostics;

pub use completion::{
    delegated_completion, CachedList, CompletionCache, CompletionOrigin,
};
pub use custom::{
    OnAutoInsertParams, OnAutoInsertResponse, ProximityExpressionsParams,
    ProximityExpressionsResponse, ON_AUTO_INSERT, PROXIMITY_EXPRESSIONS,
};
pub use diagnostics::to_diagnostics;
