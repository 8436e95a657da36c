//! Query interception
//!
//! This module sits between the caller and the warehouse: the gate that decides
//! whether a query runs, the rewriter that caps its result size, and the catalog
//! helpers that issue the gateway's own fixed statements.

pub mod catalog;
pub mod gate;
pub mod rewrite;

pub use catalog::{Catalog, TableInfo};
pub use gate::{GateOptions, QueryGate};
pub use rewrite::{enforce_row_limit, LimitAction, RewrittenQuery};
