/// Warehouse Query Guard - a query-safety gate between an analytics UI and a cloud warehouse
///
/// This is the root crate that provides workspace-level documentation.
/// Actual implementation is in the subcrates:
/// - `query-guard-core`: Query validator, keyword/pattern blocklist and normalization
/// - `query-guard-gateway`: Rate limiter, execution gate, warehouse connector and HTTP/CLI surface

/// Returns the version of the package.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
