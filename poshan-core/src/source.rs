//! Upstream product source contract.

use crate::error::UpstreamError;
use crate::product::{Barcode, PageRequest, ProductDetails};
use async_trait::async_trait;

/// Read-only upstream product catalogue.
///
/// "No match" is a normal outcome (`Ok(None)` / empty list); errors are
/// reserved for transport and payload failures.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Look up a single product by barcode.
    async fn lookup(&self, barcode: &Barcode) -> Result<Option<ProductDetails>, UpstreamError>;

    /// Free-text search; paging is passed through to the upstream.
    async fn search(
        &self,
        query: &str,
        paging: PageRequest,
    ) -> Result<Vec<ProductDetails>, UpstreamError>;
}
