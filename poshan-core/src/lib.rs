//! Poshan Core
//!
//! Domain types and the transport-independent pieces of the Poshan gateway:
//! caller identity, the per-route throttle engine, product records, the
//! store and upstream-source contracts, and the cache-then-upstream
//! product resolver. Nothing in this crate knows about HTTP.

pub mod clock;
pub mod error;
pub mod identity;
pub mod product;
pub mod resolver;
pub mod source;
pub mod store;
pub mod throttle;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{
    BarcodeError, ResolveError, ResolveResult, StoreError, ThrottleConfigError, UpstreamError,
};
pub use identity::Identity;
pub use product::{
    retention_cutoff, Barcode, Origin, PageRequest, ProductDetails, ProductImage, ProductRecord,
    Resolution, ResolveOptions, SearchOptions, SearchResults, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    PRODUCT_RETENTION_DAYS,
};
pub use resolver::ProductResolver;
pub use source::ProductSource;
pub use store::{InMemoryProductStore, ProductStore};
pub use throttle::{
    Admission, InMemoryThrottle, RouteThrottle, ThrottleKey, ThrottlePolicy, ThrottleStore,
    ANONYMOUS_CALLER,
};
