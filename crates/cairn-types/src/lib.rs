//! Foundation types for Cairn.
//!
//! Every other Cairn crate depends on `cairn-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`]: BLAKE3 digest identifying nodes and blobs
//! - [`BlobId`]: identifier of an opaque top-level blob
//! - [`NamespaceId`]: validated name of a store partition
//! - [`Locator`]: opaque storage address of a flushed node
//! - [`CancelSignal`]: cooperative cancellation flag

pub mod cancel;
pub mod error;
pub mod hash;
pub mod locator;
pub mod namespace;

pub use cancel::{cancel_pair, is_cancelled, never_cancel, CancelHandle, CancelSignal};
pub use error::TypeError;
pub use hash::{BlobId, ContentHash, HASH_SIZE};
pub use locator::Locator;
pub use namespace::{validate_namespace, NamespaceId};
