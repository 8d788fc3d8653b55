//! Core types and traits for the Graft domain-object engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Graft workspace:
//! typed identifiers, property descriptors and values, rule messages,
//! lifecycle enums, error types, and core traits.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod lifecycle;
pub mod message;
pub mod property;
pub mod traits;
pub mod value;

pub use error::{GraphError, PersistError, RuleError, RuleFault, SaveError, SaveFailure};
pub use id::{CollectionId, ExecutionToken, NodeId, PropertyId, RuleId};
pub use lifecycle::{ChangeReason, FactoryOperation};
pub use message::{RuleMessage, Severity};
pub use property::{Property, PropertyDef, PropertySet};
pub use traits::PropertyReader;
pub use value::{PropertyValue, Value, ValueKind};
