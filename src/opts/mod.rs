//! Typed module options: the fields, the owner-side registry that serves
//! them over the wire, and the client-side mirror that caches a remote set.
pub mod field;
pub mod mirror;
pub mod registry;

pub use field::{FieldType, OptionError, OptionField, Value};
pub use mirror::{MirrorUpdate, OptionMirror, SyncState};
pub use registry::OptionRegistry;
