//! Built-in stages. Each one is registered with typetag under the name
//! listed in [`BUILTIN_NODE_TYPES`], which is how channel files refer to them:
//!
//! ```yaml
//! nodes:
//!   - type: json_to_native
//!   - type: offload
//!     node: { type: native_to_xml, pretty: true }
//! ```
pub mod basic;
pub mod json;
pub mod offload;
pub mod xml;

pub use basic::{BreakNode, DropNode, EmptyNode, LogNode, PassNode, RaiseErrorNode};
pub use json::{JsonToNative, NativeToJson};
pub use offload::{OffloadMode, OffloadNode};
pub use xml::{NativeToXml, XmlToNative};

pub const BUILTIN_NODE_TYPES: &[&str] = &[
    "pass",
    "raise_error",
    "drop",
    "break",
    "log",
    "empty",
    "json_to_native",
    "native_to_json",
    "xml_to_native",
    "native_to_xml",
    "offload",
];
