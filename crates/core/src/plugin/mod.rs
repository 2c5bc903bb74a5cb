//! The plugin-adapter capability interface (§4.1) and its native dynamic
//! loader (§6 "Plugin directory protocol").

pub mod adapter;
pub mod guard;
pub mod native;
pub mod registry;

pub use adapter::{
    AResult, Adapter, AdapterError, AttrDecl, ConnHandle, FixDesc, ProjHandle, RecordHandle,
    ScmQuery,
};
pub use guard::RecordGuard;
pub use native::{load_module, LoadedAdapter};
pub use registry::PluginRegistry;
