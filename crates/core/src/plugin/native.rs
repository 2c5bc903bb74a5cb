//! Dynamic loading of native adapter modules (§4.1 "Loading", §6 "Plugin
//! directory protocol").
//!
//! Grounded on the teacher's `NativeLoader`: a fixed C-ABI constructor
//! symbol is resolved from a `libloading::Library`, the returned raw
//! trait-object pointer is taken back into an owning `Box`, and the
//! library handle is kept alive in an `Arc` for as long as any value
//! produced from it is reachable.

use super::adapter::Adapter;
use crate::error::ReplError;
use libloading::Library;
use std::path::Path;
use std::sync::Arc;

/// Exported by every native adapter module under this exact symbol name.
#[allow(improper_ctypes_definitions)]
pub type AdapterCtor = unsafe extern "C" fn() -> *mut dyn Adapter;

/// Keeps the adapter implementation and the library that produced it
/// alive together; the library is only ever dropped after the adapter box,
/// since field declaration order is drop order in Rust.
pub struct LoadedAdapter {
    pub adapter: Box<dyn Adapter>,
    _library: Arc<Library>,
}

impl std::ops::Deref for LoadedAdapter {
    type Target = dyn Adapter;
    fn deref(&self) -> &Self::Target {
        self.adapter.as_ref()
    }
}

/// Loads one plugin module from `path`. Returns `Ok(None)` (not an error)
/// when the module is missing the required constructor symbol — the
/// caller logs and skips it, it does not abort the directory scan (§4.1:
/// "If any required symbol is missing, log and skip").
pub fn load_module(path: &Path) -> Result<Option<LoadedAdapter>, ReplError> {
    const SYMBOL: &[u8] = b"dtg_plugin_adapter";

    let lib = unsafe {
        Library::new(path).map_err(|e| {
            ReplError::Plugin(format!("failed to open {}: {}", path.display(), e))
        })?
    };
    let lib = Arc::new(lib);

    let ctor = unsafe { lib.get::<AdapterCtor>(SYMBOL) };
    let ctor = match ctor {
        Ok(c) => c,
        Err(_) => return Ok(None),
    };

    let raw = unsafe { ctor() };
    if raw.is_null() {
        return Err(ReplError::Plugin(format!(
            "{} returned a null adapter in {}",
            String::from_utf8_lossy(SYMBOL),
            path.display()
        )));
    }

    let adapter = unsafe { Box::from_raw(raw) };
    Ok(Some(LoadedAdapter {
        adapter,
        _library: lib,
    }))
}
