//! RAII wrapper releasing a [`RecordHandle`] through its owning adapter on
//! every exit path, including early returns and panics (§9 "Scoped
//! acquisition").

use super::adapter::{Adapter, ProjHandle, RecordHandle};

pub struct RecordGuard<'a> {
    adapter: &'a dyn Adapter,
    proj: ProjHandle,
    handle: RecordHandle,
}

impl<'a> RecordGuard<'a> {
    pub fn new(adapter: &'a dyn Adapter, proj: ProjHandle, handle: RecordHandle) -> Self {
        RecordGuard {
            adapter,
            proj,
            handle,
        }
    }

    pub fn handle(&self) -> RecordHandle {
        self.handle
    }

    pub fn proj(&self) -> ProjHandle {
        self.proj
    }

    pub fn get(&self, field: &str) -> Option<String> {
        self.adapter.get_field(self.handle, field)
    }

    pub fn set(&self, field: &str, value: &str) {
        self.adapter.set_field(self.handle, field, value)
    }

    pub fn save(&self) -> super::adapter::AResult<String> {
        self.adapter.save(self.proj, self.handle)
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.adapter.free(self.handle);
    }
}
