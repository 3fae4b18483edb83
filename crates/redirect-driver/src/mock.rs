//! Recording driver for tests.
//!
//! `MockDriver` accepts every encapsulation and failure policy, keeps its
//! state in the same in-process store as the real backends, records every
//! call and lets a test queue failures per operation.

use crate::api::RedirectionDriver;
use crate::error::{DriverError, DriverResult};
use crate::store::{self, ControllerStore};
use crate::types::{DriverCapabilities, DriverSnapshot, HookRequest};
use redirect_types::{
    ElementId, HookId, HookParams, InspectionPortElement, InspectionPortKey, NetworkElement,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Driver operations, as recorded by [`MockDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Connect,
    Disconnect,
    LookupElement,
    CreateElement,
    UpdateElement,
    DeleteElement,
    CreateInspectionPort,
    LookupInspectionPort,
    DeleteInspectionPort,
    InstallHook,
    UpdateHook,
    RemoveHook,
    Snapshot,
}

#[derive(Debug)]
enum Injected {
    /// Fail without touching state.
    Reject(DriverError),
    /// Apply the operation, then report failure.
    ApplyThenFail(DriverError),
}

/// In-memory driver with call recording and failure injection.
#[derive(Debug)]
pub struct MockDriver {
    store: Mutex<ControllerStore>,
    calls: Mutex<Vec<DriverOp>>,
    injected: Mutex<HashMap<DriverOp, VecDeque<Injected>>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(ControllerStore::new("mock")),
            calls: Mutex::new(Vec::new()),
            injected: Mutex::new(HashMap::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Creates a mock that already knows the given leaf ports.
    pub fn with_ports<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let driver = Self::new();
        for port in ports {
            if let Ok(id) = ElementId::new(port.as_ref()) {
                driver.add_port(id);
            }
        }
        driver
    }

    pub fn add_port(&self, id: ElementId) {
        if let Ok(mut store) = self.store.lock() {
            store.add_leaf(id);
        }
    }

    /// Makes the next call of `op` fail with `error` and leave state alone.
    pub fn fail_next(&self, op: DriverOp, error: DriverError) {
        self.inject(op, Injected::Reject(error));
    }

    /// Makes the next call of `op` take effect but still report `error`,
    /// as when a reply is lost after the controller applied the request.
    pub fn fail_after_apply(&self, op: DriverOp, error: DriverError) {
        self.inject(op, Injected::ApplyThenFail(error));
    }

    fn inject(&self, op: DriverOp, injected: Injected) {
        if let Ok(mut map) = self.injected.lock() {
            map.entry(op).or_default().push_back(injected);
        }
    }

    pub fn call_count(&self, op: DriverOp) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|o| **o == op).count())
            .unwrap_or(0)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Records `op` and runs `f` against the store, honoring any queued
    /// failure for it.
    fn call<T>(
        &self,
        op: DriverOp,
        f: impl FnOnce(&mut ControllerStore) -> DriverResult<T>,
    ) -> DriverResult<T> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(op);
        }
        let injected = self
            .injected
            .lock()
            .map_err(|_| DriverError::internal("mock injection lock poisoned"))?
            .get_mut(&op)
            .and_then(VecDeque::pop_front);

        let mut store = store::lock(&self.store)?;
        match injected {
            Some(Injected::Reject(error)) => Err(error),
            Some(Injected::ApplyThenFail(error)) => {
                f(&mut store)?;
                Err(error)
            }
            None => f(&mut store),
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RedirectionDriver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::all()
    }

    fn connect(&self) -> DriverResult<()> {
        self.call(DriverOp::Connect, |s| s.connect())?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> DriverResult<()> {
        self.call(DriverOp::Disconnect, |s| s.disconnect())?;
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn lookup_element(&self, id: &ElementId) -> DriverResult<Option<NetworkElement>> {
        self.call(DriverOp::LookupElement, |s| {
            s.ensure_connected()?;
            Ok(s.element(id))
        })
    }

    fn create_element(&self, children: &[ElementId]) -> DriverResult<NetworkElement> {
        self.call(DriverOp::CreateElement, |s| {
            s.ensure_connected()?;
            s.create_composite("composite", children)
        })
    }

    fn update_element(&self, id: &ElementId, children: &[ElementId]) -> DriverResult<NetworkElement> {
        self.call(DriverOp::UpdateElement, |s| {
            s.ensure_connected()?;
            s.update_composite(id, children)
        })
    }

    fn delete_element(&self, id: &ElementId) -> DriverResult<()> {
        self.call(DriverOp::DeleteElement, |s| {
            s.ensure_connected()?;
            s.delete_element(id)
        })
    }

    fn create_inspection_port(&self, key: &InspectionPortKey) -> DriverResult<ElementId> {
        self.call(DriverOp::CreateInspectionPort, |s| {
            s.ensure_connected()?;
            s.create_port("port", key)
        })
    }

    fn lookup_inspection_port(&self, key: &InspectionPortKey) -> DriverResult<Option<InspectionPortElement>> {
        self.call(DriverOp::LookupInspectionPort, |s| {
            s.ensure_connected()?;
            Ok(s.port_for(key))
        })
    }

    fn delete_inspection_port(&self, id: &ElementId) -> DriverResult<()> {
        self.call(DriverOp::DeleteInspectionPort, |s| {
            s.ensure_connected()?;
            s.delete_port(id)
        })
    }

    fn install_hook(&self, request: &HookRequest) -> DriverResult<HookId> {
        self.call(DriverOp::InstallHook, |s| {
            s.ensure_connected()?;
            let hook_id = HookId::from(s.mint("hook")?);
            s.insert_hook(hook_id, request)
        })
    }

    fn update_hook(&self, id: &HookId, params: &HookParams) -> DriverResult<()> {
        self.call(DriverOp::UpdateHook, |s| {
            s.ensure_connected()?;
            s.update_hook(id, params)
        })
    }

    fn remove_hook(&self, id: &HookId) -> DriverResult<()> {
        self.call(DriverOp::RemoveHook, |s| {
            s.ensure_connected()?;
            s.remove_hook(id)
        })
    }

    fn snapshot(&self) -> DriverResult<DriverSnapshot> {
        self.call(DriverOp::Snapshot, |s| {
            s.ensure_connected()?;
            Ok(s.snapshot())
        })
    }
}
