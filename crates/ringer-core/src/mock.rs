//! Mock transport and permission gate for testing.
//!
//! [`MockTransport`] stands in for the OS radio without any BLE hardware:
//! tests script the asynchronous side by emitting [`TransportEvent`]s and
//! observe the synchronous side through recorded calls. Auto-behaviors cover
//! the common happy paths so tests only script what they care about.
//!
//! # Example
//!
//! ```
//! use ringer_core::mock::MockTransport;
//! use ringer_core::transport::{Transport, TransportEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     let mut events = mock.subscribe();
//!     mock.emit(TransportEvent::ScanFailed { code: 2 });
//!     assert!(matches!(
//!         events.recv().await.unwrap(),
//!         TransportEvent::ScanFailed { code: 2 }
//!     ));
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use ringer_types::{Address, BondState, Capability, PeripheralHandle};

use crate::error::{Error, Result};
use crate::gate::PermissionGate;
use crate::transport::{RadioState, Transport, TransportEvent, TransportEvents, WriteMode};

/// One recorded characteristic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Service the write targeted.
    pub service: Uuid,
    /// Characteristic the write targeted.
    pub characteristic: Uuid,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Write mode used.
    pub mode: WriteMode,
}

/// A scriptable transport for tests.
pub struct MockTransport {
    event_tx: broadcast::Sender<TransportEvent>,
    radio: Mutex<RadioState>,
    bond_states: Mutex<HashMap<Address, BondState>>,
    services: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    known_peripherals: Mutex<HashMap<Address, PeripheralHandle>>,

    /// When set, `connect_gatt` emits `Connected` by itself.
    auto_connect: AtomicBool,
    /// When set, `discover_services` emits a successful
    /// `ServicesDiscovered` by itself.
    auto_discover: AtomicBool,

    reject_start_discovery: AtomicBool,
    reject_connect: AtomicBool,
    reject_bond_request: AtomicBool,
    reject_writes: AtomicBool,

    discovery_starts: AtomicU32,
    discovery_stops: AtomicU32,
    connect_calls: Mutex<Vec<Address>>,
    disconnect_calls: Mutex<Vec<Address>>,
    bond_requests: Mutex<Vec<Address>>,
    discovery_requests: Mutex<Vec<Address>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("radio", &*self.radio.lock().unwrap())
            .field("connect_calls", &self.connect_calls.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock with a powered radio and no scripted failures.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            event_tx,
            radio: Mutex::new(RadioState::On),
            bond_states: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            known_peripherals: Mutex::new(HashMap::new()),
            auto_connect: AtomicBool::new(false),
            auto_discover: AtomicBool::new(true),
            reject_start_discovery: AtomicBool::new(false),
            reject_connect: AtomicBool::new(false),
            reject_bond_request: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
            discovery_starts: AtomicU32::new(0),
            discovery_stops: AtomicU32::new(0),
            connect_calls: Mutex::new(Vec::new()),
            disconnect_calls: Mutex::new(Vec::new()),
            bond_requests: Mutex::new(Vec::new()),
            discovery_requests: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    // --- Scripting ---

    /// Push an event onto the shared stream.
    pub fn emit(&self, event: TransportEvent) {
        // No receivers yet is fine; scripted events may race subscription.
        let _ = self.event_tx.send(event);
    }

    /// Set the radio state reported to callers.
    pub fn set_radio_state(&self, state: RadioState) {
        *self.radio.lock().unwrap() = state;
    }

    /// Set the cached bond state for an address.
    pub fn set_bond_state(&self, address: Address, state: BondState) {
        self.bond_states.lock().unwrap().insert(address, state);
    }

    /// Register a peripheral resolvable via `peripheral_by_address`.
    pub fn add_known_peripheral(&self, handle: PeripheralHandle) {
        self.known_peripherals
            .lock()
            .unwrap()
            .insert(handle.address.clone(), handle);
    }

    /// Install a service with its characteristics on the active connection.
    pub fn add_service(&self, service: Uuid, characteristics: &[Uuid]) {
        self.services
            .lock()
            .unwrap()
            .insert(service, characteristics.to_vec());
    }

    /// Have `connect_gatt` emit `Connected` on its own.
    pub fn set_auto_connect(&self, enabled: bool) {
        self.auto_connect.store(enabled, Ordering::SeqCst);
    }

    /// Have `discover_services` emit a successful result on its own
    /// (enabled by default).
    pub fn set_auto_discover(&self, enabled: bool) {
        self.auto_discover.store(enabled, Ordering::SeqCst);
    }

    /// Make `start_discovery` fail.
    pub fn set_reject_start_discovery(&self, enabled: bool) {
        self.reject_start_discovery.store(enabled, Ordering::SeqCst);
    }

    /// Make `connect_gatt` fail.
    pub fn set_reject_connect(&self, enabled: bool) {
        self.reject_connect.store(enabled, Ordering::SeqCst);
    }

    /// Make `request_bond` fail to initiate.
    pub fn set_reject_bond_request(&self, enabled: bool) {
        self.reject_bond_request.store(enabled, Ordering::SeqCst);
    }

    /// Make writes fail.
    pub fn set_reject_writes(&self, enabled: bool) {
        self.reject_writes.store(enabled, Ordering::SeqCst);
    }

    // --- Recorded calls ---

    /// Times discovery was started.
    pub fn discovery_starts(&self) -> u32 {
        self.discovery_starts.load(Ordering::SeqCst)
    }

    /// Times discovery was stopped.
    pub fn discovery_stops(&self) -> u32 {
        self.discovery_stops.load(Ordering::SeqCst)
    }

    /// Addresses `connect_gatt` was called for, in order.
    pub fn connect_calls(&self) -> Vec<Address> {
        self.connect_calls.lock().unwrap().clone()
    }

    /// Addresses `disconnect_gatt` was called for, in order.
    pub fn disconnect_calls(&self) -> Vec<Address> {
        self.disconnect_calls.lock().unwrap().clone()
    }

    /// Addresses bonding was requested for, in order.
    pub fn bond_requests(&self) -> Vec<Address> {
        self.bond_requests.lock().unwrap().clone()
    }

    /// Addresses service discovery was requested for, in order.
    pub fn discovery_requests(&self) -> Vec<Address> {
        self.discovery_requests.lock().unwrap().clone()
    }

    /// Recorded writes, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn radio_state(&self) -> RadioState {
        *self.radio.lock().unwrap()
    }

    fn subscribe(&self) -> TransportEvents {
        self.event_tx.subscribe()
    }

    async fn start_discovery(&self) -> Result<()> {
        if self.reject_start_discovery.load(Ordering::SeqCst) {
            return Err(Error::RadioDisabled);
        }
        self.discovery_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.discovery_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn peripheral_by_address(&self, address: &Address) -> Result<PeripheralHandle> {
        self.known_peripherals
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound {
                address: address.clone(),
            })
    }

    fn bond_state(&self, address: &Address) -> BondState {
        self.bond_states
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    async fn request_bond(&self, address: &Address) -> Result<()> {
        self.bond_requests.lock().unwrap().push(address.clone());
        if self.reject_bond_request.load(Ordering::SeqCst) {
            return Err(Error::bond_failed(
                address.clone(),
                crate::error::BondFailureReason::RequestRejected,
            ));
        }
        Ok(())
    }

    async fn connect_gatt(&self, handle: &PeripheralHandle) -> Result<()> {
        self.connect_calls
            .lock()
            .unwrap()
            .push(handle.address.clone());
        if self.reject_connect.load(Ordering::SeqCst) {
            return Err(Error::connection_failed(
                Some(handle.address.clone()),
                crate::error::ConnectionFailureReason::OpenRejected("mock".into()),
            ));
        }
        if self.auto_connect.load(Ordering::SeqCst) {
            self.emit(TransportEvent::Connected {
                address: handle.address.clone(),
            });
        }
        Ok(())
    }

    async fn disconnect_gatt(&self, address: &Address) -> Result<()> {
        self.disconnect_calls.lock().unwrap().push(address.clone());
        Ok(())
    }

    async fn discover_services(&self, address: &Address) -> Result<()> {
        self.discovery_requests.lock().unwrap().push(address.clone());
        if self.auto_discover.load(Ordering::SeqCst) {
            self.emit(TransportEvent::ServicesDiscovered {
                address: address.clone(),
                success: true,
            });
        }
        Ok(())
    }

    async fn has_service(&self, service: Uuid) -> bool {
        self.services.lock().unwrap().contains_key(&service)
    }

    async fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.services
            .lock()
            .unwrap()
            .get(&service)
            .is_some_and(|chars| chars.contains(&characteristic))
    }

    async fn write_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }
        self.writes.lock().unwrap().push(WriteRecord {
            service,
            characteristic,
            payload: payload.to_vec(),
            mode,
        });
        Ok(())
    }
}

/// A permission gate with an explicit granted set.
#[derive(Debug)]
pub struct MockGate {
    granted: Mutex<HashSet<Capability>>,
    requests: Mutex<Vec<Vec<Capability>>>,
}

impl MockGate {
    /// A gate granting every capability.
    pub fn granting_all() -> Self {
        Self {
            granted: Mutex::new(HashSet::from([
                Capability::Scan,
                Capability::Connect,
                Capability::Location,
            ])),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A gate granting nothing.
    pub fn denying_all() -> Self {
        Self {
            granted: Mutex::new(HashSet::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Grant a capability.
    pub fn grant(&self, capability: Capability) {
        self.granted.lock().unwrap().insert(capability);
    }

    /// Revoke a capability.
    pub fn revoke(&self, capability: Capability) {
        self.granted.lock().unwrap().remove(&capability);
    }

    /// Capability sets passed to `request`, in order.
    pub fn requests(&self) -> Vec<Vec<Capability>> {
        self.requests.lock().unwrap().clone()
    }
}

impl PermissionGate for MockGate {
    fn has(&self, capability: Capability) -> bool {
        self.granted.lock().unwrap().contains(&capability)
    }

    fn request(&self, capabilities: &[Capability]) {
        self.requests.lock().unwrap().push(capabilities.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        "AA:BB:CC:DD:EE:FF".parse().unwrap()
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = MockTransport::new();
        let handle = PeripheralHandle::from_address(addr());

        mock.start_discovery().await.unwrap();
        mock.connect_gatt(&handle).await.unwrap();
        mock.disconnect_gatt(&addr()).await.unwrap();

        assert_eq!(mock.discovery_starts(), 1);
        assert_eq!(mock.connect_calls(), vec![addr()]);
        assert_eq!(mock.disconnect_calls(), vec![addr()]);
    }

    #[tokio::test]
    async fn test_auto_connect_emits_connected() {
        let mock = MockTransport::new();
        mock.set_auto_connect(true);
        let mut events = mock.subscribe();

        let handle = PeripheralHandle::from_address(addr());
        mock.connect_gatt(&handle).await.unwrap();

        match events.recv().await.unwrap() {
            TransportEvent::Connected { address } => assert_eq!(address, addr()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bond_state_defaults_to_none() {
        let mock = MockTransport::new();
        assert_eq!(mock.bond_state(&addr()), BondState::None);
        mock.set_bond_state(addr(), BondState::Bonded);
        assert_eq!(mock.bond_state(&addr()), BondState::Bonded);
    }

    #[tokio::test]
    async fn test_service_table() {
        let mock = MockTransport::new();
        let service = Uuid::new_v4();
        let characteristic = Uuid::new_v4();
        mock.add_service(service, &[characteristic]);

        assert!(mock.has_service(service).await);
        assert!(mock.has_characteristic(service, characteristic).await);
        assert!(!mock.has_characteristic(service, Uuid::new_v4()).await);
    }

    #[test]
    fn test_mock_gate() {
        let gate = MockGate::denying_all();
        assert!(!gate.has(Capability::Scan));
        gate.grant(Capability::Scan);
        assert!(gate.has(Capability::Scan));
        gate.revoke(Capability::Scan);
        assert!(!gate.has(Capability::Scan));
    }
}
