//! A `SignalingService` wired to test doubles.
//!
//! No sockets are involved: tests attach identities directly and feed text
//! frames through the same entry point the WebSocket task uses.

use crate::mock_store::MockCallStore;
use common::identity::IdentityContext;
use signaling_service::actors::{CallOutcome, ConnectionHandle, ConnectionOutbox};
use signaling_service::appointments::{
    Appointment, AppointmentRepository, InMemoryAppointmentRepository,
};
use signaling_service::config::Config;
use signaling_service::errors::SignalingError;
use signaling_service::service::SignalingService;
use signaling_service::store::{CallRecord, CallStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Service plus handles on its collaborators.
pub struct TestService {
    pub service: SignalingService,
    pub store: Arc<MockCallStore>,
    pub appointments: Arc<InMemoryAppointmentRepository>,
    pub cancel_token: CancellationToken,
}

impl TestService {
    /// Service with default configuration and empty stores.
    pub async fn new() -> Self {
        Self::build(Vec::new(), Vec::new(), HashMap::new()).await
    }

    pub async fn with_calls(records: impl IntoIterator<Item = CallRecord>) -> Self {
        Self::build(records.into_iter().collect(), Vec::new(), HashMap::new()).await
    }

    pub async fn with_appointments(appointments: impl IntoIterator<Item = Appointment>) -> Self {
        Self::build(Vec::new(), appointments.into_iter().collect(), HashMap::new()).await
    }

    /// Full control over seed data and environment-style configuration.
    pub async fn build(
        records: Vec<CallRecord>,
        appointments: Vec<Appointment>,
        vars: HashMap<String, String>,
    ) -> Self {
        let config = Config::from_vars(&vars).expect("test config should be valid");
        let store = Arc::new(MockCallStore::with_records(records));
        let repo = Arc::new(InMemoryAppointmentRepository::new());
        for appointment in appointments {
            repo.create(appointment)
                .await
                .expect("seeding appointments should succeed");
        }

        let call_store: Arc<dyn CallStore> = store.clone();
        let appointment_repo: Arc<dyn AppointmentRepository> = repo.clone();
        let cancel_token = CancellationToken::new();
        let service =
            SignalingService::new(&config, call_store, appointment_repo, cancel_token.clone());

        Self {
            service,
            store,
            appointments: repo,
            cancel_token,
        }
    }

    /// Attach an identity, as the transport does after upgrade.
    pub async fn connect(&self, identity: IdentityContext) -> (ConnectionHandle, ConnectionOutbox) {
        self.service
            .attach(identity)
            .await
            .expect("attach should succeed before shutdown")
    }

    /// Feed one text frame and return its outcome.
    pub async fn send(
        &self,
        connection: &ConnectionHandle,
        frame: impl AsRef<str>,
    ) -> Result<CallOutcome, SignalingError> {
        self.service.handle_frame(connection, frame.as_ref()).await
    }

    pub async fn disconnect(&self, connection: &ConnectionHandle) {
        self.service.detach(connection).await;
    }

    pub async fn appointment(&self, appointment_id: &str) -> Option<Appointment> {
        self.appointments
            .get(appointment_id)
            .await
            .expect("in-memory repository never fails")
    }
}
