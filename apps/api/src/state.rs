use std::sync::Arc;

use tracing::warn;

use appointment_cell::handlers::AppointmentState;
use appointment_cell::store::{
    AppointmentStore, Directory, MemoryAppointmentStore, MemoryDirectory,
    PostgrestAppointmentStore, PostgrestDirectory,
};
use schedule_cell::handlers::ScheduleState;
use schedule_cell::store::{MemoryScheduleStore, PostgrestScheduleStore, ScheduleStore};
use shared_config::{AppConfig, StoreBackend};
use shared_database::postgrest::PostgrestClient;
use shared_utils::clock::ClinicClock;

/// Composition root: picks the store backend from configuration and wires
/// both cells against the same underlying stores.
pub fn build_states(config: Arc<AppConfig>) -> (ScheduleState, AppointmentState) {
    let clock = ClinicClock::from_config(&config);

    let (schedules, appointments, directory): (
        Arc<dyn ScheduleStore>,
        Arc<dyn AppointmentStore>,
        Arc<dyn Directory>,
    ) = match config.store_backend {
        StoreBackend::Postgrest => {
            let client = Arc::new(PostgrestClient::new(&config));
            (
                Arc::new(PostgrestScheduleStore::new(Arc::clone(&client))),
                Arc::new(PostgrestAppointmentStore::new(Arc::clone(&client))),
                Arc::new(PostgrestDirectory::new(client)),
            )
        }
        StoreBackend::Memory => {
            warn!("Using in-memory stores; data is lost on restart and this mode is single-instance only");
            (
                Arc::new(MemoryScheduleStore::new()),
                Arc::new(MemoryAppointmentStore::new()),
                Arc::new(MemoryDirectory::new()),
            )
        }
    };

    let schedule_state = ScheduleState {
        config: Arc::clone(&config),
        store: Arc::clone(&schedules),
        clock: clock.clone(),
    };

    let appointment_state = AppointmentState {
        config,
        schedules,
        appointments,
        directory,
        clock,
    };

    (schedule_state, appointment_state)
}
