use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::models::{MachineInfo, MonitoredTarget};
use crate::notify::NotificationSink;
use crate::query::ServerQuery;
use crate::render::{self, DisplayState, RenderOptions};

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub query_timeout: Duration,
    pub control_plane_timeout: Duration,
    pub render: RenderOptions,
}

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Rendering matched the last published text.
    Unchanged,
    Published,
    /// The sink failed. The cache already holds the new text.
    PublishFailed,
}

/// Polls one target and keeps its status message current.
///
/// Each monitor owns its last rendered text, so cycles of the same target never
/// overlap and need no locking.
pub struct StatusMonitor<Q, C, N> {
    target: MonitoredTarget,
    settings: EngineSettings,
    query: Arc<Q>,
    control_plane: Arc<C>,
    sink: Arc<N>,
    last_rendered: Option<String>,
}

impl<Q, C, N> StatusMonitor<Q, C, N>
where
    Q: ServerQuery,
    C: ControlPlane,
    N: NotificationSink,
{
    pub fn new(
        target: MonitoredTarget,
        settings: EngineSettings,
        query: Arc<Q>,
        control_plane: Arc<C>,
        sink: Arc<N>,
    ) -> Self {
        Self {
            target,
            settings,
            query,
            control_plane,
            sink,
            last_rendered: None,
        }
    }

    #[cfg(test)]
    pub fn last_rendered(&self) -> Option<&str> {
        self.last_rendered.as_deref()
    }

    /// Runs cycles forever: the first immediately, then once per poll interval.
    /// A slow cycle delays the next tick instead of stacking.
    pub async fn run(mut self) {
        info!(
            server = %self.target.name,
            machine = %self.target.machine_id,
            "Monitoring {}:{} every {:?}",
            self.target.query_address,
            self.target.port,
            self.settings.poll_interval
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let start_time = Utc::now();

            match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(outcome) => {
                    let duration = Utc::now() - start_time;
                    debug!(
                        server = %self.target.name,
                        ?outcome,
                        "Cycle finished in {:.2}s",
                        duration.num_milliseconds() as f64 / 1000.0
                    );
                }
                Err(_) => error!(server = %self.target.name, "Status cycle panicked"),
            }
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let state = self.observe().await;
        let message = render::render(&self.target, &state, &self.settings.render);

        if self.last_rendered.as_deref() == Some(message.as_str()) {
            return CycleOutcome::Unchanged;
        }

        info!(
            server = %self.target.name,
            state = state.label(),
            message_id = %self.target.destination.message_id,
            "Status changed, updating discord message"
        );
        self.last_rendered = Some(message.clone());

        match self
            .sink
            .upsert_message(&self.target.destination, &message)
            .await
        {
            Ok(()) => CycleOutcome::Published,
            Err(e) => {
                error!(server = %self.target.name, error = %e, "Error when trying to update status");
                CycleOutcome::PublishFailed
            }
        }
    }

    /// Classifies the target: a successful query wins, otherwise the control plane decides.
    pub async fn observe(&self) -> DisplayState {
        let address = &self.target.query_address;
        let port = self.target.port;

        debug!(server = %self.target.name, "Querying {}:{}", address, port);
        match self
            .query
            .query(address, port, self.settings.query_timeout)
            .await
        {
            Ok(result) => {
                debug!(server = %self.target.name, ?result, "Got response from {}:{}", address, port);
                return DisplayState::online(result, &self.settings.render);
            }
            Err(e) => {
                warn!(server = %self.target.name, error = %e, "Error while querying {}:{}", address, port);
            }
        }

        match self.describe_machine().await {
            Ok(machine) if machine.is_running() => DisplayState::Starting,
            Ok(machine) => {
                debug!(server = %self.target.name, state = %machine.state, "Machine is not running");
                DisplayState::Offline
            }
            Err(e) => {
                warn!(server = %self.target.name, error = %e, "Control plane unavailable, reporting offline");
                DisplayState::Offline
            }
        }
    }

    async fn describe_machine(&self) -> Result<MachineInfo, ControlPlaneError> {
        let timeout = self.settings.control_plane_timeout;
        let describe = self.control_plane.describe_machine(&self.target.machine_id);
        match tokio::time::timeout(timeout, describe).await {
            Ok(machine) => machine,
            Err(_) => Err(ControlPlaneError::Timeout(timeout)),
        }
    }
}
