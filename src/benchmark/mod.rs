//! Benchmark sequencing: prepare the simulation, create one bot per room, capture the start
//! tick, subscribe to every room and resume the simulation until the completion predicate
//! holds.

pub mod commands;

use std::time::Duration;

use crate::api_client::GameApiClient;
use crate::command_channel::{
    CommandChannel, HttpCommandChannel, ReadinessOptions, wait_until_ready,
};
use crate::config::{BenchmarkConfig, RoomFailurePolicy, ScenarioConfig};
use crate::error::CommandError;
use crate::prelude::*;
use crate::report::{BenchmarkReport, FailedRoom};
use crate::server::{ProcessRegistry, ServerSupervisor};
use crate::socket::{EventConsumer, RoomCredentials, RoomEvent, dispatch, subscribe_room};
use async_trait::async_trait;
use room_tracker::{
    CpuSample, HorizonPredicate, RoomMilestone, RoomName, RoomSnapshot, TelemetryTracker,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use url::Url;

/// Rooms that got their bot, and rooms that didn't
#[derive(Debug, Default)]
pub struct RoomSetup {
    pub ready: Vec<RoomName>,
    pub failed: Vec<FailedRoom>,
}

/// Issues the setup commands of a benchmark through a command channel.
pub struct Orchestrator<'a> {
    channel: &'a dyn CommandChannel,
    scenario: &'a ScenarioConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(channel: &'a dyn CommandChannel, scenario: &'a ScenarioConfig) -> Self {
        Self { channel, scenario }
    }

    async fn run_command(&self, command: String) -> Result<String, CommandError> {
        let response = self.channel.execute(&command).await?;
        debug!("{command} -> {response}");
        Ok(response)
    }

    /// Reset, pause and configure the simulation. Any failure here is fatal.
    pub async fn prepare_simulation(&self) -> Result<()> {
        info!("Resetting the simulation data");
        self.run_command(commands::reset_all_data())
            .await
            .context("Failed to reset the simulation data")?;
        self.run_command(commands::pause_simulation())
            .await
            .context("Failed to pause the simulation")?;
        self.run_command(commands::set_tick_duration(self.scenario.tick_duration))
            .await
            .context("Failed to set the tick duration")?;
        Ok(())
    }

    /// Create the bot of every room, one room at a time.
    pub async fn setup_rooms(&self) -> Result<RoomSetup> {
        let mut setup = RoomSetup::default();

        for (index, room) in self.scenario.rooms.iter().enumerate() {
            if index > 0 {
                sleep(self.scenario.room_setup_delay).await;
            }

            match self.setup_room(room).await {
                Ok(()) => {
                    info!("[{room}] Spawned {}", self.scenario.bot);
                    setup.ready.push(room.clone());
                }
                Err(err) => match self.scenario.room_failure_policy {
                    RoomFailurePolicy::Continue => {
                        warn!("[{room}] Room setup failed, continuing without it: {err}");
                        setup.failed.push(FailedRoom {
                            room: room.clone(),
                            reason: err.to_string(),
                        });
                    }
                    RoomFailurePolicy::Abort => {
                        return Err(err).context(format!("Failed to set up room {room}"));
                    }
                },
            }
        }

        ensure!(!setup.ready.is_empty(), "None of the rooms could be set up");
        Ok(setup)
    }

    async fn setup_room(&self, room: &str) -> Result<(), CommandError> {
        let username = self.scenario.username(room);
        self.run_command(commands::spawn_bot(&self.scenario.bot, room, &username))
            .await?;
        self.run_command(commands::set_password(&username, &self.scenario.password))
            .await?;
        Ok(())
    }

    /// Strip the bases of `rooms` down to their controller, with an extended safe mode.
    pub async fn prepare_bases(&self, rooms: &[RoomName]) -> Result<()> {
        let usernames = rooms
            .iter()
            .map(|room| self.scenario.username(room))
            .collect::<Vec<_>>();
        let response = self
            .run_command(commands::prepare_bases(
                &usernames,
                self.scenario.safe_mode_ticks,
            ))
            .await
            .context("Failed to prepare the room bases")?;
        debug!("Bases prepared: {response}");
        Ok(())
    }

    pub async fn resume_simulation(&self) -> Result<()> {
        self.run_command(commands::resume_simulation())
            .await
            .context("Failed to resume the simulation")?;
        Ok(())
    }
}

/// Feeds the tracker and keeps the milestones for the report.
#[derive(Debug)]
pub struct RunObserver {
    tracker: TelemetryTracker,
    milestones: Vec<RoomMilestone>,
}

impl RunObserver {
    pub fn new(tracker: TelemetryTracker) -> Self {
        Self {
            tracker,
            milestones: vec![],
        }
    }

    pub fn tracker(&self) -> &TelemetryTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut TelemetryTracker {
        &mut self.tracker
    }

    pub fn milestones(&self) -> &[RoomMilestone] {
        &self.milestones
    }

    pub fn into_parts(self) -> (TelemetryTracker, Vec<RoomMilestone>) {
        (self.tracker, self.milestones)
    }
}

impl EventConsumer for RunObserver {
    fn on_room_snapshot(&mut self, room: &str, snapshot: RoomSnapshot) {
        let milestones = self.tracker.on_room_snapshot(room, &snapshot);
        self.milestones.extend(
            milestones
                .into_iter()
                .filter(|milestone| !milestone.milestone.is_informational()),
        );
    }

    fn on_cpu_sample(&mut self, room: &str, sample: CpuSample) {
        self.tracker.on_cpu_sample(room, sample);
    }
}

/// Apply events until `predicate` holds. Fails if every subscription closes first.
pub async fn observe_until_complete(
    events: &mut UnboundedReceiver<RoomEvent>,
    observer: &mut RunObserver,
    predicate: &HorizonPredicate,
    status_interval: Duration,
) -> Result<()> {
    let mut status = interval(status_interval);
    status.set_missed_tick_behavior(MissedTickBehavior::Delay);
    status.tick().await;

    while !predicate.is_complete(observer.tracker()) {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => dispatch(observer, event),
                None => bail!("Every event subscription closed before the benchmark completed"),
            },
            _ = status.tick() => match observer.tracker().max_relative_tick() {
                Some(tick) => info!("Benchmark at tick {tick}/{}", predicate.horizon),
                None => info!("Waiting for the first room events"),
            },
        }
    }
    Ok(())
}

/// Start the server, run the benchmark against it and stop it, whatever the outcome.
pub async fn run_benchmark(
    config: &BenchmarkConfig,
    registry: &ProcessRegistry,
) -> Result<BenchmarkReport> {
    start_group!("Starting the server");
    let supervisor = ServerSupervisor::from_config(registry.clone(), &config.server);
    supervisor
        .start(&config.server.executable, &config.server.args)
        .await?;

    let result = drive_server(config).await;
    supervisor.terminate_all();
    result
}

async fn drive_server(config: &BenchmarkConfig) -> Result<BenchmarkReport> {
    let channel = HttpCommandChannel::new(config.server.cli_url()?, config.server.command_timeout);
    let waited = wait_until_ready(&channel, &ReadinessOptions::from(&config.readiness)).await?;
    info!(
        "Command channel ready after {}",
        humantime::format_duration(Duration::from_secs(waited.as_secs()))
    );
    end_group!();

    let session = ServerSession {
        api: GameApiClient::new(config.server.game_url()?),
        socket_url: config.server.socket_url()?,
        scenario: &config.benchmark,
    };
    run_scenario(&config.benchmark, &channel, &session).await
}

/// Game side of a run: the clock and the live room events.
#[async_trait(?Send)]
pub trait GameSession {
    /// Current absolute game tick
    async fn game_time(&self) -> Result<u64>;

    /// Open the event subscription of `room`, forwarding its events to `events`
    async fn subscribe(
        &self,
        room: &str,
        events: UnboundedSender<RoomEvent>,
    ) -> Result<JoinHandle<()>>;
}

/// [`GameSession`] over the game HTTP API and socket of the supervised server
pub struct ServerSession<'a> {
    api: GameApiClient,
    socket_url: Url,
    scenario: &'a ScenarioConfig,
}

#[async_trait(?Send)]
impl GameSession for ServerSession<'_> {
    async fn game_time(&self) -> Result<u64> {
        self.api.game_time().await
    }

    async fn subscribe(
        &self,
        room: &str,
        events: UnboundedSender<RoomEvent>,
    ) -> Result<JoinHandle<()>> {
        let username = self.scenario.username(room);
        let token = self.api.sign_in(&username, &self.scenario.password).await?;
        let user = self.api.current_user(&token, &username).await?;
        subscribe_room(
            &self.socket_url,
            RoomCredentials {
                room: room.to_owned(),
                token,
                user_id: user.id,
            },
            events,
        )
        .await
    }
}

/// Run the benchmark scenario against a server whose command channel is ready.
///
/// The tick offset is read after the bases are prepared and before any subscription opens, the
/// simulation only resumes once every room is subscribed.
pub async fn run_scenario(
    scenario: &ScenarioConfig,
    channel: &dyn CommandChannel,
    session: &dyn GameSession,
) -> Result<BenchmarkReport> {
    let orchestrator = Orchestrator::new(channel, scenario);

    start_group!("Preparing the simulation");
    orchestrator.prepare_simulation().await?;
    let mut setup = orchestrator.setup_rooms().await?;
    orchestrator.prepare_bases(&setup.ready).await?;
    end_group!();

    let tick_offset = session.game_time().await?;
    let mut observer = RunObserver::new(TelemetryTracker::new(scenario.tracker_settings()));
    observer.tracker_mut().set_tick_offset(tick_offset);

    start_group!("Subscribing to room events");
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut subscriptions: Vec<JoinHandle<()>> = vec![];
    let mut subscribed_rooms = vec![];
    for room in &setup.ready {
        match session.subscribe(room, events_tx.clone()).await {
            Ok(handle) => {
                subscriptions.push(handle);
                subscribed_rooms.push(room.clone());
            }
            Err(err) if scenario.room_failure_policy == RoomFailurePolicy::Continue => {
                warn!("[{room}] Could not subscribe, continuing without it: {err:#}");
                setup.failed.push(FailedRoom {
                    room: room.clone(),
                    reason: format!("{err:#}"),
                });
            }
            Err(err) => return Err(err.context(format!("Failed to subscribe to room {room}"))),
        }
    }
    drop(events_tx);
    ensure!(
        !subscribed_rooms.is_empty(),
        "None of the rooms could be subscribed to"
    );
    end_group!();

    orchestrator.resume_simulation().await?;
    info!(
        "Benchmark started at tick {tick_offset}, running for {} ticks",
        scenario.horizon_ticks
    );

    let predicate = HorizonPredicate::new(
        scenario.horizon_ticks,
        scenario.completion,
        subscribed_rooms,
    );
    let outcome = observe_until_complete(
        &mut events,
        &mut observer,
        &predicate,
        scenario.status_interval,
    )
    .await;
    for subscription in &subscriptions {
        subscription.abort();
    }
    outcome?;

    info!("Benchmark horizon of {} ticks reached", scenario.horizon_ticks);
    let (tracker, milestones) = observer.into_parts();
    Ok(BenchmarkReport::new(
        tick_offset,
        scenario.horizon_ticks,
        &tracker,
        milestones,
        setup.failed,
    ))
}
