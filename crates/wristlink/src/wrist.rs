//! The wrist side of a workout session.
//!
//! A [`WristSession`] owns the authoritative lifecycle. It starts on the first
//! instruction it receives, applies commands to its own state and stamps
//! everything it sends with that state, so the handheld can reconcile from
//! any single report.
//!
//! An instruction carrying a step duration arms a timer. Once the workout has
//! been running longer than that, [`WristSession::check_duration`] stops it the
//! same way a `Stop` command would.

use chrono::{DateTime, TimeDelta, Utc};
use codee::Decoder;
use tracing::{debug, info, trace, warn};
use wristlink_common::codec::{ArchiveCodec, JsonCodec};
use wristlink_common::{
    Direction, Envelope, ErrorMessage, ErrorReport, EventMessage, FieldMap, InstructionMessage,
    MessageId, MessageRegistry, Payload, QuantitySample, SamplesMessage, WorkoutCommand,
    WorkoutEvent, WorkoutEventType, WorkoutState,
};

use crate::config::SessionConfig;
use crate::dedupe::RecentIds;
use crate::error::{DiscardReason, SessionError, TransportError};
use crate::session::{ReceiveOutcome, discard_malformed, screen};
use crate::state::Transition;
use crate::transport::Transport;

/// Wrist-side peer of an [`Orchestrator`](crate::Orchestrator).
///
/// Accepts only handheld-to-wrist messages and reports every state change it
/// makes through its transport.
pub struct WristSession<T: Transport> {
    transport: T,
    config: SessionConfig,
    registry: MessageRegistry,
    recent: RecentIds,
    state: WorkoutState,
    is_moving: bool,
    started_at: Option<DateTime<Utc>>,
    events: Vec<WorkoutEvent>,
    last_instruction: Option<InstructionMessage>,
    duration_limit: Option<TimeDelta>,
    timer_started_at: Option<DateTime<Utc>>,
}

impl<T: Transport> WristSession<T> {
    /// Create a peer with the default [`SessionConfig`].
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create a peer with an explicit configuration.
    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            recent: RecentIds::new(config.duplicate_capacity),
            config,
            registry: MessageRegistry::standard().clone(),
            state: WorkoutState::NotStarted,
            is_moving: false,
            started_at: None,
            events: Vec::new(),
            last_instruction: None,
            duration_limit: None,
            timer_started_at: None,
        }
    }

    /// The wrist's own lifecycle state.
    pub fn state(&self) -> WorkoutState {
        self.state
    }

    /// Whether the participant is currently expected to be moving.
    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    /// When the first instruction started the workout.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Lifecycle events generated so far.
    pub fn events(&self) -> &[WorkoutEvent] {
        &self.events
    }

    /// The most recent instruction, for display on the wrist.
    pub fn last_instruction(&self) -> Option<&InstructionMessage> {
        self.last_instruction.as_ref()
    }

    /// How long the workout may run before it stops itself, if armed.
    pub fn duration_limit(&self) -> Option<TimeDelta> {
        self.duration_limit
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn is_collecting(&self) -> bool {
        self.started_at.is_some() && self.state != WorkoutState::Ended
    }

    /// Forward a batch of samples collected by the wrist.
    pub fn send_samples(
        &mut self,
        quantity_type: impl Into<String>,
        samples: Vec<QuantitySample>,
    ) -> Result<MessageId, SessionError> {
        if !self.is_collecting() {
            return Err(SessionError::NoActiveSession);
        }
        Ok(self.emit(SamplesMessage::new(quantity_type, samples))?)
    }

    /// Forward an error raised on the wrist.
    pub fn report_error(&mut self, error: ErrorReport) -> Result<MessageId, SessionError> {
        if self.started_at.is_none() {
            return Err(SessionError::NoActiveSession);
        }
        warn!("Reporting wrist error: {error}");
        Ok(self.emit(ErrorMessage::new(error))?)
    }

    /// Record and forward an event that does not change the lifecycle, such as
    /// a lap or a marker.
    pub fn mark(&mut self, event_type: WorkoutEventType) -> Result<MessageId, SessionError> {
        if !self.is_collecting() {
            return Err(SessionError::NoActiveSession);
        }
        let event = WorkoutEvent::new(event_type, Utc::now());
        self.events.push(event.clone());
        Ok(self.emit(EventMessage::new(event))?)
    }

    /// Stop the workout when it has been running longer than the step
    /// duration of the instruction that armed the timer.
    ///
    /// Returns whether the workout was stopped. Paused time still counts
    /// toward the limit, but the stop only happens while running.
    pub fn check_duration(&mut self, now: DateTime<Utc>) -> Result<bool, SessionError> {
        let (Some(limit), Some(armed_at)) = (self.duration_limit, self.timer_started_at) else {
            return Ok(false);
        };
        if self.state != WorkoutState::Running || now - armed_at <= limit {
            return Ok(false);
        }

        info!("Workout ran past its {}s step duration; stopping", limit.num_seconds());
        self.duration_limit = None;
        self.timer_started_at = None;
        self.stop()?;
        Ok(true)
    }

    /// Apply one inbound field map.
    pub fn receive(&mut self, fields: &FieldMap) -> ReceiveOutcome {
        let envelope = match self.registry.decode(fields) {
            Ok(envelope) => envelope,
            Err(e) => return discard_malformed(e),
        };

        if let Some(outcome) = screen(
            &envelope,
            Direction::HandheldToWrist,
            &self.recent,
            &self.config,
            self.started_at,
        ) {
            return outcome;
        }

        let Payload::Instruction(instruction) = envelope.payload() else {
            return ReceiveOutcome::Discarded(DiscardReason::UnexpectedDirection {
                type_tag: envelope.type_tag(),
            });
        };

        if self.state == WorkoutState::Ended && instruction.command != Some(WorkoutCommand::Ping) {
            debug!("Ignoring instruction {} after the workout ended", envelope.identifier());
            return ReceiveOutcome::Discarded(DiscardReason::SessionClosed);
        }

        self.recent.insert(envelope.identifier().clone());
        let instruction = instruction.clone();
        let from = self.state;

        if let Err(e) = self.handle_instruction(&instruction) {
            warn!("Failed to report to the handheld: {e}");
        }
        self.last_instruction = Some(instruction);

        let transition = (self.state != from).then_some(Transition {
            from,
            to: self.state,
        });
        ReceiveOutcome::Applied { transition }
    }

    /// Decode JSON text and apply it.
    pub fn receive_json(&mut self, text: &str) -> ReceiveOutcome {
        match JsonCodec::decode(text) {
            Ok(fields) => self.receive(&fields),
            Err(e) => discard_malformed(e),
        }
    }

    /// Decode an archive frame and apply it.
    pub fn receive_archive(&mut self, bytes: &[u8]) -> ReceiveOutcome {
        match ArchiveCodec::decode(bytes) {
            Ok(fields) => self.receive(&fields),
            Err(e) => discard_malformed(e),
        }
    }

    fn handle_instruction(&mut self, instruction: &InstructionMessage) -> Result<(), TransportError> {
        if self.started_at.is_none() {
            self.start()?;
        }
        self.arm_timer(instruction.step_duration);

        let Some(command) = instruction.command else {
            return Ok(());
        };
        trace!("Applying {command} in state {}", self.state);

        match (command, self.state) {
            (WorkoutCommand::Pause, WorkoutState::Running) => {
                self.transition(WorkoutState::Paused, Some(WorkoutEventType::Pause))
            }
            (WorkoutCommand::Resume, WorkoutState::Paused) => {
                self.transition(WorkoutState::Running, Some(WorkoutEventType::Resume))
            }
            (WorkoutCommand::Stop, state) if state != WorkoutState::Ended => self.stop(),
            (WorkoutCommand::StartMoving | WorkoutCommand::StopMoving, _) => {
                self.is_moving = command == WorkoutCommand::StartMoving;
                Ok(())
            }
            // Pings and commands that do not apply in the current state get a
            // report of the current state instead.
            _ => self.report_state(),
        }
    }

    fn start(&mut self) -> Result<(), TransportError> {
        self.started_at = Some(Utc::now());
        info!("Wrist workout starting");
        self.transition(WorkoutState::Starting, None)?;
        self.transition(WorkoutState::Running, None)
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        self.transition(WorkoutState::Stopping, None)?;
        self.transition(WorkoutState::Ended, None)
    }

    // A positive step duration (re)starts the timer; zero disarms it.
    fn arm_timer(&mut self, step_duration: Option<f64>) {
        let Some(seconds) = step_duration.filter(|s| s.is_finite()) else {
            return;
        };
        if seconds > 0.0 {
            self.duration_limit = Some(TimeDelta::milliseconds((seconds * 1000.0) as i64));
            self.timer_started_at = Some(Utc::now());
        } else {
            self.duration_limit = None;
            self.timer_started_at = None;
        }
    }

    fn transition(
        &mut self,
        to: WorkoutState,
        event_type: Option<WorkoutEventType>,
    ) -> Result<(), TransportError> {
        debug!("Wrist state {} -> {to}", self.state);
        self.state = to;

        let mut event = WorkoutEvent::state_report(to);
        if let Some(event_type) = event_type {
            event = WorkoutEvent::new(event_type, Utc::now()).with_state(to);
            self.events.push(event.clone());
        }
        self.emit(EventMessage::new(event)).map(|_| ())
    }

    fn report_state(&mut self) -> Result<(), TransportError> {
        self.emit(EventMessage::new(WorkoutEvent::state_report(self.state)))
            .map(|_| ())
    }

    fn emit(&mut self, payload: impl Into<Payload>) -> Result<MessageId, TransportError> {
        let envelope = Envelope::new(payload).with_reported_state(self.state);
        self.transport.deliver(envelope.to_fields())?;
        Ok(envelope.identifier().clone())
    }
}
