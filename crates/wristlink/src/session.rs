//! The handheld side of a workout session.
//!
//! An [`Orchestrator`] owns the [`StateMachine`], sends instructions through a
//! [`Transport`] and folds whatever the wrist reports back into both the
//! machine and the in-flight [`SessionRecord`].
//!
//! ## Example
//!
//! ```rust
//! use wristlink::{Orchestrator, ReceiveOutcome, WorkoutConfiguration};
//! use wristlink::activity::ActivityType;
//! use wristlink_common::{FieldMap, WorkoutCommand, WorkoutState};
//!
//! let mut session = Orchestrator::new(Vec::<FieldMap>::new());
//! session
//!     .start(&WorkoutConfiguration::new(ActivityType::Walking).with_instruction("Walk"))
//!     .unwrap();
//!
//! let report = r#"{"type":"event","event":{"state":"Running"},"workoutState":"Running"}"#;
//! assert!(matches!(session.receive_json(report), ReceiveOutcome::Applied { .. }));
//! assert_eq!(session.state(), WorkoutState::Running);
//!
//! session.send(WorkoutCommand::Stop).unwrap();
//! assert_eq!(session.transport().len(), 2);
//!
//! let record = session.finalize();
//! assert_eq!(record.final_state, WorkoutState::Running);
//! assert!(record.user_ended);
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use codee::Decoder;
use tracing::{debug, info, warn};
use wristlink_common::codec::{ArchiveCodec, JsonCodec};
use wristlink_common::{
    DecodeError, DeviceDescriptor, Direction, Envelope, ErrorReport, FieldMap, InstructionMessage,
    MessageId, MessageRegistry, Payload, QuantitySample, WorkoutCommand, WorkoutEvent,
    WorkoutState,
};

use crate::config::{SessionConfig, WorkoutConfiguration};
use crate::dedupe::RecentIds;
use crate::error::{DiscardReason, SessionError};
use crate::record::{RecordDraft, SessionRecord};
use crate::state::{Expectation, Observation, StateMachine, Transition};
use crate::transport::Transport;

/// Callbacks an embedding application receives as reports arrive.
///
/// Every method defaults to a no-op, so implementors only override what they
/// care about. Callbacks run synchronously inside `receive`.
pub trait SessionDelegate: Send {
    /// A batch of samples arrived.
    fn on_samples(&mut self, _quantity_type: &str, _samples: &[QuantitySample]) {}

    /// A lifecycle event arrived.
    fn on_event(&mut self, _event: &WorkoutEvent) {}

    /// The wrist reported an error.
    fn on_error(&mut self, _error: &ErrorReport) {}

    /// The machine's current state changed.
    fn on_state_changed(&mut self, _transition: Transition) {}
}

/// What `receive` did with one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    /// The message was folded into the session.
    Applied {
        /// State change it caused, if any
        transition: Option<Transition>,
    },
    /// The payload was folded into the record, but the state it reported was
    /// dropped because the session had already ended.
    ReportAfterEnd,
    /// A message with the same identifier was already applied.
    Duplicate(MessageId),
    /// The message was dropped without touching the session.
    Discarded(DiscardReason),
}

impl ReceiveOutcome {
    /// Whether the message was accepted, even if its reported state was not.
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            ReceiveOutcome::Applied { .. } | ReceiveOutcome::ReportAfterEnd
        )
    }
}

/// Check an envelope against the receiving side's session before applying it.
pub(crate) fn screen(
    envelope: &Envelope,
    accepts: Direction,
    recent: &RecentIds,
    config: &SessionConfig,
    started_at: Option<DateTime<Utc>>,
) -> Option<ReceiveOutcome> {
    if recent.contains(envelope.identifier()) {
        debug!("Dropping duplicate message {}", envelope.identifier());
        return Some(ReceiveOutcome::Duplicate(envelope.identifier().clone()));
    }

    if envelope.direction() != accepts {
        let reason = DiscardReason::UnexpectedDirection {
            type_tag: envelope.type_tag(),
        };
        debug!("Discarding message {}: {reason}", envelope.identifier());
        return Some(ReceiveOutcome::Discarded(reason));
    }

    if config.reject_stale {
        if let Some(started_at) = started_at.filter(|start| envelope.timestamp() < *start) {
            let reason = DiscardReason::Stale {
                timestamp: envelope.timestamp(),
                started_at,
            };
            debug!("Discarding message {}: {reason}", envelope.identifier());
            return Some(ReceiveOutcome::Discarded(reason));
        }
    }

    None
}

pub(crate) fn discard_malformed(error: impl Into<DecodeError>) -> ReceiveOutcome {
    let reason = DiscardReason::Malformed(error.into());
    debug!("Discarding inbound message: {reason}");
    ReceiveOutcome::Discarded(reason)
}

/// Handheld-side driver of one workout session.
///
/// Single-threaded: every operation takes `&mut self`. The orchestrator is
/// `Send` whenever its transport is, so it can be moved to a worker thread or
/// put behind a mutex.
pub struct Orchestrator<T: Transport> {
    transport: T,
    config: SessionConfig,
    registry: MessageRegistry,
    delegate: Option<Box<dyn SessionDelegate>>,
    machine: StateMachine,
    recent: RecentIds,
    draft: RecordDraft,
    workout: Option<WorkoutConfiguration>,
    started_at: Option<DateTime<Utc>>,
    finalized: Option<Arc<SessionRecord>>,
}

impl<T: Transport> Orchestrator<T> {
    /// Create an orchestrator with the default [`SessionConfig`].
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create an orchestrator with an explicit configuration.
    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            recent: RecentIds::new(config.duplicate_capacity),
            config,
            registry: MessageRegistry::standard().clone(),
            delegate: None,
            machine: StateMachine::new(),
            draft: RecordDraft::default(),
            workout: None,
            started_at: None,
            finalized: None,
        }
    }

    /// Decode inbound messages with `registry` instead of the standard one.
    pub fn with_registry(mut self, registry: MessageRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Receive callbacks through `delegate`.
    pub fn with_delegate(mut self, delegate: impl SessionDelegate + 'static) -> Self {
        self.delegate = Some(Box::new(delegate));
        self
    }

    /// The last state the wrist reported.
    pub fn state(&self) -> WorkoutState {
        self.machine.current()
    }

    /// The underlying state machine.
    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// The outstanding expectation, if any.
    pub fn expectation(&self) -> Option<Expectation> {
        self.machine.expectation()
    }

    /// Whether the last moving command was `StartMoving`.
    pub fn is_moving(&self) -> bool {
        self.machine.is_moving()
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The workout passed to `start`.
    pub fn workout(&self) -> Option<&WorkoutConfiguration> {
        self.workout.as_ref()
    }

    /// When `start` sent the initial instruction.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Whether `finalize` has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Whether `send` would currently be accepted.
    pub fn is_active(&self) -> bool {
        self.started_at.is_some() && !self.is_finalized() && self.state() != WorkoutState::Ended
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Begin the session by sending the initial instruction.
    ///
    /// The instruction carries the configuration's text and step duration and
    /// no command.
    pub fn start(&mut self, workout: &WorkoutConfiguration) -> Result<MessageId, SessionError> {
        if self.is_finalized() {
            return Err(SessionError::SessionFinalized);
        }
        if self.started_at.is_some() {
            warn!("start called on an already active session");
            return Err(SessionError::AlreadyActive);
        }

        let envelope = Envelope::new(InstructionMessage {
            instruction: workout.instruction.clone(),
            step_duration: workout.step_duration,
            command: None,
        });
        let id = self.deliver(&envelope)?;

        self.started_at = Some(envelope.timestamp());
        self.workout = Some(workout.clone());
        self.machine.expect_start();
        info!("Started {} workout session ({id})", workout.activity_type);
        Ok(id)
    }

    /// Send a command to the wrist.
    pub fn send(&mut self, command: WorkoutCommand) -> Result<MessageId, SessionError> {
        self.ensure_active()?;
        let id = self.deliver(&Envelope::new(InstructionMessage::command(command)))?;

        self.machine.apply_command(command);
        if command == WorkoutCommand::Stop {
            self.draft.mark_user_ended();
        }
        debug!("Sent {command} ({id})");
        Ok(id)
    }

    /// Send an informational instruction without a command.
    pub fn instruct(
        &mut self,
        text: impl Into<String>,
        step_duration: Option<f64>,
    ) -> Result<MessageId, SessionError> {
        self.ensure_active()?;
        self.deliver(&Envelope::new(InstructionMessage::text(text, step_duration)))
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.is_active() {
            Ok(())
        } else {
            warn!("No active session (state {})", self.state());
            Err(SessionError::NoActiveSession)
        }
    }

    fn deliver(&mut self, envelope: &Envelope) -> Result<MessageId, SessionError> {
        self.transport.deliver(envelope.to_fields())?;
        Ok(envelope.identifier().clone())
    }

    /// Capture the peer device. Only the first descriptor is kept.
    pub fn attach_device(&mut self, device: DeviceDescriptor) -> bool {
        let attached = self.draft.attach_device(device);
        if !attached {
            debug!("Device already attached; ignoring descriptor");
        }
        attached
    }

    /// Fold one inbound field map into the session.
    pub fn receive(&mut self, fields: &FieldMap) -> ReceiveOutcome {
        if self.is_finalized() {
            debug!("Discarding inbound message: session finalized");
            return ReceiveOutcome::Discarded(DiscardReason::SessionClosed);
        }

        let envelope = match self.registry.decode(fields) {
            Ok(envelope) => envelope,
            Err(e) => return discard_malformed(e),
        };
        self.apply(envelope)
    }

    /// Decode JSON text and fold it into the session.
    pub fn receive_json(&mut self, text: &str) -> ReceiveOutcome {
        match JsonCodec::decode(text) {
            Ok(fields) => self.receive(&fields),
            Err(e) => discard_malformed(e),
        }
    }

    /// Decode an archive frame and fold it into the session.
    pub fn receive_archive(&mut self, bytes: &[u8]) -> ReceiveOutcome {
        match ArchiveCodec::decode(bytes) {
            Ok(fields) => self.receive(&fields),
            Err(e) => discard_malformed(e),
        }
    }

    fn apply(&mut self, envelope: Envelope) -> ReceiveOutcome {
        if let Some(outcome) = screen(
            &envelope,
            Direction::WristToHandheld,
            &self.recent,
            &self.config,
            self.started_at,
        ) {
            return outcome;
        }
        self.recent.insert(envelope.identifier().clone());

        let reported = envelope.reported_state().or(match envelope.payload() {
            Payload::Event(message) => message.event.state,
            _ => None,
        });
        let observation = reported.map(|state| self.machine.observe(state, envelope.timestamp()));
        let transition = observation.and_then(Observation::transition);

        match envelope.payload() {
            Payload::Samples(message) => {
                self.draft
                    .add_samples(&message.quantity_type_identifier, &message.samples);
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.on_samples(&message.quantity_type_identifier, &message.samples);
                }
            }
            Payload::Event(message) => {
                self.draft.add_event(&message.event);
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.on_event(&message.event);
                }
            }
            Payload::Error(message) => {
                if self.draft.record_error(&message.error) {
                    warn!("Wrist reported error: {}", message.error);
                }
                if let Some(delegate) = self.delegate.as_mut() {
                    delegate.on_error(&message.error);
                }
            }
            // Rejected by `screen`
            Payload::Instruction(_) => {}
        }

        if let (Some(transition), Some(delegate)) = (transition, self.delegate.as_mut()) {
            delegate.on_state_changed(transition);
        }

        if observation == Some(Observation::IgnoredAfterEnd) {
            debug!("Session already ended; ignored state in {}", envelope.identifier());
            return ReceiveOutcome::ReportAfterEnd;
        }
        ReceiveOutcome::Applied { transition }
    }

    /// Close the session and produce its record.
    ///
    /// The record's `final_state` is the last state the wrist reported. The
    /// machine is then forced to [`WorkoutState::Ended`]. Calling this again
    /// returns the same record.
    pub fn finalize(&mut self) -> Arc<SessionRecord> {
        if let Some(record) = &self.finalized {
            return Arc::clone(record);
        }

        let final_state = self.machine.current();
        let draft = std::mem::take(&mut self.draft);
        let record = Arc::new(draft.finish(final_state, self.started_at, Utc::now()));

        if let Some(transition) = self.machine.force_end() {
            if let Some(delegate) = self.delegate.as_mut() {
                delegate.on_state_changed(transition);
            }
        }

        info!(
            "Finalized workout session: {} ({:?}), {} samples, {} events",
            record.final_state,
            record.end_reason,
            record.sample_count(),
            record.events.len()
        );
        self.finalized = Some(Arc::clone(&record));
        record
    }
}
