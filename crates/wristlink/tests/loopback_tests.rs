#![cfg(feature = "channel")]

use async_channel::Receiver;
use chrono::{TimeDelta, Utc};
use wristlink::activity::ActivityType;
use wristlink::transport::ChannelTransport;
use wristlink::{EndReason, Orchestrator, WorkoutConfiguration, WristSession};
use wristlink_common::{FieldMap, QuantitySample, WorkoutCommand, WorkoutState};

struct Link {
    handheld: Orchestrator<ChannelTransport>,
    wrist: WristSession<ChannelTransport>,
    wrist_inbox: Receiver<FieldMap>,
    handheld_inbox: Receiver<FieldMap>,
}

impl Link {
    fn new() -> Self {
        let (to_wrist, wrist_inbox) = ChannelTransport::unbounded();
        let (to_handheld, handheld_inbox) = ChannelTransport::unbounded();
        Self {
            handheld: Orchestrator::new(to_wrist),
            wrist: WristSession::new(to_handheld),
            wrist_inbox,
            handheld_inbox,
        }
    }

    // Deliver everything queued in both directions until both inboxes are empty
    fn pump(&mut self) {
        loop {
            let mut moved = false;
            while let Ok(fields) = self.wrist_inbox.try_recv() {
                self.wrist.receive(&fields);
                moved = true;
            }
            while let Ok(fields) = self.handheld_inbox.try_recv() {
                self.handheld.receive(&fields);
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }
}

#[test]
fn test_loopback_reaches_ended_after_stop() {
    let mut link = Link::new();

    link.handheld
        .start(&WorkoutConfiguration::new(ActivityType::Running).with_instruction("Go"))
        .unwrap();
    link.pump();
    assert_eq!(link.wrist.state(), WorkoutState::Running);
    assert_eq!(link.handheld.state(), WorkoutState::Running);
    assert_eq!(link.handheld.expectation(), None);
    assert_eq!(
        link.wrist.last_instruction().and_then(|i| i.instruction.as_deref()),
        Some("Go")
    );

    link.wrist
        .send_samples("heartRate", vec![QuantitySample::new(88.0), QuantitySample::new(91.0)])
        .unwrap();
    link.handheld.send(WorkoutCommand::Stop).unwrap();
    link.pump();

    assert_eq!(link.wrist.state(), WorkoutState::Ended);
    assert_eq!(link.handheld.state(), WorkoutState::Ended);
    assert_eq!(link.handheld.expectation(), None);

    let record = link.handheld.finalize();
    assert_eq!(record.final_state, WorkoutState::Ended);
    assert_eq!(record.end_reason, EndReason::Completed);
    assert!(record.user_ended);
    assert_eq!(record.samples_of("heartRate").len(), 2);
}

#[test]
fn test_loopback_pause_resume() {
    let mut link = Link::new();
    link.handheld.start(&WorkoutConfiguration::default()).unwrap();
    link.pump();

    link.handheld.send(WorkoutCommand::Pause).unwrap();
    link.pump();
    assert_eq!(link.handheld.state(), WorkoutState::Paused);

    link.handheld.send(WorkoutCommand::Resume).unwrap();
    link.pump();
    assert_eq!(link.handheld.state(), WorkoutState::Running);
    assert_eq!(link.handheld.expectation(), None);

    link.handheld.send(WorkoutCommand::StartMoving).unwrap();
    link.pump();
    assert!(link.handheld.is_moving());
    assert!(link.wrist.is_moving());

    let record = link.handheld.finalize();
    assert_eq!(record.events.len(), 4);
    assert_eq!(record.end_reason, EndReason::Abandoned);
}

#[test]
fn test_ping_gets_a_state_report() {
    let mut link = Link::new();
    link.handheld.start(&WorkoutConfiguration::default()).unwrap();
    link.pump();
    let before = link.handheld.machine().observation_count();

    link.handheld.send(WorkoutCommand::Ping).unwrap();
    link.pump();
    assert_eq!(link.handheld.machine().observation_count(), before + 1);
    assert_eq!(link.handheld.state(), WorkoutState::Running);
}

#[test]
fn test_wrist_stops_after_step_duration() {
    let mut link = Link::new();
    link.handheld
        .start(&WorkoutConfiguration::new(ActivityType::Walking).with_step_duration(360.0))
        .unwrap();
    link.pump();
    assert_eq!(link.handheld.state(), WorkoutState::Running);

    assert!(!link.wrist.check_duration(Utc::now()).unwrap());
    assert!(link
        .wrist
        .check_duration(Utc::now() + TimeDelta::seconds(361))
        .unwrap());
    link.pump();

    assert_eq!(link.handheld.state(), WorkoutState::Ended);
    let record = link.handheld.finalize();
    assert_eq!(record.end_reason, EndReason::Completed);
    assert!(!record.user_ended);
}
