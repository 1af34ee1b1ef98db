#![deny(
    missing_docs,
    trivial_casts,
    unstable_features,
    unused_import_braces,
    clippy::unwrap_used
)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/*!
Session endpoints for a handheld/wrist workout link.

The handheld drives a workout with an [`Orchestrator`]: it starts the session,
sends commands, and folds the wrist's asynchronous reports into a
[`StateMachine`](state::StateMachine) that always reflects the latest state the
wrist reported. The wrist counterpart is a [`WristSession`]. Both talk through a
[`Transport`](transport::Transport); messages are defined in
[`wristlink_common`].

Reports may arrive late, twice, or not at all. Duplicates are dropped by
identifier, every report overwrites the state (nothing leaves `Ended`), and a
command only records what the handheld expects to see next.

## Loopback

```rust
use wristlink::{Orchestrator, WristSession, WorkoutConfiguration};
use wristlink::transport::ChannelTransport;
use wristlink_common::{WorkoutCommand, WorkoutState};

let (to_wrist, wrist_inbox) = ChannelTransport::unbounded();
let (to_handheld, handheld_inbox) = ChannelTransport::unbounded();

let mut handheld = Orchestrator::new(to_wrist);
let mut wrist = WristSession::new(to_handheld);

let pump = |handheld: &mut Orchestrator<_>, wrist: &mut WristSession<_>| {
    while let Ok(fields) = wrist_inbox.try_recv() {
        wrist.receive(&fields);
    }
    while let Ok(fields) = handheld_inbox.try_recv() {
        handheld.receive(&fields);
    }
};

handheld.start(&WorkoutConfiguration::default()).unwrap();
pump(&mut handheld, &mut wrist);
assert_eq!(handheld.state(), WorkoutState::Running);

handheld.send(WorkoutCommand::Stop).unwrap();
pump(&mut handheld, &mut wrist);
assert_eq!(handheld.state(), WorkoutState::Ended);
```
*/

pub mod activity;
pub mod config;
mod dedupe;
pub mod error;
pub mod record;
pub mod session;
pub mod state;
pub mod transport;
pub mod wrist;

pub use config::{SessionConfig, WorkoutConfiguration};
pub use error::{DiscardReason, SessionError, TransportError};
pub use record::{EndReason, SessionRecord};
pub use session::{Orchestrator, ReceiveOutcome, SessionDelegate};
pub use state::{Observation, StateMachine, Transition};
pub use transport::Transport;
pub use wrist::WristSession;

pub use wristlink_common;
