//! Game rules: phases, movement, input, the round timer, the power-up, the state machine and
//! the play loop.

mod input;
mod movement;
mod phase;
mod play_loop;
mod power_up;
mod session_state;
mod state_machine;
mod timer;

pub use input::{Acceleration, AxisThresholds, ButtonLatch, Buttons, InputSample, JoystickConfig};
pub use movement::{distance, step, Arena, Direction, EdgePolicy, Position};
pub use phase::{EndCause, GamePhase, Outcome, PlayerType};
pub use play_loop::{PlayLoop, TickReport};
pub use power_up::PowerUp;
pub use session_state::SessionState;
pub use state_machine::{GameStateMachine, PhaseTrigger, Transition};
pub use timer::RoundTimer;
