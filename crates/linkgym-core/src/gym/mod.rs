//! External-agent exchange: configuration, measurements and the step loop
//!
//! Layering, outermost first:
//!
//! ```text
//!   +--------------------------------------------------+
//!   |  StepLoop        fixed-cadence emit/wait/apply   |
//!   +--------------------------------------------------+
//!   |  Transport       Null | Channel | Tcp (NDJSON)   |
//!   +--------------------------------------------------+
//!   |  Measurement / Action     the exchanged records  |
//!   +--------------------------------------------------+
//!   |  EnvConfig       timing parameters (JSON file)   |
//!   +--------------------------------------------------+
//! ```
//!
//! The loop is transport-agnostic: a scenario wires it to an in-process
//! channel for tests, a TCP socket for a real agent, or the null
//! transport to run open-loop.

pub mod config;
pub mod measure;
pub mod steploop;
pub mod transport;

pub use config::EnvConfig;
pub use measure::{Action, ActionValue, Measurement};
pub use steploop::{StepLoop, StepLoopState, StepOutcome};
pub use transport::{AgentEndpoint, ChannelTransport, NullTransport, TcpTransport, Transport};
