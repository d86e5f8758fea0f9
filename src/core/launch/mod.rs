// ─── Launch ───
//   descriptor   JVM command line for a resolved version
//   process      ProcessStarter trait + real process spawning
//   orchestrator per-profile launch state machine

pub mod descriptor;
pub mod orchestrator;
pub mod process;

pub use descriptor::{build_descriptor, LaunchDescriptor};
pub use orchestrator::{LaunchEvent, LaunchOutcome, LaunchState, Orchestrator};
pub use process::{ProcessHandle, ProcessStarter, SystemProcessStarter};
