pub mod capture;
pub mod capture_loop;
pub mod config;
pub mod diagnostics;
pub mod export;
pub mod ipc;
pub mod metronome;
pub mod session;
pub mod snapshot;

pub use capture::*;
pub use capture_loop::*;
pub use config::*;
pub use diagnostics::*;
pub use export::*;
pub use ipc::*;
pub use metronome::*;
pub use session::*;
pub use snapshot::*;
