mod analysis;
mod constants;
mod supervisor;
mod timing;
mod workers;

pub use analysis::AnalysisConfig;
pub use constants::*;
pub use supervisor::SupervisorConfig;
pub use timing::TimingConfig;
pub use workers::WorkerEntry;
