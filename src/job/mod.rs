// Job lifecycle from submission to artifact handoff.

pub mod handoff;
pub mod id;
pub mod record;
pub mod runner;
pub mod store;
pub mod sweeper;
pub mod workdir;

pub use handoff::{Artifact, ArtifactHandoff, FetchOutcome};
pub use record::{JobKind, JobRecord, JobState};
pub use runner::{JobRunner, Submission};
pub use store::JobStore;
pub use workdir::WorkDir;
