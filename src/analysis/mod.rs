pub mod aggregator;
pub mod controller;
pub mod external;
pub mod params;
pub mod state;
pub mod worker;

pub use aggregator::{JobOutcome, RoundAggregator};
pub use controller::JobController;
pub use external::ExternalAnalyzer;
pub use params::{JobParameters, TimeInput, ValidatedParameters};
pub use state::{JobPhase, JobStatus};
pub use worker::{
    AnalysisRequest, AnalysisWorker, ProgressUpdate, RoundDetection, WorkerContext, WorkerEvent,
};
