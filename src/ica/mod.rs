pub mod processor;
pub mod quality_metrics;

pub use processor::{
    ComponentDecomposition, GFunction, ICAComponent, ICAParameters, ICAProcessor,
    RejectionCriteria,
};
pub use quality_metrics::QualityMetrics;
