//! expfuse-engine - Expediente multi-source fusion engine
//!
//! Pure, synchronous fusion core: per-source candidate values in, fused
//! values with calibrated confidence and a routing decision out. No IO:
//! extraction pipelines feed records in, collaborators persist results.
//!
//! Two entry points share one decision procedure:
//! - `record::fuse_record` - asymmetric fusion across the heterogeneous
//!   pipelines (structured feed, document OCR, scanned OCR)
//! - `matching::FieldMatchingPolicy` - symmetric fusion over homogeneous,
//!   equally-trusted redundant extractions

pub mod decide;
pub mod matching;
pub mod record;
pub mod reliability;
pub mod similarity;
pub mod types;

pub use decide::decide;
pub use matching::{BestValueSelection, ExtractedValue, FieldMatchingPolicy, MergeResult};
pub use record::{
    fuse_field, fuse_record, ExpedienteRecord, NextAction, RecordFusionResult, SourceExtraction,
};
pub use reliability::reliability;
pub use similarity::similarity;
pub use types::{
    Confidence, ExtractionQualitySignals, FieldCandidate, FieldFusionResult, FusionDecision,
    SourceKind,
};
