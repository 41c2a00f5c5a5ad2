//! Domain layer - Aggregation model.
//!
//! Pure types for one aggregation cycle: source specifications, raw
//! observations, normalized metrics, entity descriptors and the final
//! report. No I/O happens here; everything is serializable and testable
//! in isolation.

pub mod cycle;
pub mod entity;
pub mod metric;
pub mod observation;
pub mod report;
pub mod scaling;
pub mod source;

pub use cycle::{CycleError, CyclePhase, PhaseTracker};
pub use entity::{EntityDescriptor, EntityInfo};
pub use metric::{Figure, Metric};
pub use observation::{FetchError, Observation, ObservationStatus};
pub use report::{EcosystemReport, MarketSnapshot, SectionName, SectionResult, SectionStatus};
pub use source::{SourceId, SourceKind, SourceQuery, SourceSpec, Unit};
