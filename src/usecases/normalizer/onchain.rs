//! On-chain reads: already scaled by the adapter, one metric per reading.

use serde_json::Value;

use crate::domain::entity::EntityInfo;
use crate::domain::observation::{ContractPayload, FetchError};

use super::{Sink, parse};

pub(crate) fn decode(sink: &mut Sink<'_>, payload: &Value) -> Result<(), FetchError> {
  let payload: ContractPayload = parse(payload, "contract payload")?;
  let entity = sink.spec().entity.clone();

  for reading in &payload.readings {
    sink.metric(&entity, &reading.metric, Some(reading.value), reading.unit);
  }

  let label = sink.spec().display_label().to_string();
  sink.describe(&entity, EntityInfo::Labelled { label });
  Ok(())
}
