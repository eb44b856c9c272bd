pub mod dates;
pub mod mapper;
pub mod model;
pub mod shape;

use crate::error::ParseError;
use mapper::{MappedModel, Provenance};
use model::ParsedModel;

/// Three-pass pipeline: raw JSON → parsed model → classified fields → target writes.
pub fn process_model(
    raw: &[u8],
    default_collection: &str,
    root: &str,
    provenance: &Provenance,
) -> Result<(ParsedModel, MappedModel), ParseError> {
    let model = model::parse_model(raw, default_collection)?;
    let mapped = mapper::map_model(&model, root, provenance);
    Ok((model, mapped))
}
