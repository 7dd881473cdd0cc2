//! Remote command text for each intent.

use crate::model::{ChunkRegion, Dimension, SessionName};
use crate::parser::artifact_base_name;

pub(crate) fn start(name: &SessionName, dimension: Dimension, region: ChunkRegion) -> String {
    format!(
        "replay start chunks from {} to {} in minecraft:{} named {}",
        region.start,
        region.end,
        dimension.resource_path(),
        name
    )
}

pub(crate) fn stop(name: &SessionName) -> String {
    format!("replay stop chunks named {name}")
}

pub(crate) fn download(name: &SessionName, artifact_file: &str) -> String {
    format!(
        "replay download chunks \"{name}\" \"{}\"",
        artifact_base_name(artifact_file)
    )
}
