use crate::{
    error::InternalError,
    registry::{EntityIndexes, IndexDescriptor},
    update::IndexUpdate,
    value::Value,
    writer::PropertyMap,
};
use std::sync::Arc;

///
/// PlannedUpdate
///
/// One non-noop update bound to the index it targets.
///

#[derive(Clone, Debug)]
pub(crate) struct PlannedUpdate {
    pub descriptor: Arc<IndexDescriptor>,
    pub update: IndexUpdate,
}

/// Diff two property images over every index selected by `filter`.
///
/// Missing properties read as `Null`. Images are normalized to index keys,
/// so moving between `Null` and the null sentinel is not a change.
pub(crate) fn diff(
    indexes: &EntityIndexes,
    before: &PropertyMap,
    after: &PropertyMap,
    filter: impl Fn(&IndexDescriptor) -> bool,
) -> Result<Vec<PlannedUpdate>, InternalError> {
    let mut planned = Vec::new();

    for descriptor in indexes.iter().filter(|d| filter(d)) {
        let image = |map: &PropertyMap| {
            descriptor.index_key(map.get(descriptor.property()).unwrap_or(&Value::Null))
        };
        let update = IndexUpdate::from_images(image(before)?, image(after)?);

        if !update.is_noop() {
            planned.push(PlannedUpdate {
                descriptor: Arc::clone(descriptor),
                update,
            });
        }
    }

    Ok(planned)
}
