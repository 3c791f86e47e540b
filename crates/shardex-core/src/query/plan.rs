use crate::{
    error::InternalError,
    index::{BucketDirectory, HashIndex},
    model::EntityRef,
    query::{Predicate, QueryError},
    registry::IndexRegistry,
    value::Value,
};
use futures::future::{BoxFuture, FutureExt, try_join_all};
use std::{collections::BTreeSet, sync::Arc};

///
/// LookupPlan
///
/// A predicate resolved against the registry.
///

#[derive(Clone)]
pub enum LookupPlan {
    Lookup { index: HashIndex, key: Value },
    Intersect(Vec<Self>),
    Union(Vec<Self>),
}

impl LookupPlan {
    /// Resolve every leaf to an index; reject non-indexed properties.
    pub fn translate(
        registry: &IndexRegistry,
        directory: &Arc<BucketDirectory>,
        interface: &str,
        predicate: &Predicate,
    ) -> Result<Self, QueryError> {
        match predicate {
            Predicate::Eq { property, value } => {
                let descriptor = registry
                    .entity(interface)
                    .ok()
                    .and_then(|e| e.index(property))
                    .ok_or_else(|| QueryError::NotIndexed {
                        interface: interface.to_string(),
                        property: property.clone(),
                    })?;

                if let Some(kind) = value.kind()
                    && kind != descriptor.key_kind
                {
                    return Err(QueryError::KindMismatch {
                        property: property.clone(),
                        expected: descriptor.key_kind,
                        value: value.clone(),
                    });
                }

                Ok(Self::Lookup {
                    index: HashIndex::new(Arc::clone(descriptor), Arc::clone(directory)),
                    key: value.clone(),
                })
            }
            Predicate::And(preds) | Predicate::Or(preds) => {
                if preds.is_empty() {
                    return Err(QueryError::EmptyComposite);
                }
                let plans = preds
                    .iter()
                    .map(|p| Self::translate(registry, directory, interface, p))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(if matches!(predicate, Predicate::And(_)) {
                    Self::Intersect(plans)
                } else {
                    Self::Union(plans)
                })
            }
        }
    }

    /// Run the plan; sibling lookups run concurrently.
    pub fn execute(&self) -> BoxFuture<'_, Result<BTreeSet<EntityRef>, InternalError>> {
        async move {
            match self {
                Self::Lookup { index, key } => index.lookup(key).await,
                Self::Intersect(plans) => {
                    let sets = try_join_all(plans.iter().map(Self::execute)).await?;
                    let mut sets = sets.into_iter();
                    let first = sets.next().unwrap_or_default();

                    Ok(sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect()))
                }
                Self::Union(plans) => {
                    let sets = try_join_all(plans.iter().map(Self::execute)).await?;

                    Ok(sets.into_iter().flatten().collect())
                }
            }
        }
        .boxed()
    }
}
