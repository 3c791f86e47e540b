//! Reversible description of one indexed-property change.
//!
//! An `IndexUpdate` is an immutable base record (before-image, after-image,
//! operation) plus an ordered list of decorators. Every accessor is a pure
//! fold over that list, so the same diff can be reinterpreted (overridden,
//! reversed, marked tentative) without re-reading entity state. Wrapping
//! returns a new update; the wrapped one is never touched.


use crate::{model::UpdateMode, value::Value};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// UpdateOp
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum UpdateOp {
    Insert,
    Update,
    Delete,
    None,
}

impl UpdateOp {
    /// Derive the operation implied by a before/after image pair.
    #[must_use]
    pub fn between(before: Option<&Value>, after: Option<&Value>) -> Self {
        match (before, after) {
            (None, None) => Self::None,
            (None, Some(_)) => Self::Insert,
            (Some(_), None) => Self::Delete,
            (Some(b), Some(a)) if b == a => Self::None,
            (Some(_), Some(_)) => Self::Update,
        }
    }

    /// Insert and Delete swap; Update and None are their own inverse.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Insert => Self::Delete,
            Self::Delete => Self::Insert,
            other => other,
        }
    }
}

impl Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::None => "none",
        };
        f.write_str(label)
    }
}

///
/// UpdateDecorator
///
/// One reinterpretation step applied on top of the base record.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum UpdateDecorator {
    /// Expose a different operation; the image that operation lacks reads as null.
    OverrideOperation(UpdateOp),
    /// Swap images and invert Insert/Delete.
    ReverseTentative,
    /// Provisional: reserves a unique key but stays invisible to lookups.
    Tentative,
    /// Attach the eager/lazy mode the update was produced under.
    WithMode(UpdateMode),
}

///
/// UpdateView
///
/// Folded interpretation of an update.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpdateView {
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub op: UpdateOp,
    pub tentative: bool,
    pub reversed: bool,
    pub mode: Option<UpdateMode>,
}

///
/// IndexUpdate
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexUpdate {
    before: Option<Value>,
    after: Option<Value>,
    op: UpdateOp,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    decorators: Vec<UpdateDecorator>,
}

impl IndexUpdate {
    /// Build an update from two index-key images; the operation is derived.
    #[must_use]
    pub fn from_images(before: Option<Value>, after: Option<Value>) -> Self {
        let op = UpdateOp::between(before.as_ref(), after.as_ref());

        Self {
            before,
            after,
            op,
            decorators: Vec::new(),
        }
    }

    #[must_use]
    pub fn insert(after: Value) -> Self {
        Self::from_images(None, Some(after))
    }

    #[must_use]
    pub fn delete(before: Value) -> Self {
        Self::from_images(Some(before), None)
    }

    /// Fold the decorator chain, innermost (first wrapped) first.
    #[must_use]
    pub fn view(&self) -> UpdateView {
        let mut view = UpdateView {
            before: self.before.clone(),
            after: self.after.clone(),
            op: self.op,
            tentative: false,
            reversed: false,
            mode: None,
        };

        for decorator in &self.decorators {
            match *decorator {
                UpdateDecorator::OverrideOperation(op) => {
                    match op {
                        UpdateOp::Insert => view.before = None,
                        UpdateOp::Delete => view.after = None,
                        UpdateOp::Update | UpdateOp::None => {}
                    }
                    view.op = op;
                }
                UpdateDecorator::ReverseTentative => {
                    std::mem::swap(&mut view.before, &mut view.after);
                    view.op = view.op.inverse();
                    view.reversed = !view.reversed;
                }
                UpdateDecorator::Tentative => view.tentative = true,
                UpdateDecorator::WithMode(mode) => view.mode = Some(mode),
            }
        }

        view
    }

    #[must_use]
    pub fn before_image(&self) -> Option<Value> {
        self.view().before
    }

    #[must_use]
    pub fn after_image(&self) -> Option<Value> {
        self.view().after
    }

    #[must_use]
    pub fn operation(&self) -> UpdateOp {
        self.view().op
    }

    #[must_use]
    pub fn is_tentative(&self) -> bool {
        self.view().tentative
    }

    #[must_use]
    pub fn mode(&self) -> Option<UpdateMode> {
        self.view().mode
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.operation() == UpdateOp::None
    }

    #[must_use]
    pub fn decorators(&self) -> &[UpdateDecorator] {
        &self.decorators
    }

    fn wrap(&self, decorator: UpdateDecorator) -> Self {
        let mut wrapped = self.clone();
        wrapped.decorators.push(decorator);
        wrapped
    }

    #[must_use]
    pub fn with_override(&self, op: UpdateOp) -> Self {
        self.wrap(UpdateDecorator::OverrideOperation(op))
    }

    #[must_use]
    pub fn reversed(&self) -> Self {
        self.wrap(UpdateDecorator::ReverseTentative)
    }

    #[must_use]
    pub fn tentative(&self) -> Self {
        self.wrap(UpdateDecorator::Tentative)
    }

    #[must_use]
    pub fn with_mode(&self, mode: UpdateMode) -> Self {
        self.wrap(UpdateDecorator::WithMode(mode))
    }
}

impl Display for IndexUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.view();
        let image = |v: &Option<Value>| v.as_ref().map_or_else(|| "-".to_string(), Value::to_string);

        write!(f, "{}({} -> {})", view.op, image(&view.before), image(&view.after))?;
        if view.tentative {
            f.write_str(" tentative")?;
        }

        Ok(())
    }
}

///
/// NamedUpdate
///
/// An update tagged with the indexed property it targets.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NamedUpdate {
    pub property: String,
    pub update: IndexUpdate,
}

impl NamedUpdate {
    pub fn new(property: impl Into<String>, update: IndexUpdate) -> Self {
        Self {
            property: property.into(),
            update,
        }
    }
}
