//! The outcome of placing one instance.

use convoy_core::{DesiredInstance, ExistingInstance};

/// Where an instance ended up after placement.
#[derive(Debug, Clone, PartialEq)]
pub enum Placed {
    /// A desired slot with nothing to reuse; a new instance is created.
    New(DesiredInstance),
    /// A desired slot matched to an existing instance that is kept.
    Existing {
        desired: DesiredInstance,
        existing: ExistingInstance,
    },
    /// An existing instance no slot wants; it is deleted.
    Obsolete(ExistingInstance),
}

impl Placed {
    pub fn desired(&self) -> Option<&DesiredInstance> {
        match self {
            Placed::New(desired) | Placed::Existing { desired, .. } => Some(desired),
            Placed::Obsolete(_) => None,
        }
    }

    pub fn existing(&self) -> Option<&ExistingInstance> {
        match self {
            Placed::Existing { existing, .. } | Placed::Obsolete(existing) => Some(existing),
            Placed::New(_) => None,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Placed::New(_))
    }

    pub fn is_obsolete(&self) -> bool {
        matches!(self, Placed::Obsolete(_))
    }

    /// Assigned index of a desired slot, or the recorded index of an
    /// obsolete instance.
    pub fn index(&self) -> Option<u32> {
        match self {
            Placed::New(desired) | Placed::Existing { desired, .. } => desired.index,
            Placed::Obsolete(existing) => Some(existing.index),
        }
    }

    /// AZ of the slot, or the recorded AZ of an obsolete instance.
    pub fn az(&self) -> Option<&str> {
        match self {
            Placed::New(desired) | Placed::Existing { desired, .. } => desired.az.as_deref(),
            Placed::Obsolete(existing) => existing.az.as_deref(),
        }
    }
}
