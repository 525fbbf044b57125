use std::{fmt, sync::Arc};

use super::unit_type::UnitType;

/// Stable key for a polygon unit.
/// Keep the original identifier text (with leading zeros) but avoid repeated owned Strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitId {
    ty: UnitType,
    id: Arc<str>, // e.g., "037" for Los Angeles County, "31080" for the LA MSA
}

impl UnitId {
    pub fn new(ty: UnitType, id: &str) -> Self {
        Self { ty, id: Arc::from(id) }
    }

    #[inline] pub fn ty(&self) -> UnitType { self.ty }

    #[inline] pub fn id(&self) -> &str { &self.id }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ty.to_str(), self.id)
    }
}
