//! Scalar representations: empty and full.
//!
//! The computed scalar variant (a deferred reduction) lives with the other
//! computed nodes in `compute::reduce`.

use crate::error::Result;
use crate::form::ScalarForm;
use crate::types::Element;

/// The scalar with no stored value.
pub struct EmptyScalar;

impl<T: Element> ScalarForm<T> for EmptyScalar {
    fn get(&self) -> Result<Option<T>> {
        Ok(None)
    }

    fn known(&self) -> Option<Option<T>> {
        Some(None)
    }
}

/// A scalar holding one value.
pub struct FullScalar<T> {
    value: T,
}

impl<T: Element> FullScalar<T> {
    /// Wrap a value.
    pub fn new(value: T) -> Self {
        FullScalar { value }
    }
}

impl<T: Element> ScalarForm<T> for FullScalar<T> {
    fn get(&self) -> Result<Option<T>> {
        Ok(Some(self.value.clone()))
    }

    fn known(&self) -> Option<Option<T>> {
        Some(Some(self.value.clone()))
    }
}
