//! Element-type bounds and the small capability traits the operator catalog
//! and mask synthesis rely on.
//!
//! [`Element`] is the blanket bound every container element must satisfy:
//! values move across worker threads and get buffered in slices, so elements
//! are `'static + Send + Sync + Clone`. The capabilities layered on top are
//! deliberately narrow:
//!
//! - [`MaskValue`] — "can this value stand in for a boolean?"; drives value
//!   masks (`as_mask`). Types without it still get structural masks.
//! - [`Bounded`] — smallest/largest representable value; the identities of
//!   the min/max monoids.
//! - [`One`] — multiplicative identity; the identity of the times monoid.

/// The standard bound for elements stored in scalars, vectors, and matrices.
///
/// The blanket impl admits any type satisfying the constraints; no manual
/// opt-in is needed.
pub trait Element: 'static + Send + Sync + Clone {}
impl<T> Element for T where T: 'static + Send + Sync + Clone {}

/// Values that project to a boolean for value-mask interpretation.
///
/// Numeric types report `true` for non-zero; `bool` reports itself.
pub trait MaskValue: Element {
    /// `true` iff this stored value makes the mask admit the position.
    fn to_mask(&self) -> bool;
}

/// Types with smallest and largest representable values.
///
/// Used for the identities of the min/max monoids: the identity of max is
/// [`Bounded::MIN_BOUND`] and vice versa.
pub trait Bounded: Element {
    /// Smallest representable value.
    const MIN_BOUND: Self;
    /// Largest representable value.
    const MAX_BOUND: Self;
}

/// Types with a multiplicative identity.
pub trait One: Element {
    /// The multiplicative identity.
    fn one() -> Self;
}

macro_rules! numeric_caps {
    ($($t:ty),*) => {
        $(
            impl MaskValue for $t {
                #[inline]
                fn to_mask(&self) -> bool {
                    *self != 0 as $t
                }
            }
            impl Bounded for $t {
                const MIN_BOUND: Self = <$t>::MIN;
                const MAX_BOUND: Self = <$t>::MAX;
            }
            impl One for $t {
                #[inline]
                fn one() -> Self {
                    1 as $t
                }
            }
        )*
    };
}

numeric_caps!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl MaskValue for bool {
    #[inline]
    fn to_mask(&self) -> bool {
        *self
    }
}

impl Bounded for bool {
    const MIN_BOUND: Self = false;
    const MAX_BOUND: Self = true;
}

impl One for bool {
    #[inline]
    fn one() -> Self {
        true
    }
}
