//! The descriptor: five flags that modify how an operation writes its output.

/// Per-operation modifier flags.
///
/// A descriptor is a small value passed by copy to every compute operation:
///
/// - `replace` — clear output positions the mask does not admit instead of
///   letting the prior value fall through;
/// - `complement` — invert the mask;
/// - `structure` — interpret the mask by entry presence, ignoring values;
/// - `transpose0` / `transpose1` — transpose the first/second matrix input
///   before the operation runs.
///
/// `Descriptor::default()` is the no-op descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Descriptor {
    /// Unmasked output positions vanish instead of keeping the prior value.
    pub replace: bool,
    /// Invert the mask.
    pub complement: bool,
    /// Use only the mask's structure, not its values.
    pub structure: bool,
    /// Transpose the first matrix input.
    pub transpose0: bool,
    /// Transpose the second matrix input.
    pub transpose1: bool,
}

impl Descriptor {
    /// The no-op descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `replace`.
    pub fn with_replace(mut self) -> Self {
        self.replace = true;
        self
    }

    /// Set `complement`.
    pub fn with_complement(mut self) -> Self {
        self.complement = true;
        self
    }

    /// Set `structure`.
    pub fn with_structure(mut self) -> Self {
        self.structure = true;
        self
    }

    /// Set `transpose0`.
    pub fn with_transpose0(mut self) -> Self {
        self.transpose0 = true;
        self
    }

    /// Set `transpose1`.
    pub fn with_transpose1(mut self) -> Self {
        self.transpose1 = true;
        self
    }
}
