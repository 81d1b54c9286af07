//! Bitmask signatures describing sets of components.
//!
//! Every registered component owns one bit of a 64-bit mask. An entity's
//! signature is the OR of the bits of the components it currently holds,
//! and queries and views are keyed by the signature they require.
//!
//! A signature may be tagged *inverse*. When an inverse signature is used as
//! the required side of [`Signature::matches`], the result is the negation of
//! the ordinary inclusion test: the candidate matches when it lacks the
//! *entire* combination, not when it lacks any single bit of it.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
};

/// A set of component bits, optionally tagged as inverse.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    bits: u64,
    inverse: bool,
}

impl Signature {
    /// The empty positive signature. Every candidate matches it.
    pub const EMPTY: Self = Self {
        bits: 0,
        inverse: false,
    };

    /// Create a positive signature from a raw mask.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            bits,
            inverse: false,
        }
    }

    /// Signature with only the bit at `index` set.
    #[must_use]
    pub(crate) const fn single(index: u32) -> Self {
        Self::from_bits(1_u64 << index)
    }

    /// Raw mask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.bits
    }

    /// Whether this signature is tagged inverse.
    #[must_use]
    pub const fn is_inverse(self) -> bool {
        self.inverse
    }

    /// Whether no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Number of bits set.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.bits.count_ones()
    }

    /// Copy of this signature tagged inverse.
    #[must_use]
    pub const fn inverse(self) -> Self {
        self.with_inverse(true)
    }

    /// Copy of this signature with the inverse tag set to `inverse`.
    #[must_use]
    pub const fn with_inverse(self, inverse: bool) -> Self {
        Self {
            bits: self.bits,
            inverse,
        }
    }

    /// OR the positive part of `element` into this signature.
    ///
    /// The result is always positive, whatever the tags of the inputs.
    #[must_use]
    pub fn with<S: AsSignature + ?Sized>(self, element: &S) -> Self {
        Self::from_bits(self.bits | element.as_signature().bits)
    }

    /// OR together the positive parts of every element.
    ///
    /// ```ignore
    /// let walkers_talkers = Signature::compose([&walk as &dyn AsSignature, &talk]);
    /// ```
    #[must_use]
    pub fn compose<'a, I>(elements: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn AsSignature>,
    {
        elements
            .into_iter()
            .fold(Self::EMPTY, |acc, element| acc.with(element))
    }

    /// Test this signature, as a candidate, against `required`.
    ///
    /// For a positive `required`, true iff every bit of `required` is set
    /// here. For an inverse `required`, the boolean negation of that test.
    #[must_use]
    pub const fn matches(self, required: Self) -> bool {
        let contained = self.bits & required.bits == required.bits;
        if required.inverse { !contained } else { contained }
    }

    /// Whether every bit of `other` is part of this signature's mask,
    /// ignoring both inverse tags.
    #[must_use]
    pub const fn includes(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    /// Bits whose payloads a query on this signature resolves.
    ///
    /// An inverse signature names components an entity must lack, so it
    /// resolves none.
    #[must_use]
    pub const fn required_bits(self) -> u64 {
        if self.inverse { 0 } else { self.bits }
    }
}

impl BitOr for Signature {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(&rhs)
    }
}

impl BitOrAssign for Signature {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.inverse { "!" } else { "" };
        write!(f, "Signature({prefix}{:#b})", self.bits)
    }
}

/// Anything that can take part in signature composition.
///
/// Implemented for [`Signature`] and [`Component`](crate::Component); passing
/// anything else to [`Signature::with`] or [`signature!`](crate::signature!)
/// is rejected at compile time.
pub trait AsSignature {
    /// The signature this element contributes.
    fn as_signature(&self) -> Signature;
}

impl AsSignature for Signature {
    fn as_signature(&self) -> Signature {
        *self
    }
}

impl<S: AsSignature + ?Sized> AsSignature for &S {
    fn as_signature(&self) -> Signature {
        (**self).as_signature()
    }
}

/// Build a positive signature from components and signatures.
///
/// ```ignore
/// let walkers = signature![walk];
/// let walkers_talkers = signature![walkers, talk];
/// ```
#[macro_export]
macro_rules! signature {
    () => {
        $crate::Signature::EMPTY
    };
    ($($element:expr),+ $(,)?) => {
        $crate::Signature::EMPTY$(.with(&$element))+
    };
}
