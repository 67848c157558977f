//! # Builder utilities
//!
//! Shared traits for the incremental builders of the crate:
//! [`crate::schema::SchemaBuilder`], [`crate::dataset::provider::InMemoryProvider`]
//! and the [`crate::compiler::Compiler`] which is [`Ready`] once noise has been added.
//!

use std::error;

/// Feed one more input to a builder
pub trait With<Input, Output = Self> {
    fn with(self, input: Input) -> Output;
}

/// Start a builder from its default value
impl<T, W: Default + With<T>> With<T, W> for () {
    fn with(self, input: T) -> W {
        W::default().with(input)
    }
}

pub trait WithIterator<Input> {
    fn with_iter<I: IntoIterator<Item = Input>>(self, iter: I) -> Self;
}

impl<Input, W: With<Input>> WithIterator<Input> for W {
    fn with_iter<I: IntoIterator<Item = Input>>(self, iter: I) -> Self {
        iter.into_iter().fold(self, |w, i| w.with(i))
    }
}

/// A builder that may produce its output
pub trait Ready<Output>: Sized {
    type Error: error::Error;
    /// Build and panic in case of error
    fn build(self) -> Output {
        self.try_build().unwrap()
    }
    /// Try to build
    fn try_build(self) -> Result<Output, Self::Error>;
}
