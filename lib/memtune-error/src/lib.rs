//! Shared error primitives.
//!
//! Typed errors live next to the code that produces them and are defined with `snafu`. Anything that only needs to
//! bubble up to the binary, with some context attached along the way, uses [`GenericError`].
#![deny(warnings)]
#![deny(missing_docs)]

use std::fmt::Display;

/// A type-erased error with an optional chain of context.
pub type GenericError = anyhow::Error;

/// Macro for constructing a generic error.
///
/// The resulting value evaluates to [`GenericError`], and can be constructed from a string literal, a format string
/// (with arguments accepted, in the same order as `std::format!`), or a value which implements `Debug` and `Display`,
/// such as an existing error that implements `std::error::Error`.
///
/// When the value given implements `std::error::Error`, the source of the existing error value will be used as the
/// source of the error created by this macro.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

pub(crate) mod private {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}

// NOTE: `anyhow::Context` is wrapped because its extension methods overlap with `snafu::ResultExt`, and most of our
// crates import both.
/// Extension methods for attaching context to a `Result`'s error.
pub trait ErrorContext<T, E>: private::Sealed {
    /// Wrap the error value with additional context.
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static;

    /// Wrap the error value with additional context that is evaluated lazily only once an error does occur.
    fn with_error_context<C, F>(self, f: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T, E> for Result<T, E>
where
    Result<T, E>: anyhow::Context<T, E>,
{
    fn error_context<C>(self, context: C) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
    {
        <Self as anyhow::Context<T, E>>::context(self, context)
    }

    fn with_error_context<C, F>(self, context: F) -> Result<T, GenericError>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        <Self as anyhow::Context<T, E>>::with_context(self, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_chained_in_display_alternate() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"));
        let err = result.error_context("Failed to open log file.").unwrap_err();

        let rendered = format!("{:#}", err);
        assert_eq!(rendered, "Failed to open log file.: no such file");
    }

    #[test]
    fn lazy_context_only_evaluated_on_error() {
        let mut evaluated = false;
        let result: Result<u32, std::io::Error> = Ok(7);
        let value = result
            .with_error_context(|| {
                evaluated = true;
                "unused"
            })
            .unwrap();

        assert_eq!(value, 7);
        assert!(!evaluated);
    }

    #[test]
    fn generic_error_macro_formats() {
        let err = generic_error!("bucket {} missing", 128);
        assert_eq!(err.to_string(), "bucket 128 missing");
    }
}
