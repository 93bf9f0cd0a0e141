//! This module contains the primary error type for the analyzer's
//! interface. It also re-exports the more specific error types that are
//! subsystem-specific.
//!
//! # Anyhow
//!
//! All of the errors implement [`std::error::Error`], and hence can be used
//! with [`anyhow::Error`] internally. It is _not_ recommended to use that
//! error type in the interface of the library, as this forces clients to
//! also use `anyhow`.

pub mod analysis;
pub mod container;

use std::rc::Rc;

use thiserror::Error;

/// The interface result type for the library.
pub type Result<T> = std::result::Result<T, Errors>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by
/// the clients of the library) should be members of this enum.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Errors from the abstract interpretation subsystem of the library.
    #[error(transparent)]
    Analysis(#[from] analysis::Error),

    /// Unknown errors, usually from the dependencies of the library.
    ///
    /// It is wrapped in an [`Rc`] to ensure that it can be cloned like the
    /// other error types in this interface error.
    #[error(transparent)]
    Other(Rc<anyhow::Error>),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(Rc::new(value))
    }
}

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, pc: u32) -> Self::Located {
        container::Located {
            location: pc,
            payload:  self,
        }
    }
}

/// A library error with an associated method-body offset.
pub type LocatedError = container::Located<Error>;

/// Allow simple conversions from located analysis errors by re-wrapping the
/// located error around the more general payload.
impl From<analysis::LocatedError> for LocatedError {
    fn from(value: analysis::LocatedError) -> Self {
        let pc = value.location;
        let payload = Error::from(value.payload);
        Self {
            location: pc,
            payload,
        }
    }
}

/// Allow simple conversions from located analysis errors by re-wrapping the
/// located error around the more general payload in the errors container.
impl From<analysis::LocatedError> for Errors {
    fn from(value: analysis::LocatedError) -> Self {
        let re_wrapped: LocatedError = value.into();
        re_wrapped.into()
    }
}

/// Allow conversion from the analysis errors container to the general
/// errors container.
impl From<analysis::Errors> for Errors {
    fn from(value: analysis::Errors) -> Self {
        let errs: Vec<analysis::LocatedError> = value.into();
        let new_errs: Vec<LocatedError> = errs.into_iter().map(Into::into).collect();

        new_errs.into()
    }
}

/// A container of errors that may occur in the analyzer.
pub type Errors = container::Errors<LocatedError>;
