//! Shared error classification for the lumen workspace.
//!
//! Library crates define their own `snafu` enums and implement [`ErrorExt`]
//! so the application layer can map any failure to a [`StatusCode`].

mod ext;
mod status_code;

pub use ext::ErrorExt;
pub use ext::PlainError;
pub use snafu::Location;
pub use status_code::StatusCategory;
pub use status_code::StatusCode;
pub use status_code::StatusMeta;
