//! Shared infrastructure utilities for GemDesk.
//!
//! Cross-cutting helpers that several crates need but that don't belong in
//! the domain-pure `gemdesk-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`validation`**: Input checks applied before any remote call

pub mod atomic_write;
pub mod validation;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, OverwritePolicy, atomic_write, atomic_write_with_options,
};
pub use validation::{
    DEFAULT_MIN_SEND_INTERVAL, MAX_FILE_SIZE, MAX_MESSAGE_LENGTH, MAX_URL_LENGTH, RateLimiter,
    ValidationError, sanitize_filename, validate_api_key,
    validate_file_extension, validate_file_path, validate_file_size, validate_message,
    validate_thinking_level, validate_url,
};
