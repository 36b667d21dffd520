//! Cache operations for looking up, populating, and copying built binaries.

mod copy;
mod digest;
mod lookup;
mod populate;

pub use copy::{copy_binary, copy_to_destination};
pub use digest::{file_digest, verify_digest};
pub use lookup::{BINARY_NAME, CacheLookupResult, check_cache, entry_name, entry_path};
pub use populate::populate_cache;
