mod check;
mod checksum;
mod containment;
mod entry;
mod links;

pub use check::{SecurityCheck, SecurityReason};
pub use checksum::{sha256_file_hex, sha256_hex, sha256_reader_hex};
pub use containment::{is_path_within, normalize_lexically, resolve_within};
pub use entry::{validate_package_entries, validate_zip_entry_security};
pub use links::{check_hard_links, check_symlink_escape, detect_hard_links, HardLinkFinding};
