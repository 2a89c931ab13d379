//! Version and build metadata baked in at compile time.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const COMMIT: &str = match option_env!("USSDHUB_BUILD_COMMIT") {
    Some(c) => c,
    None => "unknown",
};

pub const BUILD_DATE: &str = match option_env!("USSDHUB_BUILD_DATE") {
    Some(d) => d,
    None => "unknown",
};

/// Version plus commit and build date, for startup logs.
pub fn version_string() -> String {
    format!("{VERSION} (commit {COMMIT}, built {BUILD_DATE})")
}
