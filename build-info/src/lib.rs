#![no_std]

// Must be the same prefix as the one set by `qubes-build-info-helper`.
macro_rules! prefix_env {
    ($var:literal) => {
        env!(concat!("QUBES_BUILD_INFO_", $var))
    };
}

/// Information about the build, captured at compile time via a build script.
pub struct BuildInfo {
    pub git: GitInfo,
    pub version: &'static str,
}

impl BuildInfo {
    pub const fn new(version: &'static str) -> Self {
        Self {
            git: GitInfo::new(),
            version,
        }
    }
}

/// Information from git.
pub struct GitInfo {
    /// The result of `git describe --always --dirty=-modified`, or
    /// `"unknown"` outside of a git checkout.
    pub describe: &'static str,
}

impl GitInfo {
    pub const fn new() -> Self {
        Self {
            describe: prefix_env!("GIT_DESCRIBE"),
        }
    }
}

/// Builds a [`BuildInfo`] for the calling crate. The crate's `build.rs` must call
/// [`qubes_build_info_helper::initialize`].
#[macro_export]
macro_rules! make_build_info {
    () => {
        $crate::BuildInfo::new(env!("CARGO_PKG_VERSION"))
    };
}
