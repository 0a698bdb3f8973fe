use std::process::Command;

// Must be the same prefix as the one used in `qubes-build-info`'s lib.rs.
const ENV_PREFIX: &str = "QUBES_BUILD_INFO_";

/// Call this from within your build script.
///
/// Falls back to `"unknown"` when `git describe` is unavailable (e.g. a
/// tarball build outside of a git checkout) instead of failing the build.
pub fn initialize() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let git_describe = read_env("GIT_DESCRIBE").unwrap_or_else(|| {
        Command::new("git")
            .arg("describe")
            .arg("--always")
            .arg("--dirty=-modified")
            .output()
            .ok()
            .filter(|out| out.status.success())
            .and_then(|out| String::from_utf8(out.stdout).ok())
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });
    set_env("GIT_DESCRIBE", &git_describe);
}

fn read_env(var: &str) -> Option<String> {
    let var = format!("{ENV_PREFIX}{var}");
    println!("cargo:rerun-if-env-changed={var}");
    match std::env::var(var) {
        Ok(s) => Some(s),
        Err(std::env::VarError::NotPresent) => None,
        Err(err) => panic!("{}", err),
    }
}

fn set_env(var: &str, value: &str) {
    println!("cargo:rustc-env={ENV_PREFIX}{var}={value}");
}
