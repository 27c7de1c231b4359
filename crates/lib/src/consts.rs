//! Constants shared across the build pipeline.

/// Module coordinate of the default base program.
pub const BASE_COORDINATE: &str = "github.com/cs3org/reva";

/// Package holding the base program's `Main` entry point and version variables.
pub const BASE_ENTRY_PACKAGE: &str = "github.com/cs3org/reva/cmd/revad";

/// Module name given to the synthesized program.
pub const MAIN_MODULE: &str = "revad";

/// Name of the synthesized entry file inside the workspace.
pub const ENTRY_FILE: &str = "main.go";

/// Version selector used when a build does not pin the base program.
pub const DEFAULT_VERSION: &str = "latest";

/// Environment variable overriding the toolchain binary.
pub const TOOLCHAIN_ENV: &str = "GAIA_GO";

/// Toolchain binary used when no override is configured.
pub const DEFAULT_TOOLCHAIN: &str = "go";

/// Default base URL of the remote repository API.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Length of the commit prefix embedded for remotely fetched base programs.
pub const COMMIT_PREFIX_LEN: usize = 9;

/// Toolchain environment variables copied into every workspace overlay.
pub const CACHE_ENV_KEYS: &[&str] = &["GOPATH", "GOMODCACHE", "GOCACHE"];

/// Host environment variables passed through to toolchain commands.
pub const INHERITED_ENV: &[&str] = &["PATH", "HOME"];

/// Prefix of temporary workspace directories.
pub const WORKSPACE_PREFIX: &str = "gaia-";
