//! Fixed names and defaults shared across the crate.

pub const APP_NAME: &str = "sitebuild";

/// Directory under the project root holding all site sources.
pub const SOURCES_DIR: &str = "src";

/// Directory under the project root receiving build products.
pub const BUILD_DIR: &str = "dist";

/// Directory under the build directory holding the rendered site.
pub const OUTPUT_DIR: &str = "site";

/// File name of the packaged site, placed in the build directory.
pub const SITE_PACKAGE_FILE: &str = "site.tar.gz";

pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_LIVERELOAD_PORT: u16 = 35729;

/// Upper bound for a single watch-triggered rebuild.
pub const DEFAULT_REBUILD_TIMEOUT_SECS: u64 = 300;

/// Quiet period a file must observe before a change event is delivered.
pub const DEFAULT_DEBOUNCE_MILLIS: u64 = 200;

pub const DEFAULT_LAYOUT: &str = "default.html";
pub const LAYOUT_PARTIALS_DIR: &str = "partials";

pub const MAIN_STYLESHEET: &str = "index.css";
pub const STYLES_OUTPUT_FILE: &str = "styles.css";
pub const STYLES_OUTPUT_MAP_FILE: &str = "styles.css.map";

pub const FONTS_OUTPUT_DIR: &str = "fonts";
pub const IMAGES_OUTPUT_DIR: &str = "images";
pub const SCRIPTS_OUTPUT_DIR: &str = "scripts";

pub const ENV_DEPLOY_HOST: &str = "DEPLOY_HOST";
pub const ENV_DEPLOY_PORT: &str = "DEPLOY_PORT";
pub const ENV_DEPLOY_USER: &str = "DEPLOY_USER";
pub const ENV_DEPLOY_KEY: &str = "DEPLOY_KEY";
pub const ENV_DEPLOY_DIR: &str = "DEPLOY_DIR";

pub const ENV_SERVER_PORT: &str = "SITE_SERVER_PORT";
pub const ENV_LIVERELOAD_PORT: &str = "SITE_LIVERELOAD_PORT";

/// Name of the dotenv file read from the project root.
pub const DOTENV_FILE: &str = ".env";
