//! Build context resolution.
//!
//! A [`Context`] is created once per invocation from the command-line options
//! and an environment snapshot. It is never mutated afterwards; everything
//! that needs configuration borrows it.

mod env;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::consts::{
  BUILD_DIR, DEFAULT_DEBOUNCE_MILLIS, DEFAULT_LIVERELOAD_PORT, DEFAULT_REBUILD_TIMEOUT_SECS, DEFAULT_SERVER_PORT,
  ENV_DEPLOY_DIR, ENV_DEPLOY_HOST, ENV_DEPLOY_KEY, ENV_DEPLOY_PORT, ENV_DEPLOY_USER, ENV_LIVERELOAD_PORT,
  ENV_SERVER_PORT, OUTPUT_DIR, SITE_PACKAGE_FILE, SOURCES_DIR,
};

pub use env::EnvVars;

/// Errors raised while resolving the build context.
#[derive(Debug, Error)]
pub enum ContextError {
  /// A required environment variable is not set.
  #[error("{0} environment variable not specified")]
  MissingEnv(String),

  /// An environment variable is set but cannot be parsed.
  #[error("{name} environment variable has an invalid value '{value}'")]
  InvalidEnv { name: String, value: String },

  /// The project root cannot be resolved.
  #[error("failed to resolve project root '{path}': {source}")]
  ProjectRoot {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The dotenv file exists but cannot be read.
  #[error("failed to read '{path}': {source}")]
  Dotenv {
    path: PathBuf,
    #[source]
    source: dotenvy::Error,
  },
}

/// What the invocation was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
  /// Build the site once.
  #[default]
  Build,
  /// Build, then serve the output and rebuild on source changes.
  Watch,
  /// Build and create the site package.
  Package,
  /// Build, package and ship the package to the deploy host.
  Deploy,
}

impl Mode {
  /// Resolve the mode from command-line tokens.
  ///
  /// The presence of a token selects the mode; when several are present the
  /// most far-reaching one wins (deploy, then package, then watch/serve).
  pub fn from_tokens<I, S>(tokens: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut mode = Mode::Build;
    for token in tokens {
      let candidate = match token.as_ref() {
        "deploy" => Mode::Deploy,
        "package" => Mode::Package,
        "watch" | "serve" => Mode::Watch,
        _ => continue,
      };
      if candidate.rank() > mode.rank() {
        mode = candidate;
      }
    }
    mode
  }

  fn rank(self) -> u8 {
    match self {
      Mode::Build => 0,
      Mode::Watch => 1,
      Mode::Package => 2,
      Mode::Deploy => 3,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Mode::Build => "build",
      Mode::Watch => "watch",
      Mode::Package => "package",
      Mode::Deploy => "deploy",
    }
  }
}

impl std::fmt::Display for Mode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A logical source directory under `<root>/src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceDir {
  Content,
  Layouts,
  Styles,
  Scripts,
  Fonts,
  Images,
  Other,
}

impl SourceDir {
  pub fn dir_name(self) -> &'static str {
    match self {
      SourceDir::Content => "content",
      SourceDir::Layouts => "layouts",
      SourceDir::Styles => "styles",
      SourceDir::Scripts => "scripts",
      SourceDir::Fonts => "fonts",
      SourceDir::Images => "images",
      SourceDir::Other => "other",
    }
  }
}

/// Where and how the packaged site is shipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
  pub host: String,
  pub port: u16,
  pub user: String,
  pub key_path: PathBuf,
  pub directory: String,
}

impl DeployTarget {
  /// Read the deploy target from the environment. All five variables are required.
  pub fn from_env(env: &EnvVars) -> Result<Self, ContextError> {
    let host = env.require(ENV_DEPLOY_HOST)?.to_string();
    let port = parse_port(env, ENV_DEPLOY_PORT)?.ok_or_else(|| ContextError::MissingEnv(ENV_DEPLOY_PORT.into()))?;
    let user = env.require(ENV_DEPLOY_USER)?.to_string();
    let key_path = PathBuf::from(env.require(ENV_DEPLOY_KEY)?);
    let directory = env.require(ENV_DEPLOY_DIR)?.to_string();

    Ok(Self {
      host,
      port,
      user,
      key_path,
      directory,
    })
  }

  /// `user@host` as understood by the OpenSSH client.
  pub fn destination(&self) -> String {
    format!("{}@{}", self.user, self.host)
  }
}

/// Options gathered from the command line.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
  pub mode: Mode,
  /// `--prod`: force a production build regardless of mode.
  pub production: bool,
  pub project_root: PathBuf,
  pub server_port: Option<u16>,
  pub livereload_port: Option<u16>,
  pub rebuild_timeout: Option<Duration>,
}

/// The resolved, immutable configuration of one invocation.
#[derive(Debug, Clone)]
pub struct Context {
  mode: Mode,
  forced_production: bool,
  project_root: PathBuf,
  server_port: u16,
  livereload_port: u16,
  rebuild_timeout: Duration,
  debounce: Duration,
  deploy: Option<DeployTarget>,
}

impl Context {
  /// Resolve a context from command-line options and an environment snapshot.
  ///
  /// Deploy settings are validated here when the mode is [`Mode::Deploy`], so a
  /// missing variable fails the run before any file is touched.
  pub fn resolve(options: ContextOptions, env: &EnvVars) -> Result<Self, ContextError> {
    let project_root = if options.project_root.as_os_str().is_empty() {
      PathBuf::from(".")
    } else {
      options.project_root
    };
    let project_root = dunce::canonicalize(&project_root).map_err(|source| ContextError::ProjectRoot {
      path: project_root.clone(),
      source,
    })?;

    let server_port = match options.server_port {
      Some(port) => port,
      None => parse_port(env, ENV_SERVER_PORT)?.unwrap_or(DEFAULT_SERVER_PORT),
    };
    let livereload_port = match options.livereload_port {
      Some(port) => port,
      None => parse_port(env, ENV_LIVERELOAD_PORT)?.unwrap_or(DEFAULT_LIVERELOAD_PORT),
    };

    let deploy = if options.mode == Mode::Deploy {
      Some(DeployTarget::from_env(env)?)
    } else {
      None
    };

    let context = Self {
      mode: options.mode,
      forced_production: options.production,
      project_root,
      server_port,
      livereload_port,
      rebuild_timeout: options
        .rebuild_timeout
        .unwrap_or(Duration::from_secs(DEFAULT_REBUILD_TIMEOUT_SECS)),
      debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MILLIS),
      deploy,
    };

    debug!(
      mode = %context.mode,
      production = context.production(),
      root = %context.project_root.display(),
      "resolved build context"
    );

    Ok(context)
  }

  pub fn mode(&self) -> Mode {
    self.mode
  }

  /// True when minification and authorship enforcement apply.
  pub fn production(&self) -> bool {
    self.forced_production || matches!(self.mode, Mode::Package | Mode::Deploy)
  }

  pub fn project_root(&self) -> &Path {
    &self.project_root
  }

  pub fn sources_dir(&self) -> PathBuf {
    self.project_root.join(SOURCES_DIR)
  }

  pub fn source_dir(&self, dir: SourceDir) -> PathBuf {
    self.sources_dir().join(dir.dir_name())
  }

  pub fn build_dir(&self) -> PathBuf {
    self.project_root.join(BUILD_DIR)
  }

  pub fn output_dir(&self) -> PathBuf {
    self.build_dir().join(OUTPUT_DIR)
  }

  pub fn package_path(&self) -> PathBuf {
    self.build_dir().join(SITE_PACKAGE_FILE)
  }

  pub fn server_port(&self) -> u16 {
    self.server_port
  }

  pub fn livereload_port(&self) -> u16 {
    self.livereload_port
  }

  pub fn rebuild_timeout(&self) -> Duration {
    self.rebuild_timeout
  }

  pub fn debounce(&self) -> Duration {
    self.debounce
  }

  /// Deploy settings; present only in deploy mode.
  pub fn deploy_target(&self) -> Option<&DeployTarget> {
    self.deploy.as_ref()
  }
}

fn parse_port(env: &EnvVars, name: &str) -> Result<Option<u16>, ContextError> {
  env
    .get(name)
    .map(|value| {
      value.trim().parse::<u16>().map_err(|_| ContextError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
      })
    })
    .transpose()
}
