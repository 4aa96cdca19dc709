use std::path::Path;

use futures::FutureExt;
use futures::future::BoxFuture;
use lightningcss::bundler::{Bundler, FileProvider};
use parcel_sourcemap::SourceMap;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions};
use lightningcss::targets::{Browsers, Targets};
use tracing::debug;

use super::{Step, StepError, StepKind};
use crate::consts::{MAIN_STYLESHEET, STYLES_OUTPUT_FILE, STYLES_OUTPUT_MAP_FILE};
use crate::context::{Context, SourceDir};

/// Oldest browsers the generated stylesheet must support.
fn browser_targets() -> Targets {
  Targets::from(Browsers {
    chrome: Some(100 << 16),
    edge: Some(100 << 16),
    firefox: Some(100 << 16),
    safari: Some(15 << 16),
    ios_saf: Some(15 << 16),
    ..Browsers::default()
  })
}

/// Bundles `styles/index.css` and its imports into `styles.css` with an
/// external `styles.css.map`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StylesStep;

impl Step for StylesStep {
  fn kind(&self) -> StepKind {
    StepKind::Styles
  }

  fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), StepError>> {
    async move {
      let entry = ctx.source_dir(SourceDir::Styles).join(MAIN_STYLESHEET);
      if !tokio::fs::try_exists(&entry).await.unwrap_or(false) {
        return Err(StepError::MissingMainStylesheet(entry));
      }

      let production = ctx.production();
      let bundled = {
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || bundle_stylesheet(&entry, production)).await??
      };

      let output_dir = ctx.output_dir();
      tokio::fs::create_dir_all(&output_dir)
        .await
        .map_err(StepError::io(&output_dir))?;
      let target = output_dir.join(STYLES_OUTPUT_FILE);
      let css = format!("{}\n/*# sourceMappingURL={STYLES_OUTPUT_MAP_FILE} */\n", bundled.css);
      tokio::fs::write(&target, css).await.map_err(StepError::io(&target))?;
      let map_target = output_dir.join(STYLES_OUTPUT_MAP_FILE);
      tokio::fs::write(&map_target, bundled.map)
        .await
        .map_err(StepError::io(&map_target))?;

      debug!(path = %target.display(), production, "wrote stylesheet");
      Ok(())
    }
    .boxed()
  }
}

/// A printed stylesheet and its source map as JSON.
pub(crate) struct BundledStylesheet {
  pub css: String,
  pub map: String,
}

/// Resolve `@import`s from `entry`, add vendor prefixes and print the result.
pub(crate) fn bundle_stylesheet(entry: &Path, minify: bool) -> Result<BundledStylesheet, StepError> {
  let css_error = |message: String| StepError::Css {
    path: entry.to_path_buf(),
    message,
  };
  let targets = browser_targets();

  let provider = FileProvider::new();
  let mut bundler = Bundler::new(&provider, None, ParserOptions::default());
  let mut stylesheet = bundler.bundle(entry).map_err(|e| css_error(e.to_string()))?;

  if minify {
    stylesheet
      .minify(MinifyOptions {
        targets,
        ..MinifyOptions::default()
      })
      .map_err(|e| css_error(e.to_string()))?;
  }

  let root = entry.parent().unwrap_or(entry).to_string_lossy().into_owned();
  let mut source_map = SourceMap::new(&root);
  for source in &stylesheet.sources {
    source_map.add_source(source);
  }
  let printed = stylesheet
    .to_css(PrinterOptions {
      minify,
      targets,
      source_map: Some(&mut source_map),
      ..PrinterOptions::default()
    })
    .map_err(|e| css_error(e.to_string()))?;
  let map = source_map.to_json(None).map_err(|e| css_error(e.to_string()))?;

  Ok(BundledStylesheet { css: printed.code, map })
}
