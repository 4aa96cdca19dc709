use std::sync::LazyLock;

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use tracing::debug;

use super::copy::copy_tree;
use super::{Step, StepError, StepKind};
use crate::consts::IMAGES_OUTPUT_DIR;
use crate::context::{Context, SourceDir};

static SVG_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static pattern"));
static SVG_METADATA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<metadata\b.*?</metadata>").expect("static pattern"));
static SVG_DOCTYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!DOCTYPE[^>]*>").expect("static pattern"));
static SVG_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").expect("static pattern"));
// `<text>` elements (with their `<tspan>`/`<textPath>` children) render whitespace between tags.
static SVG_TEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<text\b.*?</text\s*>").expect("static pattern"));

/// Strip comments, metadata, doctype and inter-tag whitespace from an SVG document.
///
/// Whitespace inside `<text>` elements is rendered and therefore kept.
pub fn minify_svg(source: &str) -> String {
  let out = SVG_COMMENT.replace_all(source, "");
  let out = SVG_METADATA.replace_all(&out, "");
  let out = SVG_DOCTYPE.replace_all(&out, "");
  collapse_gaps(&out).trim().to_string()
}

fn collapse_gaps(svg: &str) -> String {
  let mut out = String::with_capacity(svg.len());
  let mut start = 0;
  for text in SVG_TEXT.find_iter(svg) {
    out.push_str(&collapse_markup(&svg[start..text.start()], start > 0, true));
    out.push_str(text.as_str());
    start = text.end();
  }
  out.push_str(&collapse_markup(&svg[start..], start > 0, false));
  out
}

/// Collapse whitespace between tags of markup that sits outside any `<text>`.
///
/// `after_text`/`before_text` say whether a `<text>` element borders the
/// segment, so whitespace touching that border sits between two tags.
fn collapse_markup(markup: &str, after_text: bool, before_text: bool) -> String {
  let mut markup = markup;
  if after_text {
    let trimmed = markup.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('<') {
      markup = trimmed;
    }
  }
  if before_text {
    let trimmed = markup.trim_end();
    if trimmed.is_empty() || trimmed.ends_with('>') {
      markup = trimmed;
    }
  }
  SVG_GAP.replace_all(markup, "><").into_owned()
}

/// Copies images; SVG files are minified in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagesStep;

impl Step for ImagesStep {
  fn kind(&self) -> StepKind {
    StepKind::Images
  }

  fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), StepError>> {
    async move {
      let source = ctx.source_dir(SourceDir::Images);
      let target = ctx.output_dir().join(IMAGES_OUTPUT_DIR);
      let production = ctx.production();

      let copied = tokio::task::spawn_blocking(move || {
        copy_tree(&source, &target, |path, bytes| {
          let is_svg = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
          if !production || !is_svg {
            return Ok(bytes);
          }
          let text = String::from_utf8(bytes).map_err(|e| StepError::Minify {
            path: path.to_path_buf(),
            message: e.to_string(),
          })?;
          Ok(minify_svg(&text).into_bytes())
        })
      })
      .await??;

      debug!(files = copied, production, "copied images");
      Ok(())
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::Mode;
  use crate::util::testutil::{test_context, test_context_in, write_file};

  const SVG: &str = "<?xml version=\"1.0\"?>\n<!-- generator -->\n<svg xmlns=\"http://www.w3.org/2000/svg\">\n  <metadata>x</metadata>\n  <rect width=\"1\" height=\"1\"/>\n</svg>\n";

  #[test]
  fn minify_svg_strips_noise() {
    assert_eq!(
      minify_svg(SVG),
      "<?xml version=\"1.0\"?><svg xmlns=\"http://www.w3.org/2000/svg\"><rect width=\"1\" height=\"1\"/></svg>"
    );
  }

  #[test]
  fn minify_svg_keeps_whitespace_between_text_spans() {
    let svg = "<svg>\n  <text x=\"0\">\n    <tspan>Hello</tspan> <tspan>World</tspan>\n  </text>\n  <g> <rect/> </g>\n</svg>";
    assert_eq!(
      minify_svg(svg),
      "<svg><text x=\"0\">\n    <tspan>Hello</tspan> <tspan>World</tspan>\n  </text><g><rect/></g></svg>"
    );
  }

  #[test]
  fn minify_svg_collapses_between_adjacent_text_elements() {
    let svg = "<svg><text>a</text>\n<text>b <tspan>c</tspan></text></svg>";
    assert_eq!(minify_svg(svg), "<svg><text>a</text><text>b <tspan>c</tspan></text></svg>");
  }

  #[tokio::test]
  async fn svg_untouched_outside_production() {
    let (ctx, _temp) = test_context();
    write_file(&ctx.source_dir(SourceDir::Images).join("logo.svg"), SVG);

    ImagesStep.run(&ctx).await.unwrap();

    let out = std::fs::read_to_string(ctx.output_dir().join("images/logo.svg")).unwrap();
    assert_eq!(out, SVG);
  }

  #[tokio::test]
  async fn svg_minified_in_production() {
    let temp = tempfile::TempDir::new().unwrap();
    let ctx = test_context_in(temp.path(), Mode::Package);
    write_file(&ctx.source_dir(SourceDir::Images).join("logo.svg"), SVG);
    write_file(&ctx.source_dir(SourceDir::Images).join("photo.png"), "png");

    ImagesStep.run(&ctx).await.unwrap();

    let out = std::fs::read_to_string(ctx.output_dir().join("images/logo.svg")).unwrap();
    assert!(!out.contains("generator"));
    assert!(!out.contains('\n'));
    assert_eq!(std::fs::read_to_string(ctx.output_dir().join("images/photo.png")).unwrap(), "png");
  }
}
