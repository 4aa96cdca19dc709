//! Content rendering.
//!
//! Markdown and HTML pages under the content directory are wrapped in a
//! layout and written to the output directory with an `.html` extension.
//! Anything else found there is copied verbatim.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use minijinja::{Environment, ErrorKind, Value};
use pulldown_cmark::{Options, Parser, html};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{Step, StepError, StepKind};
use crate::authorship::AuthorLookup;
use crate::consts::DEFAULT_LAYOUT;
use crate::context::{Context, Mode, SourceDir};

const UNKNOWN_AUTHOR: &str = "unknown";

/// Renders pages through layouts.
pub struct ContentStep {
  authors: Arc<dyn AuthorLookup>,
}

impl ContentStep {
  pub fn new(authors: Arc<dyn AuthorLookup>) -> Self {
    Self { authors }
  }
}

impl Step for ContentStep {
  fn kind(&self) -> StepKind {
    StepKind::Content
  }

  fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), StepError>> {
    async move {
      let ctx = ctx.clone();
      let authors = Arc::clone(&self.authors);
      let rendered = tokio::task::spawn_blocking(move || render_site(&ctx, authors.as_ref())).await??;
      debug!(files = rendered, "rendered content");
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug, PartialEq, Eq)]
enum PageKind {
  Markdown,
  Html,
  Asset,
}

fn page_kind(path: &Path) -> PageKind {
  match path.extension().and_then(|e| e.to_str()) {
    Some("md" | "markdown") => PageKind::Markdown,
    Some("html" | "htm") => PageKind::Html,
    _ => PageKind::Asset,
  }
}

fn render_site(ctx: &Context, lookup: &dyn AuthorLookup) -> Result<usize, StepError> {
  let content_dir = ctx.source_dir(SourceDir::Content);
  if !content_dir.is_dir() {
    return Ok(0);
  }

  let files = collect_files(&content_dir)?;
  if files.is_empty() {
    return Ok(0);
  }

  let found = lookup.authors(ctx, &files)?;
  let mut authors = HashMap::with_capacity(files.len());
  for file in &files {
    match found.get(file) {
      Some(author) => {
        authors.insert(file.clone(), author.clone());
      }
      None if ctx.production() => return Err(StepError::MissingAuthor(file.clone())),
      None => {
        authors.insert(file.clone(), UNKNOWN_AUTHOR.to_string());
      }
    }
  }

  let mut env = Environment::new();
  env.set_loader(minijinja::path_loader(ctx.source_dir(SourceDir::Layouts)));

  let output_dir = ctx.output_dir();
  for relative in &files {
    let source = content_dir.join(relative);
    let kind = page_kind(relative);

    if kind == PageKind::Asset {
      let target = output_dir.join(relative);
      create_parent(&target)?;
      std::fs::copy(&source, &target).map_err(StepError::io(&source))?;
      continue;
    }

    let text = std::fs::read_to_string(&source).map_err(StepError::io(&source))?;
    let author = authors.get(relative).map(String::as_str).unwrap_or(UNKNOWN_AUTHOR);
    let page = render_page(ctx, &env, relative, &text, kind, author)?;

    let target = output_dir.join(relative).with_extension("html");
    create_parent(&target)?;
    std::fs::write(&target, page).map_err(StepError::io(&target))?;
  }

  Ok(files.len())
}

fn render_page(
  ctx: &Context,
  env: &Environment<'_>,
  relative: &Path,
  text: &str,
  kind: PageKind,
  author: &str,
) -> Result<String, StepError> {
  let (front_matter, body) = split_front_matter(text);
  let meta = parse_front_matter(relative, front_matter)?;

  let body = match kind {
    PageKind::Markdown => markdown_to_html(body),
    _ => body.to_string(),
  };

  let layout = meta
    .get("layout")
    .and_then(serde_yaml::Value::as_str)
    .unwrap_or(DEFAULT_LAYOUT)
    .to_string();
  let template = env.get_template(&layout).map_err(|e| {
    if e.kind() == ErrorKind::TemplateNotFound {
      StepError::MissingLayout {
        page: relative.to_path_buf(),
        layout: layout.clone(),
      }
    } else {
      StepError::Template {
        path: relative.to_path_buf(),
        source: e,
      }
    }
  })?;

  let title = meta
    .get("title")
    .and_then(serde_yaml::Value::as_str)
    .map(str::to_string)
    .or_else(|| relative.file_stem().map(|s| s.to_string_lossy().into_owned()))
    .unwrap_or_default();

  let mut vars: BTreeMap<String, Value> = meta
    .iter()
    .map(|(key, value)| (key.clone(), Value::from_serialize(value)))
    .collect();
  vars.insert("content".into(), Value::from_safe_string(body));
  vars.insert("title".into(), Value::from(title));
  vars.insert("author".into(), Value::from(author));
  vars.insert(
    "path".into(),
    Value::from(relative.with_extension("html").to_string_lossy().replace('\\', "/")),
  );
  vars.insert("production".into(), Value::from(ctx.production()));

  let mut page = template.render(&vars).map_err(|source| StepError::Template {
    path: relative.to_path_buf(),
    source,
  })?;

  if ctx.mode() == Mode::Watch {
    page = inject_live_reload(&page, ctx.livereload_port());
  }
  if ctx.production() {
    page = minify_page(&page);
  }
  Ok(page)
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, StepError> {
  let mut files = Vec::new();
  for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
    let entry = entry.map_err(|e| StepError::Io {
      path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
      source: e.into(),
    })?;
    if entry.file_type().is_file()
      && let Ok(relative) = entry.path().strip_prefix(dir)
    {
      files.push(relative.to_path_buf());
    }
  }
  Ok(files)
}

fn create_parent(path: &Path) -> Result<(), StepError> {
  match path.parent() {
    Some(parent) => std::fs::create_dir_all(parent).map_err(StepError::io(parent)),
    None => Ok(()),
  }
}

/// Split a leading `---` fenced block from the document body.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
  let Some(rest) = text.strip_prefix("---\n").or_else(|| text.strip_prefix("---\r\n")) else {
    return (None, text);
  };

  let mut offset = 0;
  for line in rest.split_inclusive('\n') {
    if line.trim_end() == "---" {
      return (Some(&rest[..offset]), &rest[offset + line.len()..]);
    }
    offset += line.len();
  }
  (None, text)
}

fn parse_front_matter(path: &Path, raw: Option<&str>) -> Result<BTreeMap<String, serde_yaml::Value>, StepError> {
  let Some(raw) = raw else {
    return Ok(BTreeMap::new());
  };
  let parsed: Option<BTreeMap<String, serde_yaml::Value>> =
    serde_yaml::from_str(raw).map_err(|source| StepError::FrontMatter {
      path: path.to_path_buf(),
      source,
    })?;
  Ok(parsed.unwrap_or_default())
}

fn markdown_to_html(source: &str) -> String {
  let options = Options::ENABLE_TABLES | Options::ENABLE_FOOTNOTES | Options::ENABLE_STRIKETHROUGH;
  let parser = Parser::new_ext(source, options);
  let mut out = String::with_capacity(source.len() * 3 / 2);
  html::push_html(&mut out, parser);
  out
}

/// Insert the live-reload loader before the first `</body>`.
pub(crate) fn inject_live_reload(page: &str, port: u16) -> String {
  let script = format!(
    "\n  <script>\n  document.write('<script src=\"http://' + (location.host || 'localhost').split(':')[0] + ':{port}/livereload.js?snipver=1\"></' + 'script>');\n  </script>\n  </body>"
  );
  if !page.contains("</body>") {
    warn!("page has no </body>, live reload not injected");
  }
  page.replacen("</body>", &script, 1)
}

fn minify_page(page: &str) -> String {
  let mut cfg = minify_html::Cfg::new();
  cfg.minify_css = true;
  cfg.minify_js = true;
  let minified = minify_html::minify(page.as_bytes(), &cfg);
  String::from_utf8_lossy(&minified).into_owned()
}
