//! Content authorship.
//!
//! The author of a content file is the author of the oldest commit, following
//! first parents from `HEAD`, whose tree contains the file. A project outside
//! of a Git repository, or one without commits, has no known authors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::context::{Context, SourceDir};

#[derive(Debug, Error)]
pub enum AuthorError {
  #[error("failed to read git history: {0}")]
  Git(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("failed to resolve {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

fn git_err<E>(e: E) -> AuthorError
where
  E: std::error::Error + Send + Sync + 'static,
{
  AuthorError::Git(Box::new(e))
}

/// Resolves the author of content files.
pub trait AuthorLookup: Send + Sync {
  /// Authors of `files`, given relative to the content directory.
  ///
  /// Files without a known author are absent from the result.
  fn authors(&self, ctx: &Context, files: &[PathBuf]) -> Result<HashMap<PathBuf, String>, AuthorError>;
}

/// Reads authorship from the Git repository containing the project.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitAuthorLookup;

impl AuthorLookup for GitAuthorLookup {
  fn authors(&self, ctx: &Context, files: &[PathBuf]) -> Result<HashMap<PathBuf, String>, AuthorError> {
    let repo = match gix::discover(ctx.project_root()) {
      Ok(repo) => repo,
      Err(e) => {
        debug!(error = %e, "no git repository, authors unknown");
        return Ok(HashMap::new());
      }
    };
    let Some(workdir) = repo.workdir() else {
      debug!("bare repository, authors unknown");
      return Ok(HashMap::new());
    };
    let workdir = dunce::canonicalize(workdir).map_err(|source| AuthorError::Io {
      path: workdir.to_path_buf(),
      source,
    })?;

    let content_dir = ctx.source_dir(SourceDir::Content);
    let Ok(prefix) = content_dir.strip_prefix(&workdir) else {
      debug!(content = %content_dir.display(), "content outside of repository, authors unknown");
      return Ok(HashMap::new());
    };

    if repo.head().map_err(git_err)?.is_unborn() {
      debug!("repository has no commits, authors unknown");
      return Ok(HashMap::new());
    }

    let history = first_parent_history(&repo)?;
    let mut pending: Vec<&PathBuf> = files.iter().collect();
    let mut found = HashMap::with_capacity(files.len());

    for (tree_id, author) in history.iter().rev() {
      if pending.is_empty() {
        break;
      }
      let tree = repo
        .find_object(*tree_id)
        .map_err(git_err)?
        .try_into_tree()
        .map_err(git_err)?;

      let mut still_pending = Vec::with_capacity(pending.len());
      for file in pending {
        if tree.lookup_entry_by_path(prefix.join(file)).map_err(git_err)?.is_some() {
          found.insert(file.clone(), author.clone());
        } else {
          still_pending.push(file);
        }
      }
      pending = still_pending;
    }

    debug!(resolved = found.len(), total = files.len(), "resolved content authors");
    Ok(found)
  }
}

/// Tree id and author name of every first-parent commit, newest first.
fn first_parent_history(repo: &gix::Repository) -> Result<Vec<(gix::ObjectId, String)>, AuthorError> {
  let mut history = Vec::new();
  let mut current = Some(repo.head_commit().map_err(git_err)?);

  while let Some(commit) = current {
    let author = commit.author().map_err(git_err)?.name.to_string();
    let tree_id = commit.tree_id().map_err(git_err)?.detach();
    history.push((tree_id, author));

    current = match commit.parent_ids().next() {
      Some(parent) => Some(parent.object().map_err(git_err)?.try_into_commit().map_err(git_err)?),
      None => None,
    };
  }
  Ok(history)
}

/// Fixed authors, keyed by path relative to the content directory.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthors {
  authors: HashMap<PathBuf, String>,
}

impl StaticAuthors {
  pub fn from_pairs<I, P, S>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (P, S)>,
    P: AsRef<Path>,
    S: Into<String>,
  {
    Self {
      authors: pairs
        .into_iter()
        .map(|(p, s)| (p.as_ref().to_path_buf(), s.into()))
        .collect(),
    }
  }
}

impl AuthorLookup for StaticAuthors {
  fn authors(&self, _ctx: &Context, files: &[PathBuf]) -> Result<HashMap<PathBuf, String>, AuthorError> {
    Ok(
      files
        .iter()
        .filter_map(|f| self.authors.get(f).map(|a| (f.clone(), a.clone())))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::Mode;
  use crate::util::testutil::{test_context_in, write_file};
  use std::process::Command;
  use tempfile::TempDir;

  fn git(root: &Path, author: &str, args: &[&str]) -> bool {
    Command::new("git")
      .current_dir(root)
      .args(["-c", &format!("user.name={author}"), "-c", "user.email=dev@example.org"])
      .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
      .args(args)
      .output()
      .map(|o| o.status.success())
      .unwrap_or(false)
  }

  fn commit_all(root: &Path, author: &str, message: &str) {
    assert!(git(root, author, &["add", "-A"]));
    assert!(git(root, author, &["commit", "-q", "-m", message]));
  }

  #[test]
  fn outside_repository_no_authors() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context_in(temp.path(), Mode::Build);
    let found = GitAuthorLookup.authors(&ctx, &[PathBuf::from("a.md")]).unwrap();
    assert!(found.is_empty());
  }

  #[test]
  fn oldest_commit_containing_file_wins() {
    let temp = TempDir::new().unwrap();
    if !git(temp.path(), "setup", &["init", "-q"]) {
      // git is not installed
      return;
    }
    let ctx = test_context_in(temp.path(), Mode::Build);
    let content = ctx.source_dir(SourceDir::Content);

    write_file(&content.join("first.md"), "one");
    commit_all(temp.path(), "Ada", "first");

    write_file(&content.join("first.md"), "one, edited");
    write_file(&content.join("blog/second.md"), "two");
    commit_all(temp.path(), "Grace", "second");

    write_file(&content.join("draft.md"), "uncommitted");

    let files = [
      PathBuf::from("first.md"),
      PathBuf::from("blog/second.md"),
      PathBuf::from("draft.md"),
    ];
    let found = GitAuthorLookup.authors(&ctx, &files).unwrap();

    assert_eq!(found.get(Path::new("first.md")).map(String::as_str), Some("Ada"));
    assert_eq!(found.get(Path::new("blog/second.md")).map(String::as_str), Some("Grace"));
    assert!(!found.contains_key(Path::new("draft.md")));
  }

  #[test]
  fn repository_without_commits_has_no_authors() {
    let temp = TempDir::new().unwrap();
    if !git(temp.path(), "setup", &["init", "-q"]) {
      return;
    }
    let ctx = test_context_in(temp.path(), Mode::Build);
    let found = GitAuthorLookup.authors(&ctx, &[PathBuf::from("a.md")]).unwrap();
    assert!(found.is_empty());
  }

  #[test]
  fn static_authors_only_return_requested_files() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context_in(temp.path(), Mode::Build);
    let lookup = StaticAuthors::from_pairs([("a.md", "Ada"), ("b.md", "Grace")]);
    let found = lookup.authors(&ctx, &[PathBuf::from("a.md")]).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[Path::new("a.md")], "Ada");
  }
}
