// Copyright 2026 the Prebake authors. MIT license.

//! The polymorphic fetcher chain and the default filesystem provider.
//!
//! Each operation returns `Understood`, an explicit `NotUnderstood`
//! that advances the chain, or an error that terminates it. A fetcher
//! may also delegate to the rest of the chain through `next` and
//! reinterpret the result.

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::CONTROLS;
use url::Url;

use crate::errors::anyhow;
use crate::module::ModuleMetadata;
use crate::specifier::ModuleId;
use crate::AnyError;

/// The characters kept percent-encoded when a path segment is
/// re-encoded during canonicalization.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
  .add(b' ')
  .add(b'"')
  .add(b'#')
  .add(b'<')
  .add(b'>')
  .add(b'?')
  .add(b'`')
  .add(b'{')
  .add(b'}')
  .add(b'/')
  .add(b'%')
  .add(b'\\');

/// The chain-aware result of a fetcher operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
  Understood(T),
  NotUnderstood,
}

impl<T> Outcome<T> {
  pub fn understood(self) -> Option<T> {
    match self {
      Outcome::Understood(value) => Some(value),
      Outcome::NotUnderstood => None,
    }
  }
}

/// What a successful fetch carries.
#[derive(Debug, Clone)]
pub struct FetchedSource {
  pub id: ModuleId,
  pub source: String,
  pub metadata: ModuleMetadata,
}

#[async_trait(?Send)]
pub trait Fetcher {
  async fn canonicalize(
    &self,
    abs: &Url,
    base: &ModuleId,
    next: FetcherChain,
  ) -> Result<Outcome<ModuleId>, AnyError>;

  async fn list(
    &self,
    pattern: &str,
    base: &ModuleId,
    next: FetcherChain,
  ) -> Result<Outcome<Vec<ModuleId>>, AnyError>;

  async fn fetch(
    &self,
    id: &ModuleId,
    base: &ModuleId,
    next: FetcherChain,
  ) -> Result<Outcome<FetchedSource>, AnyError>;
}

/// An ordered list of fetchers with left-biased chain semantics.
#[derive(Clone)]
pub struct FetcherChain {
  fetchers: Rc<Vec<Rc<dyn Fetcher>>>,
  offset: usize,
}

impl FetcherChain {
  pub fn new(fetchers: Vec<Rc<dyn Fetcher>>) -> Self {
    Self {
      fetchers: Rc::new(fetchers),
      offset: 0,
    }
  }

  fn current(&self) -> Option<&Rc<dyn Fetcher>> {
    self.fetchers.get(self.offset)
  }

  fn rest(&self) -> FetcherChain {
    Self {
      fetchers: self.fetchers.clone(),
      offset: self.offset + 1,
    }
  }

  pub async fn canonicalize(
    &self,
    abs: &Url,
    base: &ModuleId,
  ) -> Result<Outcome<ModuleId>, AnyError> {
    let mut chain = self.clone();
    while let Some(fetcher) = chain.current().cloned() {
      let next = chain.rest();
      match fetcher.canonicalize(abs, base, next.clone()).await? {
        Outcome::Understood(id) => return Ok(Outcome::Understood(id)),
        Outcome::NotUnderstood => chain = next,
      }
    }
    Ok(Outcome::NotUnderstood)
  }

  pub async fn list(
    &self,
    pattern: &str,
    base: &ModuleId,
  ) -> Result<Outcome<Vec<ModuleId>>, AnyError> {
    let mut chain = self.clone();
    while let Some(fetcher) = chain.current().cloned() {
      let next = chain.rest();
      match fetcher.list(pattern, base, next.clone()).await? {
        Outcome::Understood(ids) => return Ok(Outcome::Understood(ids)),
        Outcome::NotUnderstood => chain = next,
      }
    }
    Ok(Outcome::NotUnderstood)
  }

  pub async fn fetch(
    &self,
    id: &ModuleId,
    base: &ModuleId,
  ) -> Result<Outcome<FetchedSource>, AnyError> {
    let mut chain = self.clone();
    while let Some(fetcher) = chain.current().cloned() {
      let next = chain.rest();
      match fetcher.fetch(id, base, next.clone()).await? {
        Outcome::Understood(fetched) => {
          return Ok(Outcome::Understood(fetched))
        }
        Outcome::NotUnderstood => chain = next,
      }
    }
    Ok(Outcome::NotUnderstood)
  }
}

/// Re-encodes every path segment of a URL so that equivalent spellings
/// (stray percent-escapes of unreserved characters, raw spaces) share
/// one canonical form.
fn normalize_path_encoding(url: &Url) -> Url {
  let mut normalized = url.clone();
  let segments: Option<Vec<String>> = url.path_segments().map(|segments| {
    segments
      .map(|segment| {
        let decoded = percent_decode_str(segment).decode_utf8_lossy();
        utf8_percent_encode(&decoded, PATH_SEGMENT).to_string()
      })
      .collect()
  });
  if let Some(segments) = segments {
    normalized.set_path(&segments.join("/"));
  }
  normalized
}

/// Strips a leading `#!` line, keeping its newline so line numbers stay
/// stable.
fn filter_shebang(source: String) -> String {
  if !source.starts_with("#!") {
    return source;
  }
  match source.find('\n') {
    Some(offset) => source[offset..].to_string(),
    None => String::new(),
  }
}

/// The default filesystem provider. Only `file:` URLs are understood;
/// everything else advances the chain.
#[derive(Default)]
pub struct FsFetcher;

impl FsFetcher {
  pub fn new() -> Self {
    Self
  }

  fn canonical_url(&self, abs: &Url) -> Url {
    let normalized = normalize_path_encoding(abs);
    if let Ok(path) = normalized.to_file_path() {
      if let Ok(real) = fs::canonicalize(&path) {
        if let Ok(url) = Url::from_file_path(&real) {
          return url;
        }
      }
    }
    // The path does not exist (yet); the lexically normalized URL is
    // still a stable identity.
    normalized
  }
}

#[async_trait(?Send)]
impl Fetcher for FsFetcher {
  async fn canonicalize(
    &self,
    abs: &Url,
    _base: &ModuleId,
    _next: FetcherChain,
  ) -> Result<Outcome<ModuleId>, AnyError> {
    if abs.scheme() != "file" {
      return Ok(Outcome::NotUnderstood);
    }
    let canon = self.canonical_url(abs);
    Ok(Outcome::Understood(ModuleId::canonical(abs.clone(), canon)))
  }

  async fn list(
    &self,
    pattern: &str,
    base: &ModuleId,
    _next: FetcherChain,
  ) -> Result<Outcome<Vec<ModuleId>>, AnyError> {
    let joined = base
      .key()
      .join(pattern)
      .map_err(|err| anyhow!("invalid glob {}: {}", pattern, err))?;
    if joined.scheme() != "file" {
      return Ok(Outcome::NotUnderstood);
    }
    let path = joined
      .to_file_path()
      .map_err(|_| anyhow!("glob {} is not a local path", pattern))?;
    let mut ids = Vec::new();
    for entry in glob::glob(&path.to_string_lossy())? {
      let path = entry?;
      if let Ok(url) = Url::from_file_path(&path) {
        ids.push(ModuleId::canonical(url.clone(), self.canonical_url(&url)));
      }
    }
    Ok(Outcome::Understood(ids))
  }

  async fn fetch(
    &self,
    id: &ModuleId,
    _base: &ModuleId,
    _next: FetcherChain,
  ) -> Result<Outcome<FetchedSource>, AnyError> {
    if id.key().scheme() != "file" {
      return Ok(Outcome::NotUnderstood);
    }
    let path: PathBuf = id
      .key()
      .to_file_path()
      .map_err(|_| anyhow!("file URL contains an invalid path: {}", id))?;
    let source = fs::read_to_string(&path)
      .map_err(|err| anyhow!("cannot load module \"{}\": {}", id, err))?;
    let source = filter_shebang(source);
    let mut metadata = ModuleMetadata::new(id.clone());
    metadata.properties.insert(
      "localPath".to_string(),
      serde_json::Value::String(path.to_string_lossy().into_owned()),
    );
    metadata
      .properties
      .insert("size".to_string(), serde_json::Value::from(source.len()));
    Ok(Outcome::Understood(FetchedSource {
      id: id.clone(),
      source,
      metadata,
    }))
  }
}
