// Copyright 2026 the Prebake authors. MIT license.

//! Leveled diagnostic events, tagged by module id and line, fanned out
//! to one or more sinks.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::specifier::ModuleId;
use crate::AnyError;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
  Debug,
  Info,
  Warn,
  Error,
}

impl Level {
  fn to_log(self) -> log::Level {
    match self {
      Level::Debug => log::Level::Debug,
      Level::Info => log::Level::Info,
      Level::Warn => log::Level::Warn,
      Level::Error => log::Level::Error,
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Level::Debug => write!(f, "debug"),
      Level::Info => write!(f, "info"),
      Level::Warn => write!(f, "warn"),
      Level::Error => write!(f, "error"),
    }
  }
}

/// A single diagnostic event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
  pub level: Level,
  pub module_id: Option<ModuleId>,
  pub line: Option<u32>,
  pub message: String,
}

impl Diagnostic {
  pub fn new(
    level: Level,
    module_id: Option<ModuleId>,
    line: Option<u32>,
    message: impl Into<String>,
  ) -> Self {
    Self {
      level,
      module_id,
      line,
      message: message.into(),
    }
  }

  pub fn error(module_id: Option<ModuleId>, message: impl Into<String>) -> Self {
    Self::new(Level::Error, module_id, None, message)
  }

  pub fn error_at(
    module_id: Option<ModuleId>,
    line: u32,
    message: impl Into<String>,
  ) -> Self {
    Self::new(Level::Error, module_id, Some(line), message)
  }

  pub fn info(module_id: Option<ModuleId>, message: impl Into<String>) -> Self {
    Self::new(Level::Info, module_id, None, message)
  }

  pub fn warn(module_id: Option<ModuleId>, message: impl Into<String>) -> Self {
    Self::new(Level::Warn, module_id, None, message)
  }

  pub fn debug(
    module_id: Option<ModuleId>,
    message: impl Into<String>,
  ) -> Self {
    Self::new(Level::Debug, module_id, None, message)
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}: {}", self.level, self.message)?;
    if let Some(module_id) = &self.module_id {
      write!(f, "\n    at {}", module_id)?;
      if let Some(line) = self.line {
        write!(f, ":{}", line)?;
      }
    }
    Ok(())
  }
}

/// A destination for diagnostic events.
pub trait DiagnosticSink {
  fn publish(&self, diagnostic: &Diagnostic) -> Result<(), AnyError>;
}

/// Default sink forwarding onto the `log` facade.
pub struct LogSink;

impl DiagnosticSink for LogSink {
  fn publish(&self, diagnostic: &Diagnostic) -> Result<(), AnyError> {
    log::log!(diagnostic.level.to_log(), "{}", diagnostic);
    Ok(())
  }
}

/// Cheaply cloneable fan-out handle over the registered sinks.
///
/// Every event is delivered to every sink; a failing sink does not
/// prevent delivery to the remaining sinks, and the first captured
/// failure is rethrown after all sinks were attempted.
#[derive(Clone)]
pub struct Diagnostics {
  sinks: Rc<RefCell<Vec<Rc<dyn DiagnosticSink>>>>,
}

impl Default for Diagnostics {
  fn default() -> Self {
    Self::with_sinks(vec![Rc::new(LogSink)])
  }
}

impl Diagnostics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_sinks(sinks: Vec<Rc<dyn DiagnosticSink>>) -> Self {
    Self {
      sinks: Rc::new(RefCell::new(sinks)),
    }
  }

  pub fn add_sink(&self, sink: Rc<dyn DiagnosticSink>) {
    self.sinks.borrow_mut().push(sink);
  }

  pub fn emit(&self, diagnostic: &Diagnostic) -> Result<(), AnyError> {
    let sinks = self.sinks.borrow().clone();
    let mut first_failure = None;
    for sink in sinks {
      if let Err(err) = sink.publish(diagnostic) {
        if first_failure.is_none() {
          first_failure = Some(err);
        }
      }
    }
    match first_failure {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  /// Like `emit`, for callers in notification context that must not
  /// propagate; a sink failure is routed to the `log` facade instead.
  pub fn report(&self, diagnostic: &Diagnostic) {
    if let Err(err) = self.emit(diagnostic) {
      log::error!("diagnostic sink failed: {:#}", err);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::errors::anyhow;

  #[derive(Default)]
  struct CaptureSink {
    published: RefCell<Vec<Diagnostic>>,
  }

  impl DiagnosticSink for CaptureSink {
    fn publish(&self, diagnostic: &Diagnostic) -> Result<(), AnyError> {
      self.published.borrow_mut().push(diagnostic.clone());
      Ok(())
    }
  }

  struct FailingSink;

  impl DiagnosticSink for FailingSink {
    fn publish(&self, _diagnostic: &Diagnostic) -> Result<(), AnyError> {
      Err(anyhow!("sink exploded"))
    }
  }

  #[test]
  fn fans_out_to_every_sink() {
    let first = Rc::new(CaptureSink::default());
    let second = Rc::new(CaptureSink::default());
    let diagnostics =
      Diagnostics::with_sinks(vec![first.clone(), second.clone()]);
    diagnostics
      .emit(&Diagnostic::info(None, "hello"))
      .expect("no sink failed");
    assert_eq!(first.published.borrow().len(), 1);
    assert_eq!(second.published.borrow().len(), 1);
  }

  #[test]
  fn sink_failure_is_rethrown_after_all_sinks_ran() {
    let capture = Rc::new(CaptureSink::default());
    let diagnostics =
      Diagnostics::with_sinks(vec![Rc::new(FailingSink), capture.clone()]);
    let err = diagnostics
      .emit(&Diagnostic::warn(None, "still delivered"))
      .expect_err("failure must surface");
    assert_eq!(err.to_string(), "sink exploded");
    // The failing sink did not prevent delivery to the capture sink.
    assert_eq!(capture.published.borrow().len(), 1);
  }

  #[test]
  fn display_includes_module_and_line() {
    let id = ModuleId::tentative(url::Url::parse("file:///m.js").unwrap());
    let diagnostic = Diagnostic::error_at(Some(id), 7, "boom");
    assert_eq!(
      diagnostic.to_string(),
      "error: boom\n    at file:///m.js:7"
    );
  }
}
