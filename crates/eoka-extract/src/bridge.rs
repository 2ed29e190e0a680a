//! Remote execution bridge: runs a JavaScript function with JSON arguments
//! inside the page and brings its result back as a typed value.
//!
//! Composed snippets evaluate in the page's own world, so functions can reach
//! globals other scripts installed there (the PDF library, for one). The
//! function is awaited, and every outcome is folded into a JSON envelope
//! before it leaves the page:
//!
//! ```text
//! {"ok":true,"value":...}   resolved
//! {"ok":false,"error":"…"}  threw, or the value could not be stringified
//! ```

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::surface::Surface;
use crate::{Error, Result};

/// A JavaScript function expression that can be shipped into the page.
///
/// `source` must be self-contained: it is evaluated as a fresh expression, so
/// it cannot close over anything from where it was written.
#[derive(Debug, Clone)]
pub struct RemoteFn {
    name: Cow<'static, str>,
    source: Cow<'static, str>,
}

impl RemoteFn {
    /// A function compiled into the crate.
    pub const fn new(name: &'static str, source: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            source: Cow::Borrowed(source),
        }
    }

    /// A function supplied at runtime, e.g. by an agent tool call.
    pub fn dynamic(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            source: Cow::Owned(source.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Start an invocation of this function.
    pub fn call(&self) -> RemoteInvocation<'_> {
        RemoteInvocation {
            callable: self,
            arguments: Vec::new(),
        }
    }
}

/// A function plus its positional arguments, ready to be executed.
#[derive(Debug, Clone)]
pub struct RemoteInvocation<'a> {
    callable: &'a RemoteFn,
    arguments: Vec<Value>,
}

impl<'a> RemoteInvocation<'a> {
    /// Append an argument. Fails if it has no lossless JSON form.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(|e| {
            Error::Serialization(format!(
                "argument {} of {}: {}",
                self.arguments.len(),
                self.callable.name,
                e
            ))
        })?;
        self.arguments.push(value);
        Ok(self)
    }

    /// Append already-encoded JSON arguments.
    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.arguments.extend(values);
        self
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// The snippet submitted to the page.
    pub fn to_source(&self) -> Result<String> {
        let args = serde_json::to_string(&self.arguments)
            .map_err(|e| Error::Serialization(format!("{}: {}", self.callable.name, e)))?;
        Ok(format!(
            r#"(async () => {{
  // remote: {name}
  try {{
    const func = {source};
    const args = {args};
    const value = await func(...args);
    return JSON.stringify({{ ok: true, value: value === undefined ? null : value }});
  }} catch (e) {{
    return JSON.stringify({{ ok: false, error: String((e && e.message) || e) }});
  }}
}})()"#,
            name = self.callable.name,
            source = self.callable.source.trim(),
            args = args,
        ))
    }

    /// Run in `surface` and decode the resolved value as `T`.
    pub async fn execute<T: DeserializeOwned>(&self, surface: &dyn Surface) -> Result<T> {
        execute(surface, self).await
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    value: Value,
    error: Option<String>,
}

/// Submit `invocation` to `surface`, await it and decode the result.
pub async fn execute<T: DeserializeOwned>(
    surface: &dyn Surface,
    invocation: &RemoteInvocation<'_>,
) -> Result<T> {
    let name = invocation.callable.name();
    let code = invocation.to_source()?;
    debug!("invoke {} ({} bytes)", name, code.len());

    let reply = surface.run_script(&code).await.map_err(|e| match e {
        Error::Browser(e) => Error::SurfaceUnavailable(format!("{}: {}", name, e)),
        Error::SurfaceUnavailable(msg) => Error::SurfaceUnavailable(format!("{}: {}", name, msg)),
        other => other,
    })?;
    let value = open_envelope(name, reply)?;
    debug!("invoke {} resolved", name);

    serde_json::from_value(value).map_err(|e| {
        Error::RemoteExecution(format!("{}: unexpected result shape: {}", name, e))
    })
}

fn open_envelope(name: &str, reply: Value) -> Result<Value> {
    let Value::String(raw) = reply else {
        return Err(Error::RemoteExecution(format!(
            "{}: page returned a non-envelope value",
            name
        )));
    };
    let envelope: Envelope = serde_json::from_str(&raw).map_err(|e| {
        Error::RemoteExecution(format!("{}: malformed reply: {}", name, e))
    })?;
    if envelope.ok {
        Ok(envelope.value)
    } else {
        Err(Error::RemoteExecution(format!(
            "{}: {}",
            name,
            envelope.error.as_deref().unwrap_or("unknown error")
        )))
    }
}
