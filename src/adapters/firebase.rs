//! Realtime-database adapter.
//!
//! Implements [`RemoteStore`] against a Firebase-style JSON tree:
//!
//! - **`target_os = "espidf"`**: REST calls over HTTPS
//!   (`PUT|GET|DELETE https://{host}{path}.json?auth={token}`) using
//!   `esp_idf_svc::http::client`.
//! - **all targets**: [`MemoryStore`], an in-process JSON tree with the
//!   same path semantics, used by host runs and tests.

use serde_json::{Map, Value};

use crate::app::ports::RemoteStore;
use crate::error::RemoteError;

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

// ───────────────────────────────────────────────────────────────
// In-memory tree
// ───────────────────────────────────────────────────────────────

/// JSON tree addressed by slash-separated paths.
///
/// Writing `null` deletes, and empty objects disappear, as in the real
/// database.  Failures can be injected per operation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: Value,
    /// Fail every call with this error while set.
    pub fail_all: Option<RemoteError>,
    /// Let this many more puts succeed, then fail with `Transport`.
    pub fail_put_after: Option<u32>,
    pub puts: u32,
    pub gets: u32,
    pub removes: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document at `path`, if any.
    pub fn at(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for seg in segments(path) {
            node = node.as_object()?.get(seg)?;
        }
        if node.is_null() { None } else { Some(node) }
    }

    /// Number of children under `path`.
    pub fn children(&self, path: &str) -> usize {
        self.at(path).and_then(Value::as_object).map_or(0, Map::len)
    }

    fn check(&self) -> Result<(), RemoteError> {
        match self.fail_all {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn set(&mut self, path: &str, body: Value) {
        let segs: Vec<&str> = segments(path).collect();
        set_in(&mut self.root, &segs, body);
        prune(&mut self.root);
    }
}

fn set_in(node: &mut Value, segs: &[&str], body: Value) {
    let [head, rest @ ..] = segs else {
        *node = body;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        set_in(map.entry((*head).to_owned()).or_insert(Value::Null), rest, body);
    }
}

/// Drop empty objects left behind by deletes.
fn prune(node: &mut Value) -> bool {
    if let Value::Object(map) = node {
        map.retain(|_, child| !prune(child));
        map.is_empty()
    } else {
        node.is_null()
    }
}

impl RemoteStore for MemoryStore {
    fn put(&mut self, path: &str, body: &Value, _timeout_ms: u64) -> Result<(), RemoteError> {
        self.check()?;
        if let Some(n) = self.fail_put_after.as_mut() {
            if *n == 0 {
                return Err(RemoteError::Transport);
            }
            *n -= 1;
        }
        self.puts += 1;
        self.set(path, body.clone());
        Ok(())
    }

    fn get(&mut self, path: &str, _timeout_ms: u64) -> Result<Value, RemoteError> {
        self.check()?;
        self.gets += 1;
        Ok(self.at(path).cloned().unwrap_or(Value::Null))
    }

    fn remove(&mut self, path: &str, _timeout_ms: u64) -> Result<(), RemoteError> {
        self.check()?;
        self.removes += 1;
        self.set(path, Value::Null);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF HTTPS client
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::FirebaseStore;

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use embedded_svc::http::Method;
    use embedded_svc::http::client::Client as HttpClient;
    use embedded_svc::io::{Read, Write};
    use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};
    use esp_idf_svc::io::EspIOError;
    use esp_idf_svc::sys::{ESP_ERR_HTTP_EAGAIN, ESP_ERR_TIMEOUT, EspError};
    use log::{debug, warn};
    use serde_json::Value;

    use crate::app::ports::RemoteStore;
    use crate::error::RemoteError;

    /// Largest response body accepted (command queue plus schedules).
    const MAX_RESPONSE: usize = 16 * 1024;

    pub struct FirebaseStore {
        host: String,
        token: String,
    }

    fn map_esp(e: EspError) -> RemoteError {
        let code = e.code();
        if code == ESP_ERR_TIMEOUT as i32 || code == ESP_ERR_HTTP_EAGAIN as i32 {
            RemoteError::Timeout
        } else {
            RemoteError::Transport
        }
    }

    fn map_io(e: EspIOError) -> RemoteError {
        map_esp(e.0)
    }

    impl FirebaseStore {
        pub fn new(host: &str, token: &str) -> Self {
            Self {
                host: host.trim_end_matches('/').to_owned(),
                token: token.to_owned(),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("https://{}{}.json?auth={}", self.host, path, self.token)
        }

        /// One request on a fresh connection; returns the response body.
        fn call(
            &mut self,
            method: Method,
            path: &str,
            body: Option<&[u8]>,
            timeout_ms: u64,
        ) -> Result<Vec<u8>, RemoteError> {
            let conf = HttpClientConfiguration {
                timeout: Some(Duration::from_millis(timeout_ms)),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            };
            let mut client = HttpClient::wrap(EspHttpConnection::new(&conf).map_err(map_esp)?);
            let url = self.url(path);

            let len = body.map(|b| b.len().to_string());
            let mut headers = vec![("Content-Type", "application/json")];
            if let Some(len) = len.as_deref() {
                headers.push(("Content-Length", len));
            }

            let mut request = client.request(method, &url, &headers).map_err(map_io)?;
            if let Some(b) = body {
                request.write_all(b).map_err(map_io)?;
                request.flush().map_err(map_io)?;
            }
            let mut response = request.submit().map_err(map_io)?;

            let status = response.status();
            debug!("Firebase: {:?} {} -> {}", method, path, status);
            match status {
                200..=299 => {}
                401 | 403 => return Err(RemoteError::Unauthorized),
                _ => {
                    warn!("Firebase: HTTP {} on {}", status, path);
                    return Err(RemoteError::Transport);
                }
            }

            let mut out = Vec::new();
            let mut chunk = [0u8; 512];
            loop {
                let n = response.read(&mut chunk).map_err(map_io)?;
                if n == 0 {
                    break;
                }
                if out.len() + n > MAX_RESPONSE {
                    return Err(RemoteError::Malformed);
                }
                out.extend_from_slice(&chunk[..n]);
            }
            Ok(out)
        }
    }

    impl RemoteStore for FirebaseStore {
        fn put(&mut self, path: &str, body: &Value, timeout_ms: u64) -> Result<(), RemoteError> {
            let bytes = serde_json::to_vec(body).map_err(|_| RemoteError::Malformed)?;
            self.call(Method::Put, path, Some(&bytes), timeout_ms).map(|_| ())
        }

        fn get(&mut self, path: &str, timeout_ms: u64) -> Result<Value, RemoteError> {
            let body = self.call(Method::Get, path, None, timeout_ms)?;
            if body.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_slice(&body).map_err(|_| RemoteError::Malformed)
        }

        fn remove(&mut self, path: &str, timeout_ms: u64) -> Result<(), RemoteError> {
            self.call(Method::Delete, path, None, timeout_ms).map(|_| ())
        }
    }
}
