use crate::progress::{ProgressEvent, ProgressSink};
use crate::{CancelToken, RegistryClient, RegistryConfig, RegistryCredentials, RemoteError};
use stevedore_schema::BundleRef;

/// HTTP-based registry transport.
///
/// Expects a simple REST API rooted at the configured namespace:
/// `PUT /<namespace>/<name>/<tag>` uploads canonical bundle bytes.
pub struct HttpRegistryClient {
    config: RegistryConfig,
    agent: ureq::Agent,
}

impl HttpRegistryClient {
    pub fn new(config: RegistryConfig) -> Self {
        let agent = ureq::Agent::new_with_defaults();
        Self { config, agent }
    }

    fn url(&self, reference: &BundleRef) -> String {
        let tag = reference.tag().unwrap_or(stevedore_schema::reference::DEFAULT_TAG);
        format!(
            "{}/{}/{}/{}",
            self.config.url,
            self.config.namespace,
            reference.name(),
            tag
        )
    }

    fn token<'a>(&'a self, creds: &'a RegistryCredentials) -> Option<&'a str> {
        creds.token.as_deref().or(self.config.auth_token.as_deref())
    }
}

impl RegistryClient for HttpRegistryClient {
    fn push(
        &self,
        cancel: &CancelToken,
        reference: &BundleRef,
        payload: &[u8],
        sink: &dyn ProgressSink,
        creds: &RegistryCredentials,
    ) -> Result<(), RemoteError> {
        let display = reference.to_string();
        sink.report(ProgressEvent::status(display.as_str(), "Preparing"));

        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        let url = self.url(reference);
        tracing::debug!("PUT {url} ({} bytes)", payload.len());
        sink.report(ProgressEvent::transfer(
            display.as_str(),
            "Pushing",
            0,
            payload.len() as u64,
        ));

        let mut req = self
            .agent
            .put(&url)
            .header("Content-Type", "application/json")
            .header("X-Stevedore-Protocol", &crate::PROTOCOL_VERSION.to_string());
        if let Some(token) = self.token(creds) {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        match req.send(payload) {
            Ok(_) => {}
            Err(ureq::Error::StatusCode(404)) => {
                return Err(RemoteError::NotFound(url));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(RemoteError::Http(format!("HTTP {code} for {url}")));
            }
            Err(e) => {
                return Err(RemoteError::Http(e.to_string()));
            }
        }

        if cancel.is_cancelled() {
            // The upload already happened; the registry's own atomicity
            // applies. Report cancellation anyway so the caller can stop.
            return Err(RemoteError::Cancelled);
        }

        sink.report(ProgressEvent::transfer(
            display.as_str(),
            "Pushed",
            payload.len() as u64,
            payload.len() as u64,
        ));
        Ok(())
    }
}
