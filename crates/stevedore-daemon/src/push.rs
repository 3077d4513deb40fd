//! Distribution gateway: pushes stored bundles to a registry, streaming
//! progress lines to the caller while the transfer runs.

use std::io::Write;

use tracing::info;

use stevedore_remote::{stream_progress, CancelToken, RegistryCredentials};
use stevedore_schema::BundleRef;

use crate::{Daemon, DaemonError};

impl Daemon {
    /// Push the bundle bound to `reference` to the configured registry.
    ///
    /// A bare name is pushed as `name:latest`; digest-form references are
    /// rejected because the registry only accepts movable tags. Progress
    /// lines are written to `out` for the duration of the transfer, and the
    /// call does not return until the progress drain has finished.
    pub fn push(
        &self,
        reference: &str,
        creds: &RegistryCredentials,
        out: &mut (dyn Write + Send),
    ) -> Result<(), DaemonError> {
        let reference = BundleRef::parse(reference)?;
        if reference.is_canonical() {
            return Err(DaemonError::DigestPushUnsupported);
        }
        let reference = reference.with_default_tag();

        let id = self.resolve(&reference.to_string())?;
        let payload = self.bundles().get_bytes(&id)?;

        let cancel = CancelToken::new();
        stream_progress(out, &cancel, |sink| {
            self.registry()
                .push(&cancel, &reference, &payload, sink, creds)
        })?;
        info!(reference = %reference, id = %id.short(), "bundle pushed");
        Ok(())
    }

    /// Bundles cannot be pulled; the transfer direction is push-only.
    pub fn pull(
        &self,
        _reference: &str,
        _creds: &RegistryCredentials,
    ) -> Result<(), DaemonError> {
        Err(DaemonError::PullUnsupported)
    }
}
