//! Bundle ingestion: accept manifest bytes from a stream or URL, validate
//! them against the image backend, stamp provenance fields, and store.

use std::io::{Read, Write};

use chrono::Utc;
use flate2::read::GzDecoder;
use tracing::{debug, info};

use stevedore_schema::{Bundle, BundleId, BundleRef, SchemaError};

use crate::{Daemon, DaemonError, ENGINE_VERSION};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Where ingestion input comes from.
pub enum BundleSource<'a> {
    /// Manifest bytes supplied directly, e.g. an uploaded file.
    Stream(&'a mut dyn Read),
    /// Manifest downloaded from a URL. A bare host is fetched over http.
    Url(&'a str),
}

impl Daemon {
    /// Ingest a bundle manifest and return its content ID.
    ///
    /// Gzip input is decompressed transparently. Every service image must
    /// resolve against the image backend or nothing is stored. Missing
    /// `Created`/`EngineVersion` fields are stamped before the digest is
    /// computed, so identical unstamped input ingested twice yields two
    /// distinct bundles. Status lines go to `out`.
    pub fn create_bundle(
        &self,
        source: BundleSource<'_>,
        repository: Option<&str>,
        tag: Option<&str>,
        out: &mut dyn Write,
    ) -> Result<BundleId, DaemonError> {
        let target = match repository {
            Some(repository) => {
                let reference = BundleRef::parse(repository)?;
                if reference.is_canonical() {
                    return Err(DaemonError::CannotTagDigest);
                }
                Some(match tag {
                    Some(tag) => reference.with_tag(tag)?,
                    None => reference.with_default_tag(),
                })
            }
            None => None,
        };

        let raw = match source {
            BundleSource::Stream(reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                buf
            }
            BundleSource::Url(url) => self.download(url, out)?,
        };
        let raw = decompress_if_gzip(&raw)?;

        let mut bundle = decode(&raw)?;
        for spec in &bundle.services {
            self.lookup_image(&spec.image)?;
        }

        // Stamping changes the bytes, so the stored form is re-serialized
        // only when a stamp was applied; otherwise the input bytes are kept
        // verbatim and the digest covers exactly what the caller sent.
        let mut stamped = false;
        if bundle.created.is_none() {
            bundle.created = Some(Utc::now());
            stamped = true;
        }
        if bundle.engine_version.is_none() {
            bundle.engine_version = Some(ENGINE_VERSION.to_owned());
            stamped = true;
        }
        let canonical = if stamped {
            bundle.to_canonical_json()?
        } else {
            raw
        };

        let id = self.bundles().create(&canonical)?;

        if let Some(reference) = &target {
            self.references().add_tag(reference, &id, true)?;
            debug!(reference = %reference, id = %id.short(), "ingested bundle tagged");
        }

        info!(id = %id.short(), services = bundle.services.len(), "bundle created");
        writeln!(out, "{id}")?;
        Ok(id)
    }

    fn download(&self, url: &str, out: &mut dyn Write) -> Result<Vec<u8>, DaemonError> {
        let url = if url.contains("://") {
            url.to_owned()
        } else {
            format!("http://{url}")
        };
        writeln!(out, "Downloading bundle from {url}")?;

        let mut response = ureq::get(&url)
            .call()
            .map_err(|err| DaemonError::InvalidInput(format!("download failed: {err}")))?;
        let mut buf = Vec::new();
        response.body_mut().as_reader().read_to_end(&mut buf)?;
        Ok(buf)
    }
}

fn decompress_if_gzip(raw: &[u8]) -> Result<Vec<u8>, DaemonError> {
    if !raw.starts_with(&GZIP_MAGIC) {
        return Ok(raw.to_vec());
    }
    let mut decoded = Vec::new();
    GzDecoder::new(raw)
        .read_to_end(&mut decoded)
        .map_err(|err| DaemonError::InvalidInput(format!("gzip stream: {err}")))?;
    Ok(decoded)
}

/// Undecodable manifest bytes are the caller's fault, not a schema bug.
fn decode(raw: &[u8]) -> Result<Bundle, DaemonError> {
    Bundle::from_json(raw).map_err(|err| match err {
        SchemaError::Json(err) => DaemonError::InvalidInput(err.to_string()),
        other => DaemonError::Schema(other),
    })
}
