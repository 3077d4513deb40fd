use crate::types::BundleId;
use crate::SchemaError;
use std::fmt;

/// Default tag applied when a reference names a repository without a tag or digest.
pub const DEFAULT_TAG: &str = "latest";

/// A human-readable bundle reference: `name`, `name:tag`, or `name@digest`.
///
/// A digest-form reference is a permanent alias (the digest *is* the content
/// identity), while a tag-form reference is a movable pointer. The two forms
/// are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BundleRef {
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl BundleRef {
    /// Parse a reference string. Bare digests are not references; use
    /// [`parse_ref_or_id`] when the input may be either.
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        if input.is_empty() {
            return Err(SchemaError::InvalidReference(input.to_owned()));
        }

        if let Some((name, digest)) = input.split_once('@') {
            if !is_bundle_id(digest) {
                return Err(SchemaError::InvalidDigest(digest.to_owned()));
            }
            validate_name(name)?;
            return Ok(Self {
                name: name.to_owned(),
                tag: None,
                digest: Some(digest.to_owned()),
            });
        }

        // A colon only separates a tag when the remainder carries no '/',
        // so registry host:port prefixes stay part of the name.
        if let Some((name, tag)) = input.rsplit_once(':') {
            if !tag.contains('/') {
                validate_name(name)?;
                validate_tag(tag)?;
                return Ok(Self {
                    name: name.to_owned(),
                    tag: Some(tag.to_owned()),
                    digest: None,
                });
            }
        }

        validate_name(input)?;
        Ok(Self {
            name: input.to_owned(),
            tag: None,
            digest: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// True for `name@digest` form.
    pub fn is_canonical(&self) -> bool {
        self.digest.is_some()
    }

    /// True for `name:tag` form.
    pub fn is_tagged(&self) -> bool {
        self.tag.is_some()
    }

    /// Apply [`DEFAULT_TAG`] to a bare name; tagged and digest forms pass
    /// through unchanged.
    #[must_use]
    pub fn with_default_tag(self) -> Self {
        if self.tag.is_none() && self.digest.is_none() {
            Self {
                tag: Some(DEFAULT_TAG.to_owned()),
                ..self
            }
        } else {
            self
        }
    }

    /// Rewrite as a tagged reference to the same repository.
    pub fn with_tag(&self, tag: &str) -> Result<Self, SchemaError> {
        validate_tag(tag)?;
        Ok(Self {
            name: self.name.clone(),
            tag: Some(tag.to_owned()),
            digest: None,
        })
    }

    /// Rewrite as a digest-form reference to the same repository.
    pub fn with_digest(&self, digest: &BundleId) -> Result<Self, SchemaError> {
        if !is_bundle_id(digest.as_str()) {
            return Err(SchemaError::InvalidDigest(digest.to_string()));
        }
        Ok(Self {
            name: self.name.clone(),
            tag: None,
            digest: Some(digest.to_string()),
        })
    }
}

impl fmt::Display for BundleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.tag, &self.digest) {
            (Some(tag), _) => write!(f, "{}:{tag}", self.name),
            (None, Some(digest)) => write!(f, "{}@{digest}", self.name),
            (None, None) => f.write_str(&self.name),
        }
    }
}

/// Result of interpreting user input that may be a raw content ID or a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefOrId {
    Id(BundleId),
    Ref(BundleRef),
}

/// Interpret `input` as a full content digest when it is syntactically one,
/// otherwise parse it as a reference. A syntactically valid digest never
/// falls through to reference parsing.
pub fn parse_ref_or_id(input: &str) -> Result<RefOrId, SchemaError> {
    if is_bundle_id(input) {
        return Ok(RefOrId::Id(BundleId::new(input)));
    }
    Ok(RefOrId::Ref(BundleRef::parse(input)?))
}

/// A full 64-character lowercase hex blake3 digest.
pub fn is_bundle_id(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

fn validate_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 255 {
        return Err(SchemaError::InvalidReference(name.to_owned()));
    }
    let valid = name.bytes().all(|b| {
        b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-' | b'/' | b':')
    });
    if !valid || name.starts_with('/') || name.ends_with('/') {
        return Err(SchemaError::InvalidReference(name.to_owned()));
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<(), SchemaError> {
    if tag.is_empty() || tag.len() > 128 {
        return Err(SchemaError::InvalidTag(tag.to_owned()));
    }
    let mut bytes = tag.bytes();
    let first = bytes.next().unwrap_or(b'.');
    if !(first.is_ascii_alphanumeric() || first == b'_') {
        return Err(SchemaError::InvalidTag(tag.to_owned()));
    }
    if !tag
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return Err(SchemaError::InvalidTag(tag.to_owned()));
    }
    Ok(())
}
