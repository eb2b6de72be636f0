//! Container image reference validation.
//!
//! A workload's image is either an OCI-style reference
//! (`nginx:alpine`, `ghcr.io/acme/api:v1.2`, `repo@sha256:...`) or a git
//! repository URL that a build step turns into an image
//! (`https://github.com/acme/api`).

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

const REPOSITORY: &str = r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*$";
const TAG: &str = r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$";
const DIGEST: &str = r"^sha256:[a-f0-9]{64}$";
const HOST: &str = r"^[A-Za-z0-9](?:[A-Za-z0-9.-]*[A-Za-z0-9])?(?::[0-9]{1,5})?$";

fn matches(pattern: &str, s: &str) -> bool {
    Regex::new(pattern).is_ok_and(|re| re.is_match(s))
}

/// A validated image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// OCI registry reference.
    Registry {
        registry: Option<String>,
        repository: String,
        tag: String,
        digest: Option<String>,
    },
    /// Source repository over http(s).
    Git { url: String },
}

impl ImageRef {
    pub fn parse(s: &str) -> ValidationResult<Self> {
        let invalid = || ValidationError::InvalidImage(s.to_string());
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        if let Some(rest) = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"))
        {
            let host = rest.split('/').next().unwrap_or_default();
            if !matches(HOST, host) {
                return Err(invalid());
            }
            return Ok(ImageRef::Git { url: s.to_string() });
        }

        let (name, digest) = match s.split_once('@') {
            Some((name, digest)) => {
                if !matches(DIGEST, digest) {
                    return Err(invalid());
                }
                (name, Some(digest.to_string()))
            }
            None => (s, None),
        };

        // A leading component is a registry only if it looks like a host.
        let (registry, remainder) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                if !matches(HOST, first) {
                    return Err(invalid());
                }
                (Some(first.to_string()), rest)
            }
            _ => (None, name),
        };

        // The tag separator is the last ':' after the last '/'.
        let last_segment_start = remainder.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match remainder[last_segment_start..].rfind(':') {
            Some(i) => {
                let split = last_segment_start + i;
                (&remainder[..split], &remainder[split + 1..])
            }
            None => (remainder, "latest"),
        };

        if !matches(REPOSITORY, repository) || !matches(TAG, tag) {
            return Err(invalid());
        }

        Ok(ImageRef::Registry {
            registry,
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ImageRef::Registry { .. } => "registry",
            ImageRef::Git { .. } => "git",
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Registry {
                registry,
                repository,
                tag,
                digest,
            } => {
                if let Some(r) = registry {
                    write!(f, "{r}/")?;
                }
                write!(f, "{repository}:{tag}")?;
                if let Some(d) = digest {
                    write!(f, "@{d}")?;
                }
                Ok(())
            }
            ImageRef::Git { url } => f.write_str(url),
        }
    }
}
