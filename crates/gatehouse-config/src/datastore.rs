//! Datastore connection URLs.
//!
//! The format is `datastore://<project>?namespace=<ns>&credentialsFile=<path>`.
//! Every part is optional; `datastore://` alone selects the default project
//! and the empty namespace.

use std::path::PathBuf;

use url::Url;

use crate::{ConfigError, Result};

/// The only accepted URL scheme.
pub const DATASTORE_SCHEME: &str = "datastore";

/// Environment variable naming a local datastore emulator.
pub const EMULATOR_HOST_VAR: &str = "DATASTORE_EMULATOR_HOST";

/// A parsed datastore connection URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatastoreUrl {
    /// Project taken from the URL host; `None` defers to the environment.
    pub project_id: Option<String>,
    pub namespace: String,
    /// Ignored when an emulator is configured.
    pub credentials_file: Option<PathBuf>,
    pub emulator_host: Option<String>,
}

impl DatastoreUrl {
    /// Parses `raw`, reading the emulator host from the environment.
    pub fn parse(raw: &str) -> Result<Self> {
        let emulator = std::env::var(EMULATOR_HOST_VAR).ok();
        Self::parse_with_emulator(raw, emulator.as_deref())
    }

    /// Parses `raw` with an explicit emulator host.
    pub fn parse_with_emulator(raw: &str, emulator_host: Option<&str>) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| ConfigError::invalid_url(raw, e.to_string()))?;
        if url.scheme() != DATASTORE_SCHEME {
            return Err(ConfigError::invalid_url(
                raw,
                format!("expected scheme '{DATASTORE_SCHEME}', got '{}'", url.scheme()),
            ));
        }

        let emulator_host = emulator_host
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        let mut namespace = String::new();
        let mut credentials_file = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "namespace" => namespace = value.into_owned(),
                "credentialsFile" if !value.is_empty() => {
                    credentials_file = Some(PathBuf::from(value.as_ref()));
                }
                _ => {}
            }
        }
        if emulator_host.is_some() {
            credentials_file = None;
        }

        Ok(Self {
            project_id: url
                .host_str()
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            namespace,
            credentials_file,
            emulator_host,
        })
    }

    pub fn is_emulated(&self) -> bool {
        self.emulator_host.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url() {
        let url = DatastoreUrl::parse_with_emulator(
            "datastore://my-project?namespace=tenant-a&credentialsFile=/etc/creds.json",
            None,
        )
        .unwrap();

        assert_eq!(url.project_id.as_deref(), Some("my-project"));
        assert_eq!(url.namespace, "tenant-a");
        assert_eq!(url.credentials_file, Some(PathBuf::from("/etc/creds.json")));
        assert!(!url.is_emulated());
    }

    #[test]
    fn test_bare_scheme() {
        let url = DatastoreUrl::parse_with_emulator("datastore://", None).unwrap();
        assert_eq!(url.project_id, None);
        assert_eq!(url.namespace, "");
        assert_eq!(url.credentials_file, None);
    }

    #[test]
    fn test_emulator_drops_credentials() {
        let url = DatastoreUrl::parse_with_emulator(
            "datastore://p?credentialsFile=creds.json",
            Some("localhost:8081"),
        )
        .unwrap();

        assert!(url.is_emulated());
        assert_eq!(url.credentials_file, None);

        let url = DatastoreUrl::parse_with_emulator("datastore://p?credentialsFile=c.json", Some(""))
            .unwrap();
        assert!(!url.is_emulated());
        assert!(url.credentials_file.is_some());
    }

    #[test]
    fn test_wrong_scheme() {
        let err = DatastoreUrl::parse_with_emulator("postgres://localhost/db", None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let err = DatastoreUrl::parse_with_emulator("not a url", None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }
}
