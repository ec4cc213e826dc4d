//! Ophalen van documenten voor scenes en EXTERNPROTO-implementaties.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*):").expect("scheme regex compiles")
});

static FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<location>[^#]*)(?:#(?P<fragment>.*))?$").expect("fragment regex compiles")
});

/// Fouten bij het ophalen van een document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("resource {0} niet gevonden")]
    NotFound(String),
    #[error("kan {url} niet lezen: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("schema {scheme} wordt niet ondersteund ({url})")]
    UnsupportedScheme { scheme: String, url: String },
}

/// Zet een url om in documenttekst. Implementaties mogen blokkeren.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Leest `file:`-urls en gewone paden van schijf.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl Fetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let path = match scheme(url) {
            Some(scheme) if scheme.eq_ignore_ascii_case("file") => url
                .get(scheme.len() + 1..)
                .map(|rest| rest.strip_prefix("//").unwrap_or(rest))
                .unwrap_or_default(),
            // Eén letter is een Windows-stationsletter.
            Some(scheme) if scheme.len() > 1 => {
                return Err(FetchError::UnsupportedScheme {
                    scheme: scheme.to_owned(),
                    url: url.to_owned(),
                });
            }
            _ => url,
        };

        std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(url.to_owned())
            } else {
                FetchError::Io {
                    url: url.to_owned(),
                    source,
                }
            }
        })
    }
}

/// Levert documenten die vooraf geregistreerd zijn.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    documents: RefCell<HashMap<String, String>>,
}

impl MemoryFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, document: impl Into<String>) {
        self.documents.borrow_mut().insert(url.into(), document.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.borrow().is_empty()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.documents
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_owned()))
    }
}

/// Het schema van de url, als dat er is.
#[must_use]
pub fn scheme(url: &str) -> Option<&str> {
    SCHEME
        .captures(url)
        .and_then(|captures| captures.name("scheme"))
        .map(|scheme| scheme.as_str())
}

/// Lost `url` op ten opzichte van het document waarin hij stond. Absolute
/// urls en paden blijven ongewijzigd.
#[must_use]
pub fn resolve(base: Option<&str>, url: &str) -> String {
    let url = url.trim();
    if scheme(url).is_some() || url.starts_with('/') {
        return url.to_owned();
    }
    let Some(base) = base else {
        return url.to_owned();
    };
    let (base, _) = split_fragment(base);
    match base.rfind('/') {
        Some(index) => format!("{}{url}", &base[..=index]),
        None => url.to_owned(),
    }
}

/// Splitst `location#fragment`.
#[must_use]
pub fn split_fragment(url: &str) -> (&str, Option<&str>) {
    match FRAGMENT.captures(url) {
        Some(captures) => (
            captures.name("location").map_or(url, |m| m.as_str()),
            captures
                .name("fragment")
                .map(|m| m.as_str())
                .filter(|fragment| !fragment.is_empty()),
        ),
        None => (url, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_urls_resolve_against_base_directory() {
        assert_eq!(
            resolve(Some("file:///scenes/world.x3d"), "protos.x3d#Spinner"),
            "file:///scenes/protos.x3d#Spinner"
        );
        assert_eq!(resolve(Some("world.x3d"), "lib.x3d"), "lib.x3d");
        assert_eq!(
            resolve(Some("dir/world.x3d"), "http://host/lib.x3d"),
            "http://host/lib.x3d"
        );
        assert_eq!(resolve(None, "lib.x3d"), "lib.x3d");
    }

    #[test]
    fn fragments_are_split_off() {
        assert_eq!(split_fragment("lib.x3d#Spinner"), ("lib.x3d", Some("Spinner")));
        assert_eq!(split_fragment("lib.x3d"), ("lib.x3d", None));
        assert_eq!(split_fragment("lib.x3d#"), ("lib.x3d", None));
    }

    #[test]
    fn memory_fetcher_serves_registered_documents() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("mem:lib.x3d", "<X3D/>");
        assert_eq!(fetcher.fetch("mem:lib.x3d").unwrap(), "<X3D/>");
        assert!(matches!(
            fetcher.fetch("mem:other.x3d"),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn file_fetcher_rejects_network_schemes() {
        assert!(matches!(
            FileFetcher.fetch("http://example.com/a.x3d"),
            Err(FetchError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            FileFetcher.fetch("/definitely/not/here.x3d"),
            Err(FetchError::NotFound(_))
        ));
    }
}
