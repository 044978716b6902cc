//! Confluence REST API request and response bodies.

use serde::{Deserialize, Serialize};

pub(crate) const STORAGE_REPRESENTATION: &str = "storage";
pub(crate) const PAGE_TYPE: &str = "page";

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ContentList {
    #[serde(default)]
    pub results: Vec<Content>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Content {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<ContentBody>,
    #[serde(default)]
    pub version: Option<Version>,
}

impl Content {
    /// The storage-format body value, if the response carried one.
    pub fn storage_value(&self) -> Option<&str> {
        self.body
            .as_ref()?
            .storage
            .as_ref()?
            .value
            .as_deref()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBody {
    #[serde(default)]
    pub storage: Option<StorageValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StorageValue {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Version {
    pub number: u64,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct SpaceRef<'a> {
    pub key: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct StorageBody<'a> {
    pub storage: StorageRepresentation<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StorageRepresentation<'a> {
    pub value: &'a str,
    pub representation: &'static str,
}

impl<'a> StorageBody<'a> {
    pub fn new(value: &'a str) -> Self {
        Self {
            storage: StorageRepresentation {
                value,
                representation: STORAGE_REPRESENTATION,
            },
        }
    }
}

/// `POST /rest/api/content`
#[derive(Debug, Serialize)]
pub(crate) struct NewPage<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'a str,
    pub space: SpaceRef<'a>,
    pub body: StorageBody<'a>,
}

/// `PUT /rest/api/content/{id}`
#[derive(Debug, Serialize)]
pub(crate) struct PageUpdate<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'a str,
    pub body: StorageBody<'a>,
    pub version: Version,
}

/// `POST /rest/api/space`
#[derive(Debug, Serialize)]
pub(crate) struct NewSpace<'a> {
    pub key: &'a str,
    pub name: &'a str,
}
