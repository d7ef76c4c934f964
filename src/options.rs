/*!
 * @file options.rs
 * @brief Write, find, and update options carried in request payloads
 */

use std::fmt;
use std::str::FromStr;

use bson::{Bson, Document};

use crate::error::{PersistorError, Result};

/// Write acknowledgement level for mutating operations. Wire names are
/// matched case-exactly; anything else is an argument error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOption {
    Acknowledged,
    Unacknowledged,
    Fsynced,
    Journaled,
    ReplicaAcknowledged,
    Majority,
}

impl WriteOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOption::Acknowledged => "ACKNOWLEDGED",
            WriteOption::Unacknowledged => "UNACKNOWLEDGED",
            WriteOption::Fsynced => "FSYNCED",
            WriteOption::Journaled => "JOURNALED",
            WriteOption::ReplicaAcknowledged => "REPLICA_ACKNOWLEDGED",
            WriteOption::Majority => "MAJORITY",
        }
    }
}

impl fmt::Display for WriteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteOption {
    type Err = PersistorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACKNOWLEDGED" => Ok(WriteOption::Acknowledged),
            "UNACKNOWLEDGED" => Ok(WriteOption::Unacknowledged),
            "FSYNCED" => Ok(WriteOption::Fsynced),
            "JOURNALED" => Ok(WriteOption::Journaled),
            "REPLICA_ACKNOWLEDGED" => Ok(WriteOption::ReplicaAcknowledged),
            "MAJORITY" => Ok(WriteOption::Majority),
            other => Err(PersistorError::Argument(format!(
                "unknown write option '{}'",
                other
            ))),
        }
    }
}

/// Query shaping for find operations. `limit` of -1 means unlimited.
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    pub fields: Option<Document>,
    pub sort: Option<Document>,
    pub limit: i64,
    pub skip: i64,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            fields: None,
            sort: None,
            limit: -1,
            skip: 0,
        }
    }
}

impl FindOptions {
    /// Reads options from an `options` sub-document. An absent sub-document
    /// yields the defaults; a present one overrides only the keys it carries.
    pub fn from_document(doc: Option<&Document>) -> Result<Self> {
        let doc = match doc {
            Some(doc) => doc,
            None => return Ok(Self::default()),
        };

        Ok(Self {
            fields: read_document(doc, "fields")?,
            sort: read_document(doc, "sort")?,
            limit: read_i64(doc, "limit", -1)?,
            skip: read_i64(doc, "skip", 0)?,
        })
    }
}

/// Options for update and replace operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub multi: bool,
    pub upsert: bool,
    pub write_option: Option<WriteOption>,
}

impl UpdateOptions {
    pub fn new(upsert: bool, multi: bool) -> Self {
        Self {
            multi,
            upsert,
            write_option: None,
        }
    }

    pub fn from_document(doc: Option<&Document>) -> Result<Self> {
        let doc = match doc {
            Some(doc) => doc,
            None => return Ok(Self::default()),
        };

        Ok(Self {
            multi: read_bool(doc, "multi", false)?,
            upsert: read_bool(doc, "upsert", false)?,
            write_option: read_write_option(doc, "writeOption")?,
        })
    }
}

/// Reads an optional write-option name from a payload document.
pub fn read_write_option(doc: &Document, key: &str) -> Result<Option<WriteOption>> {
    match doc.get(key) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::String(name)) => Ok(Some(name.parse()?)),
        Some(_) => Err(PersistorError::Argument(format!(
            "field '{}' must be a string",
            key
        ))),
    }
}

fn read_document(doc: &Document, key: &str) -> Result<Option<Document>> {
    match doc.get(key) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Document(inner)) => Ok(Some(inner.clone())),
        Some(_) => Err(PersistorError::Argument(format!(
            "field '{}' must be a document",
            key
        ))),
    }
}

fn read_i64(doc: &Document, key: &str, default: i64) -> Result<i64> {
    match doc.get(key) {
        None | Some(Bson::Null) => Ok(default),
        Some(Bson::Int32(n)) => Ok(i64::from(*n)),
        Some(Bson::Int64(n)) => Ok(*n),
        Some(Bson::Double(d)) if d.fract() == 0.0 => Ok(*d as i64),
        Some(_) => Err(PersistorError::Argument(format!(
            "field '{}' must be an integer",
            key
        ))),
    }
}

fn read_bool(doc: &Document, key: &str, default: bool) -> Result<bool> {
    match doc.get(key) {
        None | Some(Bson::Null) => Ok(default),
        Some(Bson::Boolean(b)) => Ok(*b),
        Some(_) => Err(PersistorError::Argument(format!(
            "field '{}' must be a boolean",
            key
        ))),
    }
}
