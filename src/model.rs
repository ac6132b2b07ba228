// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Value types shared by the counter, the stores and the HTTP layer.
//!
//! A [`FailedAccess`] is the only persisted type. Every decision operation
//! returns an [`AccessResult`], which is computed and never stored.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Resource id used when the caller does not name one.
pub const UNKNOWN_RESOURCE: &str = "_UNKNOWN_RESOURCE_";

/// Current time truncated to millisecond precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Use `time` unless it is absent or not after the epoch, otherwise now.
pub fn time_or_now(time: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match time {
        Some(t) if t.timestamp_millis() > 0 => t.trunc_subsecs(3),
        _ => now(),
    }
}

/// Map a blank resource id onto [`UNKNOWN_RESOURCE`].
pub fn normalize_resource_id(resource_id: &str) -> &str {
    let trimmed = resource_id.trim();
    if trimmed.is_empty() {
        UNKNOWN_RESOURCE
    } else {
        trimmed
    }
}

/// Store-assigned surrogate identifier of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Consecutive failed attempts of one remote host against one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAccess {
    /// Assigned by the store on first save
    pub id: Option<RecordId>,
    pub resource_id: String,
    pub remote_host: String,
    pub counter: u32,
    pub creation_time: DateTime<Utc>,
    pub modification_time: DateTime<Utc>,
}

impl FailedAccess {
    /// A first failure of `remote_host` against `resource_id` at `at`.
    pub fn first_failure(resource_id: &str, remote_host: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            resource_id: normalize_resource_id(resource_id).to_string(),
            remote_host: remote_host.to_string(),
            counter: 1,
            creation_time: at,
            modification_time: at,
        }
    }

    /// Copy with the counter incremented and the modification time refreshed.
    ///
    /// The modification time never moves before the creation time.
    pub fn next_failure(&self, at: DateTime<Utc>) -> Self {
        Self {
            counter: self.counter.saturating_add(1),
            modification_time: at.max(self.creation_time),
            ..self.clone()
        }
    }

    /// True if any term is a case-insensitive substring of the resource id
    /// or the remote host. An empty term list matches every record.
    pub fn matches(&self, terms: &[String]) -> bool {
        if terms.is_empty() {
            return true;
        }
        let resource_id = self.resource_id.to_lowercase();
        let remote_host = self.remote_host.to_lowercase();
        terms
            .iter()
            .any(|t| resource_id.contains(t.as_str()) || remote_host.contains(t.as_str()))
    }
}

/// Split a search value into lowercase terms.
pub fn search_terms(search: &str) -> Vec<String> {
    search
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Outcome of a decision operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResult {
    pub granted: bool,
    pub timestamp: DateTime<Utc>,
    pub counter: u32,
    pub counter_threshold: u32,
    /// Soonest sweep-aligned instant the caller is unblocked; only set when denied
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub denied_until: Option<DateTime<Utc>>,
}

/// Field a record list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Id,
    ResourceId,
    RemoteHost,
    Counter,
    CreationTime,
    ModificationTime,
}

impl SortField {
    fn compare(self, a: &FailedAccess, b: &FailedAccess) -> Ordering {
        match self {
            Self::Id => a.id.cmp(&b.id),
            Self::ResourceId => a.resource_id.cmp(&b.resource_id),
            Self::RemoteHost => a.remote_host.cmp(&b.remote_host),
            Self::Counter => a.counter.cmp(&b.counter),
            Self::CreationTime => a.creation_time.cmp(&b.creation_time),
            Self::ModificationTime => a.modification_time.cmp(&b.modification_time),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ResourceId => "resourceId",
            Self::RemoteHost => "remoteHost",
            Self::Counter => "counter",
            Self::CreationTime => "creationTime",
            Self::ModificationTime => "modificationTime",
        }
    }
}

/// Errors parsing a sort specification string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseSortError {
    #[error("Unknown sort field: {0}")]
    UnknownField(String),

    #[error("Unknown sort direction: {0}")]
    UnknownDirection(String),
}

impl FromStr for SortField {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "").as_str() {
            "id" => Ok(Self::Id),
            "resourceid" => Ok(Self::ResourceId),
            "remotehost" => Ok(Self::RemoteHost),
            "counter" => Ok(Self::Counter),
            "creationtime" | "creationdate" => Ok(Self::CreationTime),
            "modificationtime" | "modificationdate" => Ok(Self::ModificationTime),
            _ => Err(ParseSortError::UnknownField(s.trim().to_string())),
        }
    }
}

/// One (field, direction) step of a sort specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: SortField,
    pub ascending: bool,
}

impl SortOrder {
    pub fn asc(field: SortField) -> Self {
        Self { field, ascending: true }
    }

    pub fn desc(field: SortField) -> Self {
        Self { field, ascending: false }
    }

    /// Parse `field,asc|field,desc|...`. A blank string is an empty list.
    pub fn parse_list(s: &str) -> Result<Vec<SortOrder>, ParseSortError> {
        s.split('|')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse::<SortOrder>)
            .collect()
    }
}

impl FromStr for SortOrder {
    type Err = ParseSortError;

    /// `field` or `field,asc` or `field,desc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, ',');
        let field = parts.next().unwrap_or_default().parse()?;
        let ascending = match parts.next().map(|d| d.trim().to_ascii_lowercase()) {
            None => true,
            Some(d) if d.is_empty() || d == "asc" => true,
            Some(d) if d == "desc" => false,
            Some(d) => return Err(ParseSortError::UnknownDirection(d)),
        };
        Ok(Self { field, ascending })
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.ascending { "asc" } else { "desc" };
        write!(f, "{},{}", self.field.as_str(), dir)
    }
}

/// Order two records by a sort specification.
///
/// An empty specification falls back to the natural order: resource id,
/// remote host, modification time, counter, id.
pub fn compare_records(a: &FailedAccess, b: &FailedAccess, sort: &[SortOrder]) -> Ordering {
    if sort.is_empty() {
        return compare_records(a, b, &NATURAL_ORDER);
    }
    sort.iter()
        .map(|order| {
            let c = order.field.compare(a, b);
            if order.ascending {
                c
            } else {
                c.reverse()
            }
        })
        .find(|c| c.is_ne())
        .unwrap_or(Ordering::Equal)
}

const NATURAL_ORDER: [SortOrder; 5] = [
    SortOrder { field: SortField::ResourceId, ascending: true },
    SortOrder { field: SortField::RemoteHost, ascending: true },
    SortOrder { field: SortField::ModificationTime, ascending: true },
    SortOrder { field: SortField::Counter, ascending: true },
    SortOrder { field: SortField::Id, ascending: true },
];

/// Request for one page of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page number
    pub page_number: usize,
    /// Page size; 0 returns every matching record
    pub page_size: usize,
    pub query: String,
    pub sort: Vec<SortOrder>,
}

impl PageRequest {
    pub fn offset(&self) -> usize {
        self.page_number.saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> Option<usize> {
        (self.page_size > 0).then_some(self.page_size)
    }
}

/// One page of records plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page_number: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return u64::from(self.total > 0);
        }
        self.total.div_ceil(self.page_size as u64)
    }
}
