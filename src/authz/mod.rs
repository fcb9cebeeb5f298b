//! Authorization and query envelope
//!
//! Ownership is the universal precondition for every read and mutation on
//! aliases, emails, and attachments. This module centralizes the check
//! order (existence before ownership), the bulk-operation partition, and
//! the bounded list contract so handlers never reimplement them.

pub mod address;
pub mod query;

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

pub use address::{full_address, is_valid_hostname, validate_local_part};
pub use query::{EmailQuery, EmailSortKey, Page, Pagination, SortOrder};

/// An entity with a resolvable owner
pub trait Owned {
    fn owner_id(&self) -> Uuid;
}

impl Owned for crate::types::Alias {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

impl Owned for crate::types::Domain {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// Resolve a fetched entity into the caller's view.
///
/// The existence check precedes the ownership decision: a missing row is
/// `NotFound` regardless of the caller, and only rows that exist can come
/// back as `AccessDenied`. Handlers pass the repository's `Option<T>`
/// straight through.
pub fn ensure_owner<T: Owned>(user_id: Uuid, entity: Option<T>, what: &str) -> Result<T> {
    match entity {
        None => Err(Error::not_found(what.to_string())),
        Some(e) if e.owner_id() == user_id => Ok(e),
        Some(_) => Err(Error::access_denied(what.to_string())),
    }
}

/// Variant for entities whose owner is resolved by a join (emails,
/// attachments): the repository returns the entity together with the
/// owning user id.
pub fn ensure_owner_joined<T>(user_id: Uuid, entity: Option<(T, Uuid)>, what: &str) -> Result<T> {
    match entity {
        None => Err(Error::not_found(what.to_string())),
        Some((e, owner)) if owner == user_id => Ok(e),
        Some(_) => Err(Error::access_denied(what.to_string())),
    }
}

/// Result of a bulk mutation. Non-owned ids MUST appear in `failed_ids` so
/// clients can detect partial authorization.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkOutcome {
    pub success_count: usize,
    pub failed_count: usize,
    pub failed_ids: Vec<String>,
}

/// Parsed bulk id-set: well-formed ids plus the malformed originals
#[derive(Debug, Clone)]
pub struct ParsedIdSet {
    pub parsed: Vec<Uuid>,
    pub malformed: Vec<String>,
    total: usize,
}

impl ParsedIdSet {
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Parse a raw bulk id list. Rejects the whole request past `max`;
/// unparseable ids are set aside rather than failing the request.
pub fn parse_bulk_ids(raw: &[String], max: usize) -> Result<ParsedIdSet> {
    if raw.len() > max {
        return Err(Error::BulkLimitExceeded {
            got: raw.len(),
            max,
        });
    }

    let mut parsed = Vec::with_capacity(raw.len());
    let mut malformed = Vec::new();
    for id in raw {
        match Uuid::parse_str(id) {
            Ok(u) => parsed.push(u),
            Err(_) => malformed.push(id.clone()),
        }
    }

    Ok(ParsedIdSet {
        total: raw.len(),
        parsed,
        malformed,
    })
}

/// Partition parsed ids against the owned subset returned by a single
/// repository query. Order of `failed_ids` follows the request: malformed
/// ids first, then foreign ids.
pub fn partition_owned(ids: &ParsedIdSet, owned: &HashSet<Uuid>) -> (Vec<Uuid>, Vec<Uuid>) {
    let mut mine = Vec::with_capacity(ids.parsed.len());
    let mut foreign = Vec::new();
    for id in &ids.parsed {
        if owned.contains(id) {
            mine.push(*id);
        } else {
            foreign.push(*id);
        }
    }
    (mine, foreign)
}

/// Assemble the outcome after the batched mutation succeeded on `mutated`.
pub fn bulk_outcome(ids: &ParsedIdSet, foreign: &[Uuid], mutated: usize) -> BulkOutcome {
    let mut failed_ids: Vec<String> = ids.malformed.clone();
    failed_ids.extend(foreign.iter().map(|u| u.to_string()));
    BulkOutcome {
        success_count: mutated,
        failed_count: failed_ids.len(),
        failed_ids,
    }
}
