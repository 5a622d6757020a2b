//! Validating and enqueueing bundle requests.

use chrono::Utc;
use log::info;
use mail_parser::MessageParser;

use crate::db::{self, archive_job_repo, catalog_repo, Database};
use crate::error::SubmissionError;

/// Parses a comma-separated RFC 5322 address list into bare addresses.
pub fn parse_address_list(list: &str) -> Result<Vec<String>, SubmissionError> {
    if list.trim().is_empty() {
        return Err(SubmissionError::NoAddresses);
    }
    if list.contains(['\r', '\n']) {
        return Err(invalid(list, "address list must be a single line"));
    }

    let raw = format!("To: {}\r\n\r\n", list);
    let message = MessageParser::default()
        .parse(raw.as_bytes())
        .ok_or_else(|| invalid(list, "unparseable address list"))?;
    let to = message
        .to()
        .ok_or_else(|| invalid(list, "no addresses found"))?;

    let mut addresses = Vec::new();
    for addr in to.iter() {
        let address = addr
            .address()
            .ok_or_else(|| invalid(list, "entry without an address"))?;
        if !is_plausible_address(address) {
            return Err(invalid(list, &format!("'{}' is not an email address", address)));
        }
        addresses.push(address.to_string());
    }

    if addresses.is_empty() {
        return Err(SubmissionError::NoAddresses);
    }
    Ok(addresses)
}

fn invalid(list: &str, reason: &str) -> SubmissionError {
    SubmissionError::InvalidAddresses {
        list: list.to_string(),
        reason: reason.to_string(),
    }
}

fn is_plausible_address(address: &str) -> bool {
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    match address.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Validates a bundle request and enqueues it. Returns the new job id.
///
/// The selection keeps its order; repeated ids are dropped. Every id must
/// exist in the catalog.
pub fn submit_job(db: &Database, emails: &str, file_ids: &[i64]) -> Result<i64, SubmissionError> {
    if file_ids.is_empty() {
        return Err(SubmissionError::EmptySelection);
    }
    let addresses = parse_address_list(emails)?;

    let mut selection: Vec<i64> = Vec::with_capacity(file_ids.len());
    for id in file_ids {
        if !selection.contains(id) {
            selection.push(*id);
        }
    }

    let found = catalog_repo::files_by_ids(db, &selection)?;
    if found.len() != selection.len() {
        let missing = selection
            .iter()
            .find(|id| !found.iter().any(|f| f.id == **id))
            .copied()
            .unwrap_or_default();
        return Err(SubmissionError::UnknownFile(missing));
    }

    let job_id = archive_job_repo::insert(db, &addresses, &selection, &db::timestamp(Utc::now()))?;
    info!(
        "Queued archive job {} ({} file(s), {} recipient(s))",
        job_id,
        selection.len(),
        addresses.len()
    );
    Ok(job_id)
}
