//! Submission source adapter: fetch and decode the spreadsheet export.
//!
//! The source of truth for applications is a shared Google Sheet. We never
//! talk to the Sheets API proper — the sheet is fetched as a one-shot CSV
//! export and decoded into [`Submission`] rows. Fetch or decode failure is
//! fatal for the whole pass: a partial submission list would make missing
//! work indistinguishable from "everything is covered".

use std::time::Duration;

use log::{debug, info};

use crate::error::SourceFetchError;
use crate::types::Submission;

/// Column headers recognized specially; everything else lands in
/// `raw_fields`.
const COL_COMPANY: &str = "Company Name";
const COL_TOKEN: &str = "Token";
const COL_SUBMITTED_AT: &str = "Submitted At";

/// Boilerplate rows the form backend appends below real submissions.
const PLACEHOLDER_NAMES: &[&str] = &[
    "Company Name",
    "By submitting this application",
    "For the avoidance of doubt",
];

/// Fetch timeout for the export endpoint.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Derive the CSV export URL from a Google Sheets view/edit URL.
///
/// Accepts any URL containing a `/d/<sheet-id>/` segment.
pub fn export_url(sheet_url: &str) -> Result<String, SourceFetchError> {
    let sheet_id = sheet_url
        .split_once("/d/")
        .map(|(_, rest)| rest.split('/').next().unwrap_or(rest))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SourceFetchError::InvalidUrl(sheet_url.to_string()))?;

    Ok(format!(
        "https://docs.google.com/spreadsheets/d/{}/export?format=csv",
        sheet_id
    ))
}

/// Fetch the current submission snapshot from the sheet.
///
/// One blocking GET against the derived export URL. Any transport error,
/// timeout, or non-2xx status is a [`SourceFetchError`] — the caller
/// retries the whole pass or gives up; there is no partial result.
pub fn fetch_submissions(sheet_url: &str) -> Result<Vec<Submission>, SourceFetchError> {
    let url = export_url(sheet_url)?;
    debug!("fetching sheet export from {}", url);

    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| SourceFetchError::Transport(e.to_string()))?;

    let resp = client
        .get(&url)
        .send()
        .map_err(|e| SourceFetchError::Transport(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(SourceFetchError::Http { status: status.as_u16() });
    }

    let body = resp
        .text()
        .map_err(|e| SourceFetchError::Transport(e.to_string()))?;

    let submissions = parse_submissions(&body)?;
    info!("sheet export: {} submissions", submissions.len());
    Ok(submissions)
}

/// Decode CSV export text into submissions, in source order.
///
/// Rows with an empty or placeholder company name are discarded here so
/// downstream consumers only ever see real applications.
pub fn parse_submissions(csv_text: &str) -> Result<Vec<Submission>, SourceFetchError> {
    let text = csv_text.strip_prefix('\u{feff}').unwrap_or(csv_text);
    let mut records = parse_csv(text)?.into_iter();

    let header: Vec<String> = match records.next() {
        Some(h) => h.into_iter().map(|c| c.trim().to_string()).collect(),
        None => return Ok(Vec::new()),
    };

    let mut submissions = Vec::new();
    for record in records {
        let mut submission = Submission {
            company_name: String::new(),
            token: String::new(),
            submitted_at: String::new(),
            raw_fields: Default::default(),
        };

        for (i, value) in record.into_iter().enumerate() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match header.get(i).map(String::as_str) {
                Some(COL_COMPANY) => submission.company_name = value.to_string(),
                Some(COL_TOKEN) => submission.token = value.to_string(),
                Some(COL_SUBMITTED_AT) => submission.submitted_at = value.to_string(),
                Some(name) if !name.is_empty() => {
                    submission
                        .raw_fields
                        .insert(name.to_string(), value.to_string());
                }
                _ => {}
            }
        }

        if is_real_submission(&submission.company_name) {
            submissions.push(submission);
        }
    }

    Ok(submissions)
}

/// Filter out empty rows, form boilerplate, and test entries.
fn is_real_submission(company_name: &str) -> bool {
    if company_name.is_empty() {
        return false;
    }
    if PLACEHOLDER_NAMES.contains(&company_name) {
        return false;
    }
    !company_name.eq_ignore_ascii_case("test")
}

/// Minimal CSV record reader for the export format: comma separator,
/// double-quote quoting with `""` escapes, CRLF or LF row endings,
/// embedded newlines inside quoted fields.
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, SourceFetchError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                if field.is_empty() {
                    in_quotes = true;
                } else {
                    // Quote in the middle of an unquoted field; keep it.
                    field.push('"');
                }
            }
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(SourceFetchError::Malformed(
            "unterminated quoted field".to_string(),
        ));
    }

    // Trailing record without a final newline.
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    // Drop rows that are entirely empty cells.
    records.retain(|r| r.iter().any(|c| !c.trim().is_empty()));

    Ok(records)
}
