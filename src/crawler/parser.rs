//! Parsers for registry responses
//!
//! Three response shapes come back from the registry:
//! - The validate (suggestion) endpoint: a JSON array of `{value, label}`
//! - The portal fetch endpoint: a WIPO ST.66-style XML document
//! - The detail API: a flat JSON object
//!
//! All three produce the same `TrademarkRecord` (or a yes/no for validate).

use crate::state::CandidateCode;
use crate::storage::TrademarkRecord;
use crate::{CrawlError, Result};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;

/// Decides whether the validate response confirms `code`
///
/// The registry answers with suggestions for the search term; the code
/// exists iff the first suggestion's `value` is exactly the code. An empty
/// array is a plain "not found".
///
/// # Returns
///
/// * `Ok(true)` - the code exists
/// * `Ok(false)` - no exact match
/// * `Err(CrawlError::Parse)` - the body is not a JSON array
pub fn parse_validate_response(body: &str, code: &CandidateCode) -> Result<bool> {
    let value: Value = serde_json::from_str(body).map_err(|e| parse_error(code, e))?;

    let suggestions = value
        .as_array()
        .ok_or_else(|| parse_error(code, "validate response is not an array"))?;

    let expected = code.to_string();
    let found = suggestions
        .first()
        .and_then(|first| first.get("value"))
        .and_then(Value::as_str)
        .map_or(false, |value| value == expected);

    Ok(found)
}

/// Parses a portal fetch response into a record
///
/// The document is read with an HTML parser, so element names are matched
/// in lowercase and the XML-only constructs are rewritten first (see
/// `normalize_xml`).
///
/// # Arguments
///
/// * `body` - The XML response body, kept as the raw payload
/// * `code` - The code that was requested
///
/// # Returns
///
/// * `Ok(TrademarkRecord)` - the parsed record
/// * `Err(CrawlError::Parse)` - the document carries no record for `code`
pub fn parse_record_xml(body: &str, code: &CandidateCode) -> Result<TrademarkRecord> {
    let document = Html::parse_document(&normalize_xml(body));
    let expected = code.to_string();

    let number = first_text(&document, "applicationnumber", code)?
        .ok_or_else(|| parse_error(code, "no ApplicationNumber in response"))?;
    if number != expected {
        return Err(parse_error(
            code,
            format!("response describes {} instead", number),
        ));
    }

    let mut record = TrademarkRecord::from_code(code, body);
    record.mark_name = first_text(&document, "markverbalelementtext", code)?;
    record.mark_image = first_text(&document, "markimageuri", code)?;
    record.filing_date = first_text(&document, "applicationdate", code)?;
    record.publication_date = first_text(&document, "publicationdate", code)?;
    record.registration_number = first_text(&document, "registrationnumber", code)?;
    record.registration_date = first_text(&document, "registrationdate", code)?;
    record.applicant_name = first_text(&document, "applicant freeformatnameline", code)?;
    record.applicant_address = first_text(&document, "applicant freeformataddressline", code)?;
    record.status = first_text(&document, "markcurrentstatuscode", code)?;
    record.nice_classes = all_text(&document, "classnumber", code)?;

    let descriptions = all_text(&document, "goodsservicesdescription", code)?;
    if !descriptions.is_empty() {
        record.nice_description = Some(descriptions.join("; "));
    }

    if record.mark_name.is_none() && record.mark_image.is_none() {
        return Err(parse_error(code, "record has neither a word mark nor an image"));
    }

    Ok(record)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailPayload {
    filing_date: Option<String>,
    status: String,
    #[serde(default)]
    applicant: Option<DetailApplicant>,
    trademark_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    class_number: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct DetailApplicant {
    name: Option<String>,
    address: Option<String>,
}

/// Parses a detail API response into a record
///
/// `status` is the only mandatory field; `classNumber` may be a number, a
/// comma-separated string or an array of either.
pub fn parse_detail_json(body: &str, code: &CandidateCode) -> Result<TrademarkRecord> {
    let payload: DetailPayload = serde_json::from_str(body).map_err(|e| parse_error(code, e))?;

    let mut record = TrademarkRecord::from_code(code, body);
    record.filing_date = payload.filing_date;
    record.status = Some(payload.status);
    record.mark_name = payload.trademark_name;
    record.nice_description = payload.description;
    if let Some(applicant) = payload.applicant {
        record.applicant_name = applicant.name;
        record.applicant_address = applicant.address;
    }
    record.nice_classes = payload
        .class_number
        .as_ref()
        .map(class_numbers)
        .unwrap_or_default();

    Ok(record)
}

fn class_numbers(value: &Value) -> Vec<String> {
    match value {
        Value::Number(n) => vec![n.to_string()],
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Value::Array(items) => items.iter().flat_map(class_numbers).collect(),
        _ => Vec::new(),
    }
}

/// Rewrites XML-only syntax into what an HTML parser reads the same way
///
/// Self-closing elements become an explicit open/close pair, otherwise the
/// HTML tree builder would nest every following sibling inside them. CDATA
/// sections become escaped text instead of being dropped as comments.
fn normalize_xml(body: &str) -> Cow<'_, str> {
    if !body.contains("/>") && !body.contains("<![CDATA[") {
        return Cow::Borrowed(body);
    }

    let mut out = String::with_capacity(body.len() + 64);
    let mut rest = body;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        if let Some(cdata) = rest.strip_prefix("<![CDATA[") {
            let (text, tail) = cdata.split_once("]]>").unwrap_or((cdata, ""));
            push_escaped(&mut out, text);
            rest = tail;
            continue;
        }

        if rest.starts_with("<!--") {
            let end = rest.find("-->").map_or(rest.len(), |i| i + 3);
            out.push_str(&rest[..end]);
            rest = &rest[end..];
            continue;
        }

        let Some(end) = tag_end(rest) else {
            out.push_str(rest);
            rest = "";
            break;
        };
        let tag = &rest[..=end];
        rest = &rest[end + 1..];

        let inner = &tag[1..tag.len() - 1];
        let is_element = inner
            .chars()
            .next()
            .map_or(false, |c| c.is_alphabetic() || c == '_');

        match inner.strip_suffix('/') {
            Some(open) if is_element => {
                let name = open
                    .split(|c: char| c.is_whitespace())
                    .next()
                    .unwrap_or_default();
                out.push('<');
                out.push_str(open.trim_end());
                out.push_str("></");
                out.push_str(name);
                out.push('>');
            }
            _ => out.push_str(tag),
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Index of the `>` closing the tag that starts `tag`, skipping quoted values
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tag.char_indices().skip(1) {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn selector(css: &str, code: &CandidateCode) -> Result<Selector> {
    Selector::parse(css).map_err(|e| parse_error(code, format!("bad selector {}: {:?}", css, e)))
}

/// Trimmed text of the first matching element, None when absent or blank
fn first_text(document: &Html, css: &str, code: &CandidateCode) -> Result<Option<String>> {
    let selector = selector(css, code)?;
    Ok(document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty()))
}

fn all_text(document: &Html, css: &str, code: &CandidateCode) -> Result<Vec<String>> {
    let selector = selector(css, code)?;
    Ok(document
        .select(&selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect())
}

fn parse_error(code: &CandidateCode, message: impl ToString) -> CrawlError {
    CrawlError::Parse {
        code: code.to_string(),
        message: message.to_string(),
    }
}
