#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Parses Tally master-data exports: ledger groups, ledgers with their
//! opening bill allocations, stock groups, stock items, and units of
//! measure.

use std::collections::HashMap;

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use thiserror::Error;

const BILL_ALLOCATION_GROUP: &str = "BILLALLOCATIONS.LIST";
const HSN_DETAILS_GROUP: &str = "HSNDETAILS.LIST";

#[derive(Debug, Error)]
pub enum MasterParseError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerGroupRecord {
    pub guid: Option<String>,
    pub name: String,
    pub parent_name: Option<String>,
    pub alter_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub name: String,
    pub parent_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningBillAllocation {
    pub ledger: String,
    pub ref_name: String,
    pub bill_date: Option<NaiveDate>,
    pub opening_balance_minor: i64,
    pub credit_period_days: Option<i64>,
    pub is_advance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerGroupParseResult {
    pub groups: Vec<LedgerGroupRecord>,
    pub ledgers: Vec<LedgerRecord>,
    pub opening_bills: Vec<OpeningBillAllocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockGroupRecord {
    pub guid: Option<String>,
    pub name: String,
    pub parent_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub name: String,
    pub formal_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub guid: Option<String>,
    pub name: String,
    pub parent_name: Option<String>,
    pub base_units: Option<String>,
    pub hsn_code: Option<String>,
}

/// One raw `<TAG NAME="...">...</TAG>` element: the `NAME` attribute, its
/// direct scalar child fields, and any repeated group children (by tag
/// name) recognized by the caller.
struct RawElement {
    name_attr: String,
    scalars: HashMap<String, String>,
    groups: Vec<(String, HashMap<String, String>)>,
}

pub fn parse_ledger_groups(xml: &str) -> Result<LedgerGroupParseResult, MasterParseError> {
    let mut result = LedgerGroupParseResult::default();

    for element in scan_elements(xml, "GROUP", &[])? {
        result.groups.push(LedgerGroupRecord {
            guid: non_empty(element.scalars.get("GUID")),
            name: element.name_attr,
            parent_name: non_empty(element.scalars.get("PARENT")),
            alter_id: element.scalars.get("ALTERID").and_then(|raw| raw.trim().parse().ok()),
        });
    }

    for element in scan_elements(xml, "LEDGER", &[BILL_ALLOCATION_GROUP])? {
        let ledger_name = element.name_attr.clone();
        result.ledgers.push(LedgerRecord {
            name: ledger_name.clone(),
            parent_group: non_empty(element.scalars.get("PARENT")),
        });

        for (group_tag, fields) in &element.groups {
            if group_tag != BILL_ALLOCATION_GROUP {
                continue;
            }
            result.opening_bills.push(OpeningBillAllocation {
                ledger: ledger_name.clone(),
                ref_name: fields.get("NAME").cloned().unwrap_or_default(),
                bill_date: fields.get("BILLDATE").map(|raw| parse_tally_date(raw)),
                opening_balance_minor: parse_amount_minor(
                    fields.get("OPENINGBALANCE").map(String::as_str).unwrap_or(""),
                ),
                credit_period_days: fields
                    .get("BILLCREDITPERIOD")
                    .and_then(|raw| raw.trim().split_whitespace().next())
                    .and_then(|raw| raw.parse::<i64>().ok()),
                is_advance: fields
                    .get("ISADVANCE")
                    .map(|raw| raw.trim().eq_ignore_ascii_case("yes"))
                    .unwrap_or(false),
            });
        }
    }

    Ok(result)
}

pub fn parse_stock_groups(xml: &str) -> Result<Vec<StockGroupRecord>, MasterParseError> {
    scan_elements(xml, "STOCKGROUP", &[])?
        .into_iter()
        .map(|element| {
            Ok(StockGroupRecord {
                guid: non_empty(element.scalars.get("GUID")),
                name: element.name_attr,
                parent_name: non_empty(element.scalars.get("PARENT")),
            })
        })
        .collect()
}

pub fn parse_units(xml: &str) -> Result<Vec<UnitRecord>, MasterParseError> {
    scan_elements(xml, "UNIT", &[])?
        .into_iter()
        .map(|element| {
            Ok(UnitRecord {
                name: element.name_attr,
                formal_name: non_empty(element.scalars.get("FORMALNAME")),
            })
        })
        .collect()
}

pub fn parse_items(xml: &str) -> Result<Vec<ItemRecord>, MasterParseError> {
    scan_elements(xml, "STOCKITEM", &[HSN_DETAILS_GROUP])?
        .into_iter()
        .map(|element| {
            let hsn_code = latest_hsn_code(&element.groups)
                .or_else(|| non_empty(element.scalars.get("HSNCODE")));
            Ok(ItemRecord {
                guid: non_empty(element.scalars.get("GUID")),
                name: element.name_attr,
                parent_name: non_empty(element.scalars.get("PARENT")),
                base_units: non_empty(element.scalars.get("BASEUNITS")),
                hsn_code,
            })
        })
        .collect()
}

/// Prefers the `HSNDETAILS.LIST` entry with the latest `APPLICABLEFROM`
/// date; when none carries a parseable date, falls back to the last one
/// in document order.
fn latest_hsn_code(groups: &[(String, HashMap<String, String>)]) -> Option<String> {
    let hsn_entries: Vec<&HashMap<String, String>> = groups
        .iter()
        .filter(|(tag, _)| tag == HSN_DETAILS_GROUP)
        .map(|(_, fields)| fields)
        .collect();

    if hsn_entries.is_empty() {
        return None;
    }

    let dated = hsn_entries
        .iter()
        .filter_map(|fields| {
            let date = fields.get("APPLICABLEFROM").map(|raw| parse_tally_date(raw))?;
            let code = non_empty(fields.get("HSNCODE"))?;
            Some((date, code))
        })
        .max_by_key(|(date, _)| *date)
        .map(|(_, code)| code);

    dated.or_else(|| hsn_entries.last().and_then(|fields| non_empty(fields.get("HSNCODE"))))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    })
}

/// Scans `xml` for every `<tag_name ...>` element and collects its `NAME`
/// attribute, direct scalar child fields, and any children whose tag name
/// is in `group_tags` (collected as repeated field maps rather than
/// flattened, since those groups can occur more than once per element).
fn scan_elements(
    xml: &str,
    tag_name: &str,
    group_tags: &[&str],
) -> Result<Vec<RawElement>, MasterParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut elements = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(tag) if local_name(&tag) == tag_name => {
                elements.push(read_one_element(&mut reader, &tag, group_tags)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(elements)
}

fn read_one_element(
    reader: &mut Reader<&str>,
    start_tag: &BytesStart<'_>,
    group_tags: &[&str],
) -> Result<RawElement, MasterParseError> {
    let name_attr = attribute(start_tag, "NAME").unwrap_or_default();
    let target_tag = local_name(start_tag);

    let mut scalars: HashMap<String, String> = HashMap::new();
    let mut groups: Vec<(String, HashMap<String, String>)> = Vec::new();

    let mut depth: i32 = 0;
    let mut pending_group: Option<(String, HashMap<String, String>)> = None;
    let mut open_scalar: Option<String> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(tag) => {
                let name = local_name(&tag);
                depth += 1;
                if pending_group.is_none() && group_tags.contains(&name.as_str()) {
                    pending_group = Some((name, HashMap::new()));
                } else if pending_group.is_none() {
                    open_scalar = Some(name);
                    text_buf.clear();
                }
            }
            Event::Empty(tag) => {
                let name = local_name(&tag);
                if let Some((_, fields)) = pending_group.as_mut() {
                    fields.entry(name).or_default();
                } else {
                    scalars.entry(name).or_default();
                }
            }
            Event::Text(text) => {
                text_buf.push_str(&text.unescape()?);
            }
            Event::End(tag) => {
                let name = local_name_end(&tag);
                if name == target_tag && depth == 0 {
                    return Ok(RawElement { name_attr, scalars, groups });
                }
                if let Some((group_name, mut fields)) = pending_group.take() {
                    if name == group_name {
                        groups.push((group_name, fields));
                    } else {
                        fields.insert(name, text_buf.trim().to_string());
                        text_buf.clear();
                        pending_group = Some((group_name, fields));
                    }
                } else if open_scalar.take().is_some() {
                    scalars.insert(name, text_buf.trim().to_string());
                    text_buf.clear();
                }
                depth -= 1;
            }
            Event::Eof => {
                tracing::warn!(tag = %target_tag, "unterminated master element, discarding partial record");
                return Ok(RawElement { name_attr, scalars, groups });
            }
            _ => {}
        }
    }
}

fn attribute(tag: &BytesStart<'_>, key: &str) -> Option<String> {
    tag.attributes().flatten().find_map(|attr| {
        if attr.key.as_ref() == key.as_bytes() {
            Some(String::from_utf8_lossy(attr.value.as_ref()).into_owned())
        } else {
            None
        }
    })
}

fn local_name(tag: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(tag.local_name().as_ref()).into_owned()
}

fn local_name_end(tag: &quick_xml::events::BytesEnd<'_>) -> String {
    String::from_utf8_lossy(tag.local_name().as_ref()).into_owned()
}

fn parse_tally_date(raw: &str) -> NaiveDate {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d-%b-%Y"))
        .unwrap_or_else(|_| {
            tracing::warn!(raw, "unparseable master date, substituting today");
            chrono::Utc::now().date_naive()
        })
}

/// Same convention as the voucher parser: hundredths, thousands separators
/// stripped, `(x)` negated, non-parsable input becomes `0`.
fn parse_amount_minor(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let negative_paren = trimmed.starts_with('(') && trimmed.ends_with(')');
    let inner = if negative_paren { &trimmed[1..trimmed.len() - 1] } else { trimmed };

    let cleaned: String = inner.chars().filter(|c| *c != ',').collect();
    let (sign, cleaned) = match cleaned.strip_prefix('-') {
        Some(rest) => (-1i64, rest.to_string()),
        None => (1i64, cleaned),
    };

    let mut parts = cleaned.splitn(2, '.');
    let whole = parts.next().unwrap_or("0");
    let frac = parts.next().unwrap_or("");

    let whole_val: i64 = whole.parse().unwrap_or(0);
    let frac_padded = format!("{frac:0<2}");
    let frac_val: i64 = frac_padded.get(0..2).and_then(|s| s.parse().ok()).unwrap_or(0);

    let magnitude = whole_val * 100 + frac_val;
    let signed = magnitude * sign;
    if negative_paren { -signed.abs() } else { signed }
}
