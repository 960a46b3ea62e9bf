#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Turns a Tally voucher-register response into normalized voucher records.
//! The hard part is amount resolution: Tally emits up to three candidate
//! amount sources per voucher with non-uniform coverage across XML variants,
//! and only one combination recovers both the pre-tax subtotal and the
//! tax-inclusive total.

use std::collections::HashMap;

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::Event;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

const INVENTORY_GROUP: &str = "ALLINVENTORYENTRIES.LIST";
const LEDGER_GROUP_INVOICE_LIKE: &str = "LEDGERENTRIES.LIST";
const LEDGER_GROUP_OTHER: &str = "ALLLEDGERENTRIES.LIST";
const BILL_ALLOCATION_GROUP: &str = "BILLALLOCATIONS.LIST";

/// Voucher types whose ledger entries live under `LEDGERENTRIES.LIST`
/// (single `L`) and which carry tax: everything else uses
/// `ALLLEDGERENTRIES.LIST` and has no tax by definition.
const TAX_BEARING_TYPES: &[&str] = &[
    "sales",
    "invoice",
    "credit note",
    "sales return",
    "purchase",
    "purchase return",
    "debit note",
];

#[derive(Debug, Error)]
pub enum VoucherParseError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("voucher missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountResolutionCase {
    /// Inventory present alongside a ledger or bill-allocation amount; the
    /// combination that recovers tax.
    A,
    /// Only a party ledger-entry amount present.
    B,
    /// Only a bill-allocation amount present.
    C,
    /// Only inventory present.
    D,
    /// None of the three candidates present; fell back to header `AMOUNT`.
    E,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillType {
    NewRef,
    AgstRef,
    Advance,
    OnAccount,
    Other(String),
}

impl BillType {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "new ref" => BillType::NewRef,
            "agst ref" => BillType::AgstRef,
            "advance" => BillType::Advance,
            "on account" => BillType::OnAccount,
            other => BillType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub stock_item_name: String,
    pub billed_qty: String,
    pub rate: String,
    pub amount_minor: i64,
    pub discount: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillAllocation {
    pub ref_name: String,
    pub amount_minor: i64,
    pub bill_type: BillType,
    pub credit_period_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voucher {
    pub voucher_type: String,
    pub voucher_number: String,
    /// GUID if present, else `REMOTEID` promoted into this slot. Empty if
    /// neither source field was present.
    pub guid: String,
    pub date: NaiveDate,
    pub party: String,
    pub party_gstin: Option<String>,
    pub party_pincode: Option<String>,
    pub party_city: Option<String>,
    pub subtotal_minor: i64,
    pub total_minor: i64,
    pub tax_minor: i64,
    pub roundoff_minor: i64,
    pub inventory_entries: Vec<InventoryEntry>,
    pub bill_allocations: Vec<BillAllocation>,
    pub amount_resolution_case: AmountResolutionCase,
    pub voucher_key: String,
}

/// Parses `xml` into a finite, restartable iterator of voucher records.
/// Records are yielded as soon as their `<VOUCHER>` element is fully read;
/// the whole document is never held in structured form, only the one
/// voucher currently being assembled.
pub fn parse_vouchers(xml: &str) -> VoucherParser<'_> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    VoucherParser { reader, done: false }
}

pub struct VoucherParser<'a> {
    reader: Reader<&'a str>,
    done: bool,
}

impl Iterator for VoucherParser<'_> {
    type Item = Result<Voucher, VoucherParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.reader.read_event() {
                Ok(Event::Start(tag)) if local_name(&tag) == "VOUCHER" => {
                    return Some(read_one_voucher(&mut self.reader));
                }
                Ok(Event::Eof) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(VoucherParseError::Xml(err)));
                }
            }
        }
    }
}

fn local_name(tag: &quick_xml::events::BytesStart<'_>) -> String {
    String::from_utf8_lossy(tag.local_name().as_ref()).into_owned()
}

fn local_name_end(tag: &quick_xml::events::BytesEnd<'_>) -> String {
    String::from_utf8_lossy(tag.local_name().as_ref()).into_owned()
}

/// Reads events from `reader` until the `</VOUCHER>` matching the
/// already-consumed `<VOUCHER>` start tag, collecting top-level scalar
/// fields and the three repeated groups (inventory entries, ledger
/// entries, bill allocations) along the way.
fn read_one_voucher(reader: &mut Reader<&str>) -> Result<Voucher, VoucherParseError> {
    let mut scalars: HashMap<String, String> = HashMap::new();
    let mut inventory_groups: Vec<HashMap<String, String>> = Vec::new();
    let mut ledger_groups: Vec<(String, HashMap<String, String>)> = Vec::new();
    let mut bill_alloc_groups: Vec<HashMap<String, String>> = Vec::new();

    let mut depth: i32 = 0;
    let mut pending_group: Option<(String, HashMap<String, String>)> = None;
    let mut open_scalar: Option<String> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(tag) => {
                let name = local_name(&tag);
                depth += 1;
                if pending_group.is_none() && is_group_tag(&name) {
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
                if name == "VOUCHER" && depth == 0 {
                    return build_voucher(scalars, inventory_groups, ledger_groups, bill_alloc_groups);
                }
                if let Some((group_name, mut fields)) = pending_group.take() {
                    if name == group_name {
                        match group_name.as_str() {
                            INVENTORY_GROUP => inventory_groups.push(fields),
                            LEDGER_GROUP_INVOICE_LIKE | LEDGER_GROUP_OTHER => {
                                ledger_groups.push((group_name, fields))
                            }
                            BILL_ALLOCATION_GROUP => bill_alloc_groups.push(fields),
                            _ => {}
                        }
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
                return Err(VoucherParseError::MissingField("unterminated VOUCHER element".into()));
            }
            _ => {}
        }
    }
}

fn is_group_tag(name: &str) -> bool {
    matches!(
        name,
        INVENTORY_GROUP | LEDGER_GROUP_INVOICE_LIKE | LEDGER_GROUP_OTHER | BILL_ALLOCATION_GROUP
    )
}

fn build_voucher(
    scalars: HashMap<String, String>,
    inventory_groups: Vec<HashMap<String, String>>,
    ledger_groups: Vec<(String, HashMap<String, String>)>,
    bill_alloc_groups: Vec<HashMap<String, String>>,
) -> Result<Voucher, VoucherParseError> {
    let voucher_type = scalars.get("VCHTYPE").cloned().unwrap_or_default();
    let voucher_number = scalars.get("VCHNUMBER").cloned().unwrap_or_default();

    let guid_raw = scalars.get("GUID").cloned().unwrap_or_default();
    let remote_id = scalars.get("REMOTEID").cloned().unwrap_or_default();
    let guid = if guid_raw.trim().is_empty() { remote_id } else { guid_raw };

    let date = scalars
        .get("DATE")
        .map(|raw| parse_tally_date(raw))
        .unwrap_or_else(today_fallback);

    let party = scalars.get("PARTYLEDGERNAME").cloned().unwrap_or_default().trim().to_string();

    let party_gstin = first_non_empty(&scalars, &["PARTYGSTIN", "BASICBUYERPARTYGSTIN"]);
    let party_pincode = first_non_empty(&scalars, &["PARTYPINCODE", "BASICBUYERPINCODE"]);
    let party_city = first_non_empty(&scalars, &["PARTYCITY", "BASICBUYERSTATE"]);

    let inventory_entries: Vec<InventoryEntry> = inventory_groups
        .iter()
        .map(|fields| InventoryEntry {
            stock_item_name: fields.get("STOCKITEMNAME").cloned().unwrap_or_default(),
            billed_qty: fields.get("BILLEDQTY").cloned().unwrap_or_default(),
            rate: fields.get("RATE").cloned().unwrap_or_default(),
            amount_minor: parse_amount_minor(fields.get("AMOUNT").map(String::as_str).unwrap_or("")),
            discount: fields.get("DISCOUNT").cloned().unwrap_or_default(),
        })
        .collect();

    let bill_allocations: Vec<BillAllocation> = bill_alloc_groups
        .iter()
        .map(|fields| BillAllocation {
            ref_name: fields.get("NAME").cloned().unwrap_or_default(),
            amount_minor: parse_amount_minor(fields.get("AMOUNT").map(String::as_str).unwrap_or("")),
            bill_type: BillType::parse(fields.get("BILLTYPE").map(String::as_str).unwrap_or("")),
            credit_period_days: fields
                .get("BILLCREDITPERIOD")
                .and_then(|raw| raw.trim().split_whitespace().next())
                .and_then(|raw| raw.parse::<i64>().ok()),
        })
        .collect();

    let amt_inventory = if inventory_entries.is_empty() {
        None
    } else {
        Some(inventory_entries.iter().map(|e| e.amount_minor).sum::<i64>())
    };

    let amt_ledger = resolve_party_ledger_amount(&voucher_type, &party, &ledger_groups);

    let amt_bill_alloc = if bill_allocations.is_empty() {
        None
    } else {
        Some(bill_allocations.iter().map(|b| b.amount_minor).sum::<i64>())
    };

    let header_amount_minor = parse_amount_minor(scalars.get("AMOUNT").map(String::as_str).unwrap_or(""));

    let (mut subtotal_minor, mut total_minor, amount_resolution_case) =
        resolve_amounts(amt_inventory, amt_ledger, amt_bill_alloc, header_amount_minor);

    if amount_resolution_case == AmountResolutionCase::E {
        tracing::warn!(
            voucher_type = %voucher_type,
            voucher_number = %voucher_number,
            "amount resolution fell back to header AMOUNT (case E); no inventory, ledger, or bill-allocation amount found"
        );
    }

    let is_tax_bearing = TAX_BEARING_TYPES.contains(&voucher_type.trim().to_lowercase().as_str());

    let lower_type = voucher_type.trim().to_lowercase();
    if matches!(lower_type.as_str(), "credit note" | "sales return")
        && (subtotal_minor > 0 || total_minor > 0)
    {
        subtotal_minor = -subtotal_minor;
        total_minor = -total_minor;
    }

    if !is_tax_bearing {
        subtotal_minor = total_minor;
    }

    let tax_minor = total_minor - subtotal_minor;
    let roundoff_minor = 0;

    let mut voucher = Voucher {
        voucher_type,
        voucher_number,
        guid,
        date,
        party,
        party_gstin,
        party_pincode,
        party_city,
        subtotal_minor,
        total_minor,
        tax_minor,
        roundoff_minor,
        inventory_entries,
        bill_allocations,
        amount_resolution_case,
        voucher_key: String::new(),
    };
    voucher.voucher_key = derive_voucher_key(&voucher);
    Ok(voucher)
}

fn first_non_empty(scalars: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        scalars.get(*key).and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    })
}

/// Picks the party's ledger-entry amount, searching `LEDGERENTRIES.LIST`
/// for tax-bearing voucher types and `ALLLEDGERENTRIES.LIST` otherwise.
/// Matches `LEDGERNAME` case-insensitively, falling back to a 15-char
/// prefix match when no exact match is found.
fn resolve_party_ledger_amount(
    voucher_type: &str,
    party: &str,
    ledger_groups: &[(String, HashMap<String, String>)],
) -> Option<i64> {
    let is_tax_bearing = TAX_BEARING_TYPES.contains(&voucher_type.trim().to_lowercase().as_str());
    let expected_group = if is_tax_bearing {
        LEDGER_GROUP_INVOICE_LIKE
    } else {
        LEDGER_GROUP_OTHER
    };

    let candidates: Vec<&HashMap<String, String>> = ledger_groups
        .iter()
        .filter(|(group, _)| group == expected_group)
        .map(|(_, fields)| fields)
        .collect();

    let party_lower = party.trim().to_lowercase();
    let party_prefix: String = party_lower.chars().take(15).collect();

    candidates
        .iter()
        .find(|fields| {
            fields
                .get("LEDGERNAME")
                .map(|name| name.trim().to_lowercase() == party_lower)
                .unwrap_or(false)
        })
        .or_else(|| {
            candidates.iter().find(|fields| {
                fields
                    .get("LEDGERNAME")
                    .map(|name| {
                        let name_lower = name.trim().to_lowercase();
                        let name_prefix: String = name_lower.chars().take(15).collect();
                        name_prefix == party_prefix
                    })
                    .unwrap_or(false)
            })
        })
        .map(|fields| parse_amount_minor(fields.get("AMOUNT").map(String::as_str).unwrap_or("")))
}

fn resolve_amounts(
    amt_inventory: Option<i64>,
    amt_ledger: Option<i64>,
    amt_bill_alloc: Option<i64>,
    header_amount_minor: i64,
) -> (i64, i64, AmountResolutionCase) {
    match (amt_inventory, amt_ledger, amt_bill_alloc) {
        (Some(inventory), ledger, bill_alloc) if ledger.is_some() || bill_alloc.is_some() => {
            let total = ledger.map(i64::abs).unwrap_or_else(|| bill_alloc.unwrap_or_default());
            (inventory, total, AmountResolutionCase::A)
        }
        (None, Some(ledger), None) => (ledger.abs(), ledger.abs(), AmountResolutionCase::B),
        (None, None, Some(bill_alloc)) => (bill_alloc, bill_alloc, AmountResolutionCase::C),
        (Some(inventory), None, None) => (inventory, inventory, AmountResolutionCase::D),
        _ => (header_amount_minor, header_amount_minor, AmountResolutionCase::E),
    }
}

/// GUID, then promoted-RemoteID (already merged into `guid` by the caller),
/// then `vchtype/vchnumber/date/party` when a voucher number exists, then a
/// truncated SHA-256 hash of `vchtype|date|party|total` as last resort.
/// This ordering MUST be preserved: collapsing it would merge distinct
/// vouchers that share a date and party but differ only by `REMOTEID`.
fn derive_voucher_key(voucher: &Voucher) -> String {
    if !voucher.guid.trim().is_empty() {
        return voucher.guid.clone();
    }
    if !voucher.voucher_number.trim().is_empty() {
        return format!(
            "{}/{}/{}/{}",
            voucher.voucher_type,
            voucher.voucher_number,
            voucher.date.format("%Y-%m-%d"),
            voucher.party
        );
    }
    let hash_input = format!(
        "{}|{}|{}|{}",
        voucher.voucher_type,
        voucher.date.format("%Y-%m-%d"),
        voucher.party,
        voucher.total_minor
    );
    let digest = Sha256::digest(hash_input.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!(
        "{}/{}/{}#{}",
        voucher.voucher_type,
        voucher.date.format("%Y-%m-%d"),
        voucher.party,
        &hex[..16]
    )
}

fn parse_tally_date(raw: &str) -> NaiveDate {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%d-%b-%Y"))
        .unwrap_or_else(|_| {
            tracing::warn!(raw, "unparseable voucher date, substituting today");
            today_fallback()
        })
}

fn today_fallback() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Strips thousands separators, treats `(x)` as negative, and returns
/// hundredths (minor units). Non-parsable input becomes `0`.
pub fn parse_amount_minor(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let negative_paren = trimmed.starts_with('(') && trimmed.ends_with(')');
    let inner = if negative_paren {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("invalid test date {y}-{m}-{d}"))
    }

    #[test]
    fn parse_amount_minor_handles_thousands_and_parens() {
        assert_eq!(parse_amount_minor("118,000.00"), 11_800_000);
        assert_eq!(parse_amount_minor("(1,180.00)"), -118_000);
        assert_eq!(parse_amount_minor("-92700.00"), -9_270_000);
        assert_eq!(parse_amount_minor(""), 0);
        assert_eq!(parse_amount_minor("garbage"), 0);
    }

    // Sales invoice with inventory + bill allocation + party ledger entry.
    #[test]
    fn sales_invoice_with_inventory_and_bill_allocation_resolves_case_a() {
        let xml = r#"
            <ENVELOPE><BODY><VOUCHER>
                <VCHTYPE>Sales</VCHTYPE>
                <VCHNUMBER>S-101</VCHNUMBER>
                <GUID>abcd-1234</GUID>
                <DATE>20251011</DATE>
                <PARTYLEDGERNAME>Acme Distributors</PARTYLEDGERNAME>
                <ALLINVENTORYENTRIES.LIST>
                    <STOCKITEMNAME>Widget</STOCKITEMNAME>
                    <BILLEDQTY>2 Nos</BILLEDQTY>
                    <RATE>50000 / Nos</RATE>
                    <AMOUNT>100000.00</AMOUNT>
                    <DISCOUNT></DISCOUNT>
                </ALLINVENTORYENTRIES.LIST>
                <BILLALLOCATIONS.LIST>
                    <NAME>BILL-1</NAME>
                    <AMOUNT>-118000.00</AMOUNT>
                    <BILLTYPE>New Ref</BILLTYPE>
                    <BILLCREDITPERIOD></BILLCREDITPERIOD>
                </BILLALLOCATIONS.LIST>
                <LEDGERENTRIES.LIST>
                    <LEDGERNAME>Acme Distributors</LEDGERNAME>
                    <AMOUNT>118000.00</AMOUNT>
                </LEDGERENTRIES.LIST>
            </VOUCHER></BODY></ENVELOPE>
        "#;

        let vouchers: Vec<Voucher> = parse_vouchers(xml).collect::<Result<_, _>>().expect("parse ok");
        assert_eq!(vouchers.len(), 1);
        let voucher = &vouchers[0];
        assert_eq!(voucher.subtotal_minor, 10_000_000);
        assert_eq!(voucher.total_minor, 11_800_000);
        assert_eq!(voucher.tax_minor, 1_800_000);
        assert_eq!(voucher.amount_resolution_case, AmountResolutionCase::A);
        assert_eq!(voucher.date, date(2025, 10, 11));
        assert_eq!(voucher.voucher_key, "abcd-1234");
    }

    // Credit note with positive source values gets sign-normalized.
    #[test]
    fn credit_note_with_positive_values_is_sign_normalized() {
        let xml = r#"
            <ENVELOPE><BODY><VOUCHER>
                <VCHTYPE>Credit Note</VCHTYPE>
                <VCHNUMBER>CN-1</VCHNUMBER>
                <GUID>cn-guid</GUID>
                <DATE>2025-10-11</DATE>
                <PARTYLEDGERNAME>Acme Distributors</PARTYLEDGERNAME>
                <ALLINVENTORYENTRIES.LIST>
                    <STOCKITEMNAME>Widget</STOCKITEMNAME>
                    <BILLEDQTY>1 Nos</BILLEDQTY>
                    <RATE>1000 / Nos</RATE>
                    <AMOUNT>1000.00</AMOUNT>
                    <DISCOUNT></DISCOUNT>
                </ALLINVENTORYENTRIES.LIST>
                <LEDGERENTRIES.LIST>
                    <LEDGERNAME>Acme Distributors</LEDGERNAME>
                    <AMOUNT>1180.00</AMOUNT>
                </LEDGERENTRIES.LIST>
            </VOUCHER></BODY></ENVELOPE>
        "#;

        let voucher = parse_vouchers(xml)
            .next()
            .expect("one voucher")
            .expect("parse ok");
        assert_eq!(voucher.subtotal_minor, -100_000);
        assert_eq!(voucher.total_minor, -118_000);
        assert_eq!(voucher.tax_minor, -18_000);
    }

    // Invoice missing bill allocation, falls back to Case A via ledger amount.
    #[test]
    fn invoice_missing_bill_allocation_uses_ledger_amount() {
        let xml = r#"
            <ENVELOPE><BODY><VOUCHER>
                <VCHTYPE>Sales</VCHTYPE>
                <VCHNUMBER>S-200</VCHNUMBER>
                <GUID>s200-guid</GUID>
                <DATE>20251011</DATE>
                <PARTYLEDGERNAME>Bravo Traders</PARTYLEDGERNAME>
                <ALLINVENTORYENTRIES.LIST>
                    <STOCKITEMNAME>Gadget</STOCKITEMNAME>
                    <BILLEDQTY>1 Nos</BILLEDQTY>
                    <RATE>78559.29 / Nos</RATE>
                    <AMOUNT>78559.29</AMOUNT>
                    <DISCOUNT></DISCOUNT>
                </ALLINVENTORYENTRIES.LIST>
                <LEDGERENTRIES.LIST>
                    <LEDGERNAME>Bravo Traders</LEDGERNAME>
                    <AMOUNT>-92700.00</AMOUNT>
                </LEDGERENTRIES.LIST>
            </VOUCHER></BODY></ENVELOPE>
        "#;

        let voucher = parse_vouchers(xml)
            .next()
            .expect("one voucher")
            .expect("parse ok");
        assert_eq!(voucher.subtotal_minor, 7_855_929);
        assert_eq!(voucher.total_minor, 9_270_000);
        assert_eq!(voucher.tax_minor, 1_414_071);
    }

    // Two vouchers, same date/party, no GUID, no VCHNUMBER, distinct REMOTEID.
    #[test]
    fn remote_id_promotion_keeps_vouchers_distinct() {
        let xml = r#"
            <ENVELOPE><BODY>
            <VOUCHER>
                <VCHTYPE>Journal</VCHTYPE>
                <REMOTEID>remote-a</REMOTEID>
                <DATE>20251011</DATE>
                <PARTYLEDGERNAME>Shared Party</PARTYLEDGERNAME>
            </VOUCHER>
            <VOUCHER>
                <VCHTYPE>Journal</VCHTYPE>
                <REMOTEID>remote-b</REMOTEID>
                <DATE>20251011</DATE>
                <PARTYLEDGERNAME>Shared Party</PARTYLEDGERNAME>
            </VOUCHER>
            </BODY></ENVELOPE>
        "#;

        let vouchers: Vec<Voucher> = parse_vouchers(xml).collect::<Result<_, _>>().expect("parse ok");
        assert_eq!(vouchers.len(), 2);
        assert_eq!(vouchers[0].voucher_key, "remote-a");
        assert_eq!(vouchers[1].voucher_key, "remote-b");
        assert_ne!(vouchers[0].voucher_key, vouchers[1].voucher_key);
    }

    #[test]
    fn non_tax_bearing_voucher_forces_zero_tax() {
        let xml = r#"
            <ENVELOPE><BODY><VOUCHER>
                <VCHTYPE>Payment</VCHTYPE>
                <VCHNUMBER>P-1</VCHNUMBER>
                <GUID>p1-guid</GUID>
                <DATE>20251011</DATE>
                <PARTYLEDGERNAME>Acme Distributors</PARTYLEDGERNAME>
                <ALLLEDGERENTRIES.LIST>
                    <LEDGERNAME>Acme Distributors</LEDGERNAME>
                    <AMOUNT>-5000.00</AMOUNT>
                </ALLLEDGERENTRIES.LIST>
            </VOUCHER></BODY></ENVELOPE>
        "#;

        let voucher = parse_vouchers(xml)
            .next()
            .expect("one voucher")
            .expect("parse ok");
        assert_eq!(voucher.tax_minor, 0);
        assert_eq!(voucher.subtotal_minor, voucher.total_minor);
    }

    #[test]
    fn missing_key_fields_fall_back_to_hash_key() {
        let xml = r#"
            <ENVELOPE><BODY><VOUCHER>
                <VCHTYPE>Journal</VCHTYPE>
                <DATE>20251011</DATE>
                <PARTYLEDGERNAME>No Identity Party</PARTYLEDGERNAME>
            </VOUCHER></BODY></ENVELOPE>
        "#;

        let voucher = parse_vouchers(xml)
            .next()
            .expect("one voucher")
            .expect("parse ok");
        assert!(voucher.voucher_key.starts_with("Journal/2025-10-11/No Identity Party#"));
        assert_eq!(voucher.voucher_key.len(), "Journal/2025-10-11/No Identity Party#".len() + 16);
    }

    #[test]
    fn unparseable_date_falls_back_to_today() {
        let xml = r#"
            <ENVELOPE><BODY><VOUCHER>
                <VCHTYPE>Journal</VCHTYPE>
                <DATE>not-a-date</DATE>
                <PARTYLEDGERNAME>Whoever</PARTYLEDGERNAME>
            </VOUCHER></BODY></ENVELOPE>
        "#;

        let voucher = parse_vouchers(xml)
            .next()
            .expect("one voucher")
            .expect("parse ok");
        assert_eq!(voucher.date, today_fallback());
    }
}
