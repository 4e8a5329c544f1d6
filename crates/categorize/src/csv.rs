use chrono::NaiveDate;
use saim_core::{BankTransaction, Contact, ContactType, Direction, Money};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvColumnMapping {
    pub date_column: Option<usize>,
    pub description_column: Option<usize>,
    /// Single signed amount; negative values are debits.
    pub amount_column: Option<usize>,
    pub debit_column: Option<usize>,
    pub credit_column: Option<usize>,
    pub contact_column: Option<usize>,
    pub category_column: Option<usize>,
    pub date_format: String,
}

impl Default for CsvColumnMapping {
    fn default() -> Self {
        Self {
            date_column: None,
            description_column: None,
            amount_column: None,
            debit_column: None,
            credit_column: None,
            contact_column: None,
            category_column: None,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

impl CsvColumnMapping {
    fn is_unset(&self) -> bool {
        self.date_column.is_none()
            && self.description_column.is_none()
            && self.amount_column.is_none()
            && self.debit_column.is_none()
            && self.credit_column.is_none()
    }

    /// Guesses columns from a header row. Unrecognised headers are ignored.
    pub fn detect(headers: &csv::StringRecord) -> Self {
        let mut mapping = CsvColumnMapping::default();
        for (idx, header) in headers.iter().enumerate() {
            let h = header.trim().to_lowercase();
            let slot = match h.as_str() {
                "date" | "transaction date" | "posted" | "posting date" | "value date" => {
                    &mut mapping.date_column
                }
                "description" | "details" | "narrative" | "memo" | "particulars" => {
                    &mut mapping.description_column
                }
                "amount" | "value" => &mut mapping.amount_column,
                "debit" | "withdrawal" | "withdrawals" | "money out" => &mut mapping.debit_column,
                "credit" | "deposit" | "deposits" | "money in" => &mut mapping.credit_column,
                "contact" | "payee" | "counterparty" | "merchant" => &mut mapping.contact_column,
                "category" | "merchant category" | "merchant_category" => {
                    &mut mapping.category_column
                }
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(idx);
            }
        }
        mapping
    }
}

/// How to read one bank's statement export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementProfile {
    pub name: String,
    pub mapping: CsvColumnMapping,
    pub has_header: bool,
    pub delimiter: String,
}

impl Default for StatementProfile {
    fn default() -> Self {
        Self {
            name: "Detected from header".to_string(),
            mapping: CsvColumnMapping::default(),
            has_header: true,
            delimiter: ",".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Row {row}: invalid date '{value}'")]
    InvalidDate { row: usize, value: String },
    #[error("Row {row}: invalid amount '{value}'")]
    InvalidAmount { row: usize, value: String },
    #[error("No data rows")]
    NoDataRows,
}

fn parse_date(s: &str, format: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, format)
        .ok()
        .or_else(|| saim_core::parse_date(s))
}

fn parse_amount(s: &str) -> Option<Money> {
    Money::from_str(s).ok()
}

fn field(record: &csv::StringRecord, col: Option<usize>) -> Option<&str> {
    col.and_then(|c| record.get(c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn reader_for<R: Read>(data: R, profile: &StatementProfile) -> csv::Reader<R> {
    let delimiter = profile
        .delimiter
        .as_bytes()
        .first()
        .copied()
        .unwrap_or(b',');
    csv::ReaderBuilder::new()
        .has_headers(profile.has_header)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data)
}

/// Reads a bank statement into transactions with ids `tx_1`, `tx_2`, ...
/// An unset mapping is detected from the header row.
pub fn import_statement<R: Read>(
    data: R,
    profile: &StatementProfile,
) -> Result<Vec<BankTransaction>, ImportError> {
    let mut reader = reader_for(data, profile);

    let mapping = if profile.mapping.is_unset() && profile.has_header {
        let detected = CsvColumnMapping::detect(reader.headers()?);
        CsvColumnMapping {
            date_format: profile.mapping.date_format.clone(),
            ..detected
        }
    } else {
        profile.mapping.clone()
    };

    if mapping.date_column.is_none() {
        return Err(ImportError::MissingColumn("date".into()));
    }
    if mapping.description_column.is_none() {
        return Err(ImportError::MissingColumn("description".into()));
    }
    let split_columns = mapping.debit_column.is_some() || mapping.credit_column.is_some();
    if mapping.amount_column.is_none() && !split_columns {
        return Err(ImportError::MissingColumn("amount or debit/credit".into()));
    }

    let mut transactions = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = idx + 1;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let raw_date = field(&record, mapping.date_column).unwrap_or_default();
        let date =
            parse_date(raw_date, &mapping.date_format).ok_or_else(|| ImportError::InvalidDate {
                row,
                value: raw_date.to_string(),
            })?;

        let description = field(&record, mapping.description_column).unwrap_or_default();
        let amount_of = |raw: &str| {
            parse_amount(raw).ok_or_else(|| ImportError::InvalidAmount {
                row,
                value: raw.to_string(),
            })
        };

        let id = format!("tx_{}", transactions.len() + 1);
        let mut tx = if let Some(raw) = field(&record, mapping.amount_column) {
            BankTransaction::from_signed(id, date, description, amount_of(raw)?)
        } else {
            let debit = field(&record, mapping.debit_column).map(amount_of).transpose()?;
            let credit = field(&record, mapping.credit_column).map(amount_of).transpose()?;
            match (debit, credit) {
                (Some(d), _) if !d.is_zero() => {
                    BankTransaction::new(id, date, description, d, Direction::Debit)
                }
                (_, Some(c)) => BankTransaction::new(id, date, description, c, Direction::Credit),
                (Some(d), None) => BankTransaction::new(id, date, description, d, Direction::Debit),
                (None, None) => {
                    debug!(row, "skipping statement row without an amount");
                    continue;
                }
            }
        };

        tx.contact = field(&record, mapping.contact_column).map(str::to_string);
        tx.merchant_category = field(&record, mapping.category_column).map(str::to_string);
        transactions.push(tx);
    }

    if transactions.is_empty() {
        return Err(ImportError::NoDataRows);
    }
    debug!(count = transactions.len(), "statement parsed");
    Ok(transactions)
}

/// Reads a contacts list with a `name,type,email,phone[,address]` header.
/// Unknown contact types become `Other`.
pub fn import_contacts<R: Read>(data: R) -> Result<Vec<Contact>, ImportError> {
    let mut reader = reader_for(data, &StatementProfile::default());

    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
    };
    let name_col = column(&["name", "contact", "contact name"])
        .ok_or_else(|| ImportError::MissingColumn("name".into()))?;
    let type_col = column(&["type", "contact type", "contact_type"]);
    let email_col = column(&["email", "e-mail"]);
    let phone_col = column(&["phone", "telephone", "mobile"]);
    let address_col = column(&["address"]);

    let mut contacts = Vec::new();
    for result in reader.records() {
        let record = result?;
        let Some(name) = field(&record, Some(name_col)) else {
            continue;
        };
        let contact_type = field(&record, type_col)
            .and_then(|t| ContactType::from_str(t).ok())
            .unwrap_or(ContactType::Other);
        let mut contact = Contact::new(name, contact_type);
        contact.email = field(&record, email_col).map(str::to_string);
        contact.phone = field(&record, phone_col).map(str::to_string);
        contact.address = field(&record, address_col).map(str::to_string);
        contacts.push(contact);
    }

    if contacts.is_empty() {
        return Err(ImportError::NoDataRows);
    }
    Ok(contacts)
}
