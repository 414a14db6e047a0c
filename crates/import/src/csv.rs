use thiserror::Error;

use mietwerk_core::BankTransaction;

use crate::formats::{column_map, detect_delimiter, detect_format, BankFormat, ColumnMap};
use crate::normalize::{parse_amount_checked, parse_date, DATE_FORMATS};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("unrecognized statement layout")]
    UnknownFormat,
}

/// Why a single row was dropped. Rows fail individually; the import as a
/// whole continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("unparseable amount '{0}'")]
    Amount(String),
    #[error("unparseable booking date '{0}'")]
    Date(String),
    #[error("expected at least {expected} fields, got {got}")]
    Fields { expected: usize, got: usize },
}

#[derive(Debug, Clone)]
pub struct RowSkip {
    /// 1-based line number in the source file.
    pub line: usize,
    pub error: RowError,
}

/// Outcome of a best-effort statement parse: what survived, and exactly
/// which rows were dropped and why.
#[derive(Debug)]
pub struct ImportReport {
    pub format: BankFormat,
    pub parsed: Vec<BankTransaction>,
    pub skipped: Vec<RowSkip>,
}

/// Splits one CSV line on `delimiter`, honoring double-quoted fields with
/// embedded delimiters and `""` escapes.
pub fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn field<'a>(fields: &'a [String], index: Option<usize>) -> &'a str {
    index
        .and_then(|i| fields.get(i))
        .map(|s| s.trim())
        .unwrap_or_default()
}

fn map_row(
    fields: &[String],
    map: &ColumnMap,
    account_iban: &str,
) -> Result<BankTransaction, RowError> {
    if fields.len() < map.min_fields {
        return Err(RowError::Fields {
            expected: map.min_fields,
            got: fields.len(),
        });
    }

    let raw_amount = field(fields, Some(map.amount));
    let amount =
        parse_amount_checked(raw_amount).ok_or_else(|| RowError::Amount(raw_amount.to_string()))?;

    let raw_date = field(fields, Some(map.booking_date));
    let booking_date =
        parse_date(raw_date, DATE_FORMATS).ok_or_else(|| RowError::Date(raw_date.to_string()))?;

    // A missing or malformed value date is not worth dropping the row over.
    let value_date = map
        .value_date
        .and_then(|i| fields.get(i))
        .and_then(|s| parse_date(s, DATE_FORMATS));

    Ok(BankTransaction {
        id: None,
        account_iban: account_iban.to_string(),
        booking_date,
        value_date,
        amount,
        description: field(fields, map.description).to_string(),
        counterparty: field(fields, map.counterparty).to_string(),
        reference: field(fields, map.reference).to_string(),
        matched: false,
        matched_payment_id: None,
    })
}

/// Detects the layout and parses every data row, best-effort per line.
/// Only an unrecognizable layout is fatal.
pub fn parse_statement(text: &str, account_iban: &str) -> Result<ImportReport, ImportError> {
    let format = detect_format(text);
    let map = column_map(format).ok_or(ImportError::UnknownFormat)?;

    let mut parsed = Vec::new();
    let mut skipped = Vec::new();
    let mut data_rows_seen = 0usize;

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        data_rows_seen += 1;
        if data_rows_seen <= map.header_lines {
            continue;
        }

        let fields = split_line(line, detect_delimiter(line));
        match map_row(&fields, map, account_iban) {
            Ok(tx) => parsed.push(tx),
            Err(error) => skipped.push(RowSkip {
                line: idx + 1,
                error,
            }),
        }
    }

    Ok(ImportReport {
        format,
        parsed,
        skipped,
    })
}

/// Filters `batch` down to transactions not already present in `existing`
/// (same account's stored rows). Returns the survivors and the number of
/// suppressed duplicates. Duplicates within the batch itself are also
/// suppressed, so importing a file twice in one call stays idempotent.
pub fn dedupe(
    batch: Vec<BankTransaction>,
    existing: &[BankTransaction],
) -> (Vec<BankTransaction>, usize) {
    let mut fresh: Vec<BankTransaction> = Vec::with_capacity(batch.len());
    let mut duplicates = 0usize;

    for tx in batch {
        if existing.iter().chain(fresh.iter()).any(|e| tx.is_duplicate_of(e)) {
            duplicates += 1;
        } else {
            fresh.push(tx);
        }
    }

    (fresh, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mietwerk_core::Money;

    const IBAN: &str = "DE02120300000000202051";

    const SPARKASSE_HEADER: &str = "Auftragskonto;Buchungstag;Valutadatum;Buchungstext;Verwendungszweck;Glaeubiger ID;Mandatsreferenz;Kundenreferenz;Sammlerreferenz;Lastschrift Ursprungsbetrag;Auslagenersatz Ruecklastschrift;Beguenstigter/Zahlungspflichtiger;IBAN;BIC;Betrag;Waehrung;Info";

    fn sparkasse_row(date: &str, reference: &str, amount: &str) -> String {
        format!(
            "DE02120300000000202051;{date};{date};GUTSCHR. UEBERWEISUNG;{reference};;;;;;;Max Mustermann;DE12500105170648489890;INGDDEFF;{amount};EUR;Umsatz gebucht"
        )
    }

    #[test]
    fn sparkasse_statement_parses() {
        let csv = format!(
            "{SPARKASSE_HEADER}\n{}\n{}\n",
            sparkasse_row("01.03.2024", "Miete März Wohnung 2", "750,00"),
            sparkasse_row("05.03.2024", "Nebenkosten", "-120,50"),
        );
        let report = parse_statement(&csv, IBAN).unwrap();
        assert_eq!(report.format, BankFormat::Sparkasse);
        assert_eq!(report.parsed.len(), 2);
        assert!(report.skipped.is_empty());

        let first = &report.parsed[0];
        assert_eq!(
            first.booking_date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(first.amount, Money::from_cents(75000));
        assert_eq!(first.counterparty, "Max Mustermann");
        assert_eq!(first.reference, "Miete März Wohnung 2");
        assert!(!first.matched);
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let csv = format!(
            "{SPARKASSE_HEADER}\n{}\n{}\n{}\n",
            sparkasse_row("01.03.2024", "Miete März", "750,00"),
            sparkasse_row("irgendwann", "kaputt", "750,00"),
            sparkasse_row("05.03.2024", "kaputt", "viel"),
        );
        let report = parse_statement(&csv, IBAN).unwrap();
        assert_eq!(report.parsed.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(report.skipped[0].error, RowError::Date(_)));
        assert_eq!(report.skipped[0].line, 3);
        assert!(matches!(report.skipped[1].error, RowError::Amount(_)));
    }

    #[test]
    fn generic_csv_with_quoted_delimiter() {
        let csv = "Datum,Text,Zweck,Betrag\n2024-03-01,\"Miete, Wohnung 2\",MIETE 202403,750.00\n";
        let report = parse_statement(csv, IBAN).unwrap();
        assert_eq!(report.format, BankFormat::Generic);
        assert_eq!(report.parsed.len(), 1);
        assert_eq!(report.parsed[0].description, "Miete, Wohnung 2");
        assert_eq!(report.parsed[0].reference, "MIETE 202403");
    }

    #[test]
    fn unknown_layout_fails_whole_parse() {
        let result = parse_statement("Datum,Betrag\n01.03.2024,750\n", IBAN);
        assert!(matches!(result, Err(ImportError::UnknownFormat)));
    }

    #[test]
    fn split_line_quote_state() {
        assert_eq!(split_line("a;b;c", ';'), vec!["a", "b", "c"]);
        assert_eq!(split_line("a;\"b;x\";c", ';'), vec!["a", "b;x", "c"]);
        assert_eq!(split_line("\"sagt \"\"hi\"\"\";b", ';'), vec!["sagt \"hi\"", "b"]);
        assert_eq!(split_line("a;;c", ';'), vec!["a", "", "c"]);
        assert_eq!(split_line("", ';'), vec![""]);
    }

    #[test]
    fn reimport_is_fully_suppressed() {
        let csv = format!(
            "{SPARKASSE_HEADER}\n{}\n{}\n",
            sparkasse_row("01.03.2024", "Miete März", "750,00"),
            sparkasse_row("05.03.2024", "Nebenkosten", "-120,50"),
        );
        let first = parse_statement(&csv, IBAN).unwrap().parsed;
        let second = parse_statement(&csv, IBAN).unwrap().parsed;

        let (kept, dropped) = dedupe(second, &first);
        assert!(kept.is_empty());
        assert_eq!(dropped, 2);
    }

    #[test]
    fn dedupe_keeps_distinct_rows() {
        let csv = format!(
            "{SPARKASSE_HEADER}\n{}\n{}\n",
            sparkasse_row("01.03.2024", "Miete März", "750,00"),
            sparkasse_row("01.04.2024", "Miete April", "750,00"),
        );
        let parsed = parse_statement(&csv, IBAN).unwrap().parsed;
        let existing = vec![parsed[0].clone()];

        let (kept, dropped) = dedupe(parsed, &existing);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].reference, "Miete April");
        assert_eq!(dropped, 1);
    }
}
