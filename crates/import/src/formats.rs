use std::fmt;

/// The statement layouts this importer recognizes. `Generic` covers any
/// delimiter-separated export with at least four columns in a fixed
/// date/description/reference/amount order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankFormat {
    Sparkasse,
    Ing,
    Dkb,
    Generic,
    Unknown,
}

impl BankFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            BankFormat::Sparkasse => "Sparkasse",
            BankFormat::Ing => "ING",
            BankFormat::Dkb => "DKB",
            BankFormat::Generic => "Generic CSV",
            BankFormat::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BankFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column positions for one statement layout. This is configuration, not
/// logic: one tokenizer and one row mapper consume every entry here.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMap {
    /// Header (and preamble) lines to skip before data rows.
    pub header_lines: usize,
    pub min_fields: usize,
    pub booking_date: usize,
    pub value_date: Option<usize>,
    pub amount: usize,
    pub counterparty: Option<usize>,
    pub description: Option<usize>,
    pub reference: Option<usize>,
}

// Sparkasse CSV-CAMT: Auftragskonto;Buchungstag;Valutadatum;Buchungstext;
// Verwendungszweck;...;Beguenstigter/Zahlungspflichtiger;IBAN;BIC;Betrag;...
static SPARKASSE_COLUMNS: ColumnMap = ColumnMap {
    header_lines: 1,
    min_fields: 15,
    booking_date: 1,
    value_date: Some(2),
    amount: 14,
    counterparty: Some(11),
    description: Some(3),
    reference: Some(4),
};

// ING: Buchung;Valuta;Auftraggeber/Empfänger;Buchungstext;
// Verwendungszweck;Saldo;Währung;Betrag
static ING_COLUMNS: ColumnMap = ColumnMap {
    header_lines: 1,
    min_fields: 8,
    booking_date: 0,
    value_date: Some(1),
    amount: 7,
    counterparty: Some(2),
    description: Some(3),
    reference: Some(4),
};

// DKB ships a one-line account preamble before the real header:
// Buchungstag;Wertstellung;Buchungstext;Auftraggeber/Begünstigter;
// Verwendungszweck;Kontonummer;BLZ;Betrag (EUR);...
static DKB_COLUMNS: ColumnMap = ColumnMap {
    header_lines: 2,
    min_fields: 8,
    booking_date: 0,
    value_date: Some(1),
    amount: 7,
    counterparty: Some(3),
    description: Some(2),
    reference: Some(4),
};

static GENERIC_COLUMNS: ColumnMap = ColumnMap {
    header_lines: 1,
    min_fields: 4,
    booking_date: 0,
    value_date: None,
    amount: 3,
    counterparty: None,
    description: Some(1),
    reference: Some(2),
};

/// `None` only for `Unknown`, which fails the whole import.
pub fn column_map(format: BankFormat) -> Option<&'static ColumnMap> {
    match format {
        BankFormat::Sparkasse => Some(&SPARKASSE_COLUMNS),
        BankFormat::Ing => Some(&ING_COLUMNS),
        BankFormat::Dkb => Some(&DKB_COLUMNS),
        BankFormat::Generic => Some(&GENERIC_COLUMNS),
        BankFormat::Unknown => None,
    }
}

/// Per-line delimiter sniffing; semicolon wins ties since German exports
/// default to it.
pub fn detect_delimiter(line: &str) -> char {
    let semicolons = line.matches(';').count();
    let commas = line.matches(',').count();
    if commas > semicolons {
        ','
    } else {
        ';'
    }
}

/// Tags a statement by keyword co-occurrence in its (lowercased) header
/// line. DKB hides the header behind an account preamble, so that check
/// also inspects the second line.
pub fn detect_format(text: &str) -> BankFormat {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(first) = lines.next() else {
        return BankFormat::Unknown;
    };
    let header = first.to_lowercase();
    let second = lines.next().map(str::to_lowercase).unwrap_or_default();

    if header.contains("auftragskonto") && header.contains("buchungstag") {
        return BankFormat::Sparkasse;
    }
    if header.contains("valuta") && header.contains("auftraggeber") {
        return BankFormat::Ing;
    }
    if header.contains("kontonummer") && second.contains("buchungstag") {
        return BankFormat::Dkb;
    }

    let delimiter = detect_delimiter(first);
    if first.split(delimiter).count() >= GENERIC_COLUMNS.min_fields {
        return BankFormat::Generic;
    }
    BankFormat::Unknown
}
