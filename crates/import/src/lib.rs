pub mod csv;
pub mod formats;
pub mod normalize;

pub use csv::{dedupe, parse_statement, ImportError, ImportReport, RowError, RowSkip};
pub use formats::{column_map, detect_format, BankFormat, ColumnMap};
pub use normalize::{parse_amount, parse_date, DATE_FORMATS};
