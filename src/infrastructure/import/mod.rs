pub mod csv_import;

pub use csv_import::{import_jobs_csv, ImportSummary};
