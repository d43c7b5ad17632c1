//! CrudService: generic CRUD, validation, and CSV export over any registered model.

mod crud;
pub mod export;
pub mod validation;
pub use crud::{CrudService, CsvExport};
pub use export::ExportRequest;
pub use validation::DocumentValidator;
