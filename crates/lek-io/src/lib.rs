//! File I/O, validation, and artifact serialization for the lek pipeline.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{CovariateTable, ExperimentName, ObservationTable, Response, ResponseData};
pub use error::IoError;
pub use reader::ObservationReader;
pub use writer::ResultWriter;
