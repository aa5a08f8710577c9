pub mod configuration;
pub mod connector;
pub mod csv_reader;

pub use configuration::{S3Configuration, SharedS3Configuration};
pub use connector::S3Connector;
pub use csv_reader::{CsvOptions, GetObjectOptions, ReadCsvOptions};
