pub mod domain;
pub mod error;
pub mod field;
pub mod form;
pub mod institution;
pub mod protocol;
pub mod request;
pub mod schema;
pub mod scoring;
