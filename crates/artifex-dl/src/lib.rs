pub mod archive;
pub mod download;
pub mod error;
pub mod fetch;
pub mod http;
pub mod http_client;
pub mod observer;
pub mod oci;
pub mod progress;
pub mod registry;
pub mod scan;
pub mod staging;
pub mod uri;
pub mod utils;
