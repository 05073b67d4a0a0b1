//! OSW validation worker. Validates uploaded OpenSidewalks archives and
//! publishes a verdict for every upload event.

pub mod auth;
pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod staging;
pub mod storage;
pub mod validator;
pub mod worker;
