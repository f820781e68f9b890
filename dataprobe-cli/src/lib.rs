//! DataProbe command-line front end and mock analysis service

pub mod cli;
pub mod mock_server;
