use serde::{Serialize, Deserialize};

use crate::contacts::NodeId;

#[derive(Debug, Serialize, Deserialize)]
pub enum Error {
    InvalidInputPath(String),
    InvalidInputFile(String),
    InputReadFailure,
    InvalidJson(JsonError),
    InvalidContactRecord { line: usize, reason: String },
    InvalidParameter { name: String, reason: String },
    UnknownSeed(NodeId),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonError {
    pub description: String,
    pub category: String,
    pub line: usize,
    pub column: usize,
}
