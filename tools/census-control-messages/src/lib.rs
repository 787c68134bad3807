//! Plain serde payloads for `census-node`'s local HTTP control surface,
//! shared between the node binary and the `census-control` CLI so neither
//! has to hand-decode the other's JSON shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub seed: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActionReply {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembersReply {
    pub members: Vec<String>,
}
