use serde::{Deserialize, Serialize};

/// Credentials presented at sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub reg_no: String,
    pub password: String,
}
