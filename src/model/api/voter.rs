use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::common::Role;

/// A self-service registration application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub reg_no: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub hall: String,
    pub department: String,
    /// Request candidacy eligibility alongside the vote. Subject to the
    /// same commissioner verification as the vote itself.
    #[serde(default)]
    pub seeking_candidacy: bool,
}

impl RegistrationRequest {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("reg_no", &self.reg_no),
            ("name", &self.name),
            ("hall", &self.hall),
            ("department", &self.department),
        ] {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("{field} must not be empty")));
            }
        }
        if !self.email.contains('@') {
            return Err(Error::validation("email must be a valid address"));
        }
        if self.password.len() < 8 {
            return Err(Error::validation(
                "password must be at least 8 characters",
            ));
        }
        Ok(())
    }

    pub fn role(&self) -> Role {
        if self.seeking_candidacy {
            Role::CandidateEligible
        } else {
            Role::Voter
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            reg_no: "2019-11-5001".to_string(),
            email: "rahim@ju.example".to_string(),
            name: "Rahim Uddin".to_string(),
            password: "correct horse battery staple".to_string(),
            hall: "Alpha Hall".to_string(),
            department: "Computer Science".to_string(),
            seeking_candidacy: false,
        }
    }

    #[test]
    fn accepts_valid_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_blank_fields_and_short_passwords() {
        let mut bad = request();
        bad.hall = "   ".to_string();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.password = "short".to_string();
        assert!(bad.validate().is_err());

        let mut bad = request();
        bad.email = "not-an-address".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn candidacy_flag_selects_role() {
        assert_eq!(request().role(), Role::Voter);
        let mut contesting = request();
        contesting.seeking_candidacy = true;
        assert_eq!(contesting.role(), Role::CandidateEligible);
    }
}
