//! User identifiers: `<campus><role><4 digits>`, e.g. `dvls1234`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Campus;
use crate::error::Error;

/// Role encoded in a user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn code(self) -> char {
        match self {
            Role::Admin => 'a',
            Role::Student => 's',
        }
    }
}

/// A validated user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId {
    campus: Campus,
    role: Role,
    number: u16,
}

impl UserId {
    pub fn new(campus: Campus, role: Role, number: u16) -> Result<Self, Error> {
        if number > 9999 {
            return Err(Error::InvalidArgument(format!(
                "Identifier number {} has more than four digits",
                number
            )));
        }
        Ok(Self {
            campus,
            role,
            number,
        })
    }

    /// Home campus of the user
    pub fn campus(&self) -> Campus {
        self.campus
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{:04}",
            self.campus.code().to_ascii_lowercase(),
            self.role.code(),
            self.number
        )
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::InvalidArgument(format!(
                "Invalid identifier '{}', expected campus, role and four digits (ie. dvls1234)",
                s
            ))
        };
        let s = s.trim();
        if s.len() != 8 || !s.is_ascii() {
            return Err(invalid());
        }
        let campus: Campus = s[..3].parse().map_err(|_| invalid())?;
        let role = match &s[3..4] {
            "a" | "A" => Role::Admin,
            "s" | "S" => Role::Student,
            _ => return Err(invalid()),
        };
        let digits = &s[4..];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let number = digits.parse().map_err(|_| invalid())?;
        UserId::new(campus, role, number)
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_student() {
        let id: UserId = "dvls1234".parse().unwrap();
        assert_eq!(id.campus(), Campus::Dvl);
        assert!(id.is_student());
        assert_eq!(id.to_string(), "dvls1234");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let id: UserId = "KKLA0001".parse().unwrap();
        assert_eq!(id.role(), Role::Admin);
        assert_eq!(id.to_string(), "kkla0001");
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        for bad in ["dvls123", "dvlx1234", "abcs1234", "dvls12a4", "dvls12345", "dvlś123"] {
            assert!(bad.parse::<UserId>().is_err(), "accepted {:?}", bad);
        }
    }
}
