use serde::{Deserialize, Serialize};
use std::fmt;

/// The three actor roles that observe the booking lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Driver => "driver",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whoever proposed an operation. Role claims are trusted as given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub role: Role,
    pub id: Option<String>,
}

impl Actor {
    pub fn customer(id: impl Into<String>) -> Self {
        Self { role: Role::Customer, id: Some(id.into()) }
    }

    pub fn driver(id: impl Into<String>) -> Self {
        Self { role: Role::Driver, id: Some(id.into()) }
    }

    pub fn admin() -> Self {
        Self { role: Role::Admin, id: None }
    }

    /// True when this actor is the given customer or driver
    pub fn is(&self, role: Role, id: &str) -> bool {
        self.role == role && self.id.as_deref() == Some(id)
    }
}
