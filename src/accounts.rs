//! Agents, clients and the actors that call into the workflow.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

id_type!(AgentId);
id_type!(ClientId);

/// Field worker who visits addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(full_name: String, email: String) -> Self {
        Self {
            id: AgentId::new(),
            full_name,
            email,
            created_at: Utc::now(),
        }
    }
}

/// Result push settings for a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub avs_endpoint: String,
    pub subscription_key: String,
    pub vendor_external_id: String,
    #[serde(default)]
    pub integration_enabled: bool,
}

/// Organisation that submits verification requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: ClientId,
    pub company_name: String,
    pub email: String,
    #[serde(default)]
    pub integration: Option<Integration>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(company_name: String, email: String) -> Self {
        Self {
            id: ClientId::new(),
            company_name,
            email,
            integration: None,
            created_at: Utc::now(),
        }
    }

    /// The integration, if configured and switched on.
    pub fn enabled_integration(&self) -> Option<&Integration> {
        self.integration
            .as_ref()
            .filter(|integration| integration.integration_enabled)
    }
}

/// Authenticated caller of a workflow operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Agent(AgentId),
    Client(ClientId),
}

impl Actor {
    pub fn kind(&self) -> ActorKind {
        match self {
            Actor::Admin => ActorKind::Admin,
            Actor::Agent(_) => ActorKind::Agent,
            Actor::Client(_) => ActorKind::Client,
        }
    }

    /// Build an actor from a token subject and role.
    pub fn from_parts(kind: ActorKind, subject: &str) -> Option<Self> {
        match kind {
            ActorKind::Admin => Some(Actor::Admin),
            ActorKind::Agent => subject.parse().ok().map(Actor::Agent),
            ActorKind::Client => subject.parse().ok().map(Actor::Client),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Admin,
    Agent,
    Client,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Admin => "admin",
            ActorKind::Agent => "agent",
            ActorKind::Client => "client",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
