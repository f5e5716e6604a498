//! Access control lists over client identity.

use std::net::IpAddr;

use axum::body::Body;
use axum::http::Request;

use crate::config::schema::AclConfig;
use crate::policy::{ClientIdentity, DenyReason, Policy, PolicyError, Verdict};

/// One allow/deny list entry: a CIDR block, a bare IP, or an exact host.
#[derive(Debug, Clone, PartialEq)]
pub enum AclEntry {
    Cidr { network: IpAddr, prefix: u8 },
    Host(String),
}

/// Parse a list entry. `a.b.c.d/len` and bare IPs become CIDR entries
/// (a bare IP gets a full-length prefix); anything else is an exact host.
pub fn parse_entry(raw: &str) -> Result<AclEntry, String> {
    if let Some((addr, prefix)) = raw.split_once('/') {
        let network: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid network address '{addr}'"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("invalid prefix length '{prefix}'"))?;
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(format!("prefix length {prefix} exceeds {max}"));
        }
        return Ok(AclEntry::Cidr { network, prefix });
    }

    if let Ok(ip) = raw.parse::<IpAddr>() {
        let prefix = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        return Ok(AclEntry::Cidr { network: ip, prefix });
    }

    if raw.is_empty() {
        return Err("empty entry".to_string());
    }
    Ok(AclEntry::Host(raw.to_ascii_lowercase()))
}

impl AclEntry {
    fn matches(&self, client_ip: Option<IpAddr>, client_raw: &str) -> bool {
        match self {
            AclEntry::Cidr { network, prefix } => match (client_ip, network) {
                (Some(IpAddr::V4(ip)), IpAddr::V4(net)) => {
                    let mask = if *prefix == 0 {
                        0
                    } else {
                        u32::MAX << (32 - u32::from(*prefix))
                    };
                    (u32::from(ip) & mask) == (u32::from(*net) & mask)
                }
                (Some(IpAddr::V6(ip)), IpAddr::V6(net)) => {
                    let mask = if *prefix == 0 {
                        0
                    } else {
                        u128::MAX << (128 - u32::from(*prefix))
                    };
                    (u128::from(ip) & mask) == (u128::from(*net) & mask)
                }
                _ => false,
            },
            AclEntry::Host(host) => client_raw.eq_ignore_ascii_case(host),
        }
    }
}

/// Deny-first access control. An empty allow list permits anyone not
/// explicitly denied.
#[derive(Debug)]
pub struct Acl {
    allow: Vec<AclEntry>,
    deny: Vec<AclEntry>,
}

impl Acl {
    pub fn from_config(config: &AclConfig) -> Result<Self, String> {
        let parse_all = |raw: &[String]| -> Result<Vec<AclEntry>, String> {
            raw.iter().map(|e| parse_entry(e)).collect()
        };
        Ok(Self {
            allow: parse_all(&config.allow)?,
            deny: parse_all(&config.deny)?,
        })
    }

    fn check(&self, client: &ClientIdentity) -> Verdict {
        let ip = client.ip();

        // A client that only matches host entries needs no parseable IP.
        if ip.is_none()
            && !self
                .deny
                .iter()
                .chain(self.allow.iter())
                .any(|e| matches!(e, AclEntry::Host(_)))
        {
            return Verdict::Deny(DenyReason::InvalidClient);
        }

        if self.deny.iter().any(|e| e.matches(ip, client.raw())) {
            return Verdict::Deny(DenyReason::AclBlocked);
        }

        if !self.allow.is_empty() && !self.allow.iter().any(|e| e.matches(ip, client.raw())) {
            return Verdict::Deny(DenyReason::AclBlocked);
        }

        Verdict::Allow
    }
}

impl Policy for Acl {
    fn kind(&self) -> &'static str {
        "acl"
    }

    fn apply_request(
        &self,
        _request: &mut Request<Body>,
        client: &ClientIdentity,
    ) -> Result<Verdict, PolicyError> {
        let verdict = self.check(client);
        if let Verdict::Deny(reason) = verdict {
            tracing::debug!(client = %client.raw(), reason = reason.as_str(), "ACL rejection");
        }
        Ok(verdict)
    }
}
