//! Certificate trust policy.

use serde::{Deserialize, Serialize};

/// What to do when a surface reports an untrusted certificate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[derive(Default)]
pub enum CertificatePolicy {
    /// Suppress the interstitial and proceed as trusted.
    #[default]
    AcceptAll,
    /// Proceed only for hosts listed in `allowed_hosts`.
    AllowList,
    /// Never override the engine's verdict.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub certificate_policy: CertificatePolicy,
    /// Host names trusted under the `allow-list` policy.
    pub allowed_hosts: Vec<String>,
}
