use std::env;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analysis::error::{AnalysisFailure, upstream_auth};

pub const DEFAULT_CREDENTIAL_ENV: &str = "PROVIDER_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialRef {
    Env { var: String },
    InlineToken { token: String },
    None,
}

impl Default for CredentialRef {
    fn default() -> Self {
        CredentialRef::Env {
            var: DEFAULT_CREDENTIAL_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedCredential {
    pub auth_header: Option<String>,
}

impl ResolvedCredential {
    pub fn bearer(token: &str) -> Self {
        Self {
            auth_header: Some(format!("Bearer {}", token)),
        }
    }

    pub fn none() -> Self {
        Self { auth_header: None }
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, reference: &CredentialRef)
    -> Result<ResolvedCredential, AnalysisFailure>;
}

#[derive(Default)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(
        &self,
        reference: &CredentialRef,
    ) -> Result<ResolvedCredential, AnalysisFailure> {
        match reference {
            CredentialRef::Env { var } => {
                let token = env::var(var)
                    .ok()
                    .filter(|token| !token.trim().is_empty())
                    .ok_or_else(|| {
                        upstream_auth(format!("missing credential environment variable {}", var))
                    })?;
                Ok(ResolvedCredential::bearer(&token))
            }
            CredentialRef::InlineToken { token } => {
                if token.trim().is_empty() {
                    return Err(upstream_auth("inline credential token cannot be empty"));
                }
                Ok(ResolvedCredential::bearer(token))
            }
            CredentialRef::None => Ok(ResolvedCredential::none()),
        }
    }
}
