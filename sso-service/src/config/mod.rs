use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SsoConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    /// Issuer URL: the `iss` claim and the base for advertised endpoints.
    pub issuer: String,
    /// Where unauthenticated browsers are sent to log in.
    pub login_url: String,
    pub session: SessionConfig,
    pub oidc: OidcConfig,
    pub cas: CasConfig,
    pub ldap: LdapConfig,
    pub cleanup: CleanupConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Shared HMAC secret for the stateless login cookie.
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    pub code_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CasConfig {
    pub ticket_ttl_secs: i64,
    pub tgt_ttl_secs: i64,
    pub pgt_ttl_secs: i64,
    /// Global switch for single-logout notification.
    pub slo_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LdapConfig {
    pub enabled: bool,
    pub port: u16,
    pub base_dn: String,
    pub admin_dn: String,
    pub admin_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl SsoConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = SsoConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("sso-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            issuer: get_env("SSO_ISSUER", Some("http://localhost:8080"), is_prod)?,
            login_url: get_env("SSO_LOGIN_URL", Some("/sso/login"), is_prod)?,
            session: SessionConfig {
                secret: get_env("SESSION_SECRET", None, is_prod)?,
            },
            oidc: OidcConfig {
                code_ttl_secs: parse_env("OIDC_CODE_TTL_SECS", "600", is_prod)?,
            },
            cas: CasConfig {
                ticket_ttl_secs: parse_env("CAS_TICKET_TTL_SECS", "300", is_prod)?,
                tgt_ttl_secs: parse_env("CAS_TGT_TTL_SECS", "28800", is_prod)?,
                pgt_ttl_secs: parse_env("CAS_PGT_TTL_SECS", "7200", is_prod)?,
                slo_enabled: parse_env("CAS_SLO_ENABLED", "true", is_prod)?,
            },
            ldap: LdapConfig {
                enabled: parse_env("LDAP_ENABLED", "false", is_prod)?,
                port: parse_env("LDAP_PORT", "3389", is_prod)?,
                base_dn: get_env("LDAP_BASE_DN", Some("dc=sso,dc=local"), is_prod)?,
                admin_dn: get_env("LDAP_ADMIN_DN", Some("cn=admin,dc=sso,dc=local"), is_prod)?,
                admin_password: get_env("LDAP_ADMIN_PASSWORD", None, is_prod)?,
            },
            cleanup: CleanupConfig {
                interval_secs: parse_env("CLEANUP_INTERVAL_SECS", "3600", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("*"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        };

        Ok(config)
    }
}

/// Read an env var. In prod everything must be set explicitly; outside
/// prod the default applies and vars with no default are still required.
fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(name: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(name, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{name}: {e}")))
}
