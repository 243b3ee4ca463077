//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on the lazy Once).
use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();

/// Load environment files exactly once. `.env.local` wins over `.env` so a
/// developer override never has to touch the committed file.
/// Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::from_filename(".env.local").is_err() {
            let _ = dotenv::dotenv();
        }
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Composed database URL (tries explicit DSNs first, then component vars).
pub fn db_url() -> anyhow::Result<String> {
    init_env();
    for k in ["DATABASE_URL", "SUPABASE_DB_URL", "DB_URL"] {
        if let Some(v) = env_opt(k) {
            return Ok(v);
        }
    }
    if let Some(dsn) = build_dsn_from_parts() {
        return Ok(dsn);
    }
    Err(anyhow::anyhow!(
        "no database URL configured (set DATABASE_URL or the SUPABASE_PSQL_DB_* vars)"
    ))
}

/// Build a DSN from the SUPABASE_PSQL_DB_* component variables.
///
/// The password may contain reserved URL characters, so the DSN is assembled
/// via `url::Url` which percent-encodes credentials safely. Managed Postgres
/// requires TLS; composed DSNs default to sslmode=require.
fn build_dsn_from_parts() -> Option<String> {
    let host = env_opt("SUPABASE_PSQL_DB_HOST")?;
    let database = env_opt("SUPABASE_PSQL_DB_NAME")?;
    let user = env_opt("SUPABASE_PSQL_DB_USER")?;
    let password = env_opt("SUPABASE_PSQL_DB_PASSWORD");
    let port: u16 = env_opt("SUPABASE_PSQL_DB_PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(5432);

    let mut out = url::Url::parse("postgresql://localhost").ok()?;
    out.set_username(&user).ok()?;
    if let Some(pass) = password {
        out.set_password(Some(&pass)).ok()?;
    }
    out.set_host(Some(host.trim())).ok()?;
    out.set_port(Some(port)).ok()?;
    out.set_path(&format!("/{database}"));
    out.query_pairs_mut().append_pair("sslmode", "require");

    Some(out.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accepts_truthy_spellings() {
        for v in ["1", "true", "ON", "Yes"] {
            std::env::set_var("ENRICH_TEST_FLAG", v);
            assert!(env_flag("ENRICH_TEST_FLAG", false), "value {v}");
        }
        std::env::set_var("ENRICH_TEST_FLAG", "0");
        assert!(!env_flag("ENRICH_TEST_FLAG", true));
        std::env::remove_var("ENRICH_TEST_FLAG");
    }

    #[test]
    fn composed_dsn_encodes_credentials() {
        std::env::set_var("SUPABASE_PSQL_DB_HOST", "db.example.com");
        std::env::set_var("SUPABASE_PSQL_DB_NAME", "analytics");
        std::env::set_var("SUPABASE_PSQL_DB_USER", "svc");
        std::env::set_var("SUPABASE_PSQL_DB_PASSWORD", "p@ss?word");
        let dsn = build_dsn_from_parts().expect("dsn");
        assert!(dsn.starts_with("postgresql://svc:"));
        assert!(dsn.contains("db.example.com:5432/analytics"));
        assert!(dsn.contains("sslmode=require"));
        assert!(!dsn.contains("p@ss?word"), "password must be encoded");
        for k in [
            "SUPABASE_PSQL_DB_HOST",
            "SUPABASE_PSQL_DB_NAME",
            "SUPABASE_PSQL_DB_USER",
            "SUPABASE_PSQL_DB_PASSWORD",
        ] {
            std::env::remove_var(k);
        }
    }
}
