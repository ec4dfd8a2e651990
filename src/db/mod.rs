pub mod load;
pub mod validate;

use anyhow::{anyhow, bail, Context, Result};
use percent_encoding::percent_decode_str;
use sqlx::{
    any::{install_default_drivers, AnyPoolOptions},
    AnyConnection, AnyPool, Connection,
};
use std::{
    fs,
    io::{self, BufRead, Write},
    path::PathBuf,
};
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::{DbConfig, ExistingDatabase};
use crate::schema::quote_ident;

/// SQL dialect of the target store, chosen from the connection URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Backend::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Backend::Sqlite)
        } else {
            bail!("unsupported database URL scheme: {}", url)
        }
    }

    /// Positional bind parameter `i` (1-based).
    pub fn placeholder(&self, i: usize) -> String {
        match self {
            Backend::Postgres => format!("${}", i),
            Backend::Sqlite => "?".to_string(),
        }
    }
}

/// An open pool plus the dialect it speaks.
#[derive(Debug, Clone)]
pub struct Store {
    pub pool: AnyPool,
    pub backend: Backend,
}

/// Path of the file behind a `sqlite:` URL; `None` for in-memory databases.
fn sqlite_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// Split a Postgres URL into the URL of the `postgres` maintenance database
/// and the target database name, percent-decoded.
fn maintenance_url(url: &str) -> Result<(String, String)> {
    let mut parsed = Url::parse(url).with_context(|| "parsing database URL".to_string())?;
    let name = percent_decode_str(parsed.path().trim_start_matches('/'))
        .decode_utf8()
        .context("database name in URL is not UTF-8")?
        .into_owned();
    if name.is_empty() {
        bail!("database URL has no database name");
    }
    parsed.set_path("/postgres");
    Ok((parsed.to_string(), name))
}

/// Reads `y`/`s` (sí) from stdin as consent.
pub fn prompt_stdin(question: &str) -> Result<bool> {
    print!("{} (y/n): ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "s" | "yes" | "si" | "sí"))
}

fn should_recreate<F>(on_existing: ExistingDatabase, name: &str, confirm: &mut F) -> Result<bool>
where
    F: FnMut(&str) -> Result<bool>,
{
    Ok(match on_existing {
        ExistingDatabase::Keep => false,
        ExistingDatabase::Recreate => true,
        ExistingDatabase::Prompt => confirm(&format!(
            "database '{}' already exists; drop and create it again?",
            name
        ))?,
    })
}

fn log_connection_hints(backend: Backend, err: &dyn std::fmt::Display) {
    error!(%err, "could not reach the database");
    match backend {
        Backend::Postgres => {
            error!("check that PostgreSQL is installed and running");
            error!("check PGUSER / PGPASSWORD (or DATABASE_URL)");
            error!("check that PGHOST / PGPORT point at a listening server (default localhost:5432)");
        }
        Backend::Sqlite => {
            error!("check that the directory of the SQLite file exists and is writable");
        }
    }
}

/// Make sure the target database exists. If it already does, `on_existing`
/// decides whether it is kept or dropped and created again; `Prompt` asks
/// through `confirm`. Returns `true` when a database was created.
#[instrument(level = "info", skip(cfg, confirm))]
pub async fn ensure_database<F>(
    cfg: &DbConfig,
    on_existing: ExistingDatabase,
    mut confirm: F,
) -> Result<bool>
where
    F: FnMut(&str) -> Result<bool>,
{
    install_default_drivers();
    let url = cfg.database_url()?;
    let backend = Backend::from_url(&url)?;

    match backend {
        Backend::Sqlite => {
            let Some(path) = sqlite_path(&url) else {
                return Ok(true);
            };
            let name = path.display().to_string();
            if path.exists() {
                warn!(db = %name, "database already exists");
                if !should_recreate(on_existing, &name, &mut confirm)? {
                    info!(db = %name, "using existing database");
                    return Ok(false);
                }
                fs::remove_file(&path).with_context(|| format!("removing {}", name))?;
                info!(db = %name, "database dropped");
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory {:?}", parent))?;
            }
            // a zero-length file is a valid empty SQLite database
            fs::File::create(&path).with_context(|| format!("creating {}", name))?;
            info!(db = %name, "database created");
            Ok(true)
        }
        Backend::Postgres => {
            let (admin_url, name) = maintenance_url(&url)?;
            let mut conn = match AnyConnection::connect(&admin_url).await {
                Ok(conn) => conn,
                Err(e) => {
                    log_connection_hints(backend, &e);
                    return Err(anyhow!(e).context("connecting to the postgres maintenance database"));
                }
            };

            let exists = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
                .bind(name.as_str())
                .fetch_optional(&mut conn)
                .await
                .context("checking pg_database")?
                .is_some();

            if exists {
                warn!(db = %name, "database already exists");
                if !should_recreate(on_existing, &name, &mut confirm)? {
                    info!(db = %name, "using existing database");
                    conn.close().await.ok();
                    return Ok(false);
                }
                let drop_sql = format!("DROP DATABASE {}", quote_ident(&name));
                sqlx::raw_sql(&drop_sql)
                    .execute(&mut conn)
                    .await
                    .with_context(|| format!("dropping database {}", name))?;
                info!(db = %name, "database dropped");
            }

            // CREATE DATABASE must not run inside a transaction, so it goes
            // through the simple query protocol (no bind arguments)
            let create_sql = format!("CREATE DATABASE {}", quote_ident(&name));
            sqlx::raw_sql(&create_sql)
                .execute(&mut conn)
                .await
                .with_context(|| format!("creating database {}", name))?;
            conn.close().await.ok();
            info!(db = %name, "database created");
            Ok(true)
        }
    }
}

/// Open a single-connection pool to the target database and check it
/// answers `SELECT 1`.
#[instrument(level = "info", skip(cfg))]
pub async fn connect(cfg: &DbConfig) -> Result<Store> {
    install_default_drivers();
    let url = cfg.database_url()?;
    let backend = Backend::from_url(&url)?;

    let pool = match AnyPoolOptions::new().max_connections(1).connect(&url).await {
        Ok(pool) => pool,
        Err(e) => {
            log_connection_hints(backend, &e);
            return Err(anyhow!(e).context("connecting to the target database"));
        }
    };
    if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
        log_connection_hints(backend, &e);
        return Err(anyhow!(e).context("probing the target database"));
    }
    info!(?backend, "database connection established");
    Ok(Store { pool, backend })
}
