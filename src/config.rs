/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::{
    auth::{self, AuthResult, Issuer},
    store::Store,
    user::{NewManager, User},
};

/// Length of the signing secret made up when none is configured.
const GENERATED_SECRET_LENGTH: usize = 48;

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    jwt_secret: Option<String>,
    jwt_ttl_minutes: Option<i64>,
    admin_uname: Option<String>,
    admin_password: Option<String>,
    admin_name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
}

pub struct Cfg {
    pub db_connect_string: String,
    /// `None` means make one up at startup.
    pub jwt_secret: Option<String>,
    pub jwt_ttl_minutes: i64,
    pub default_admin_uname: String,
    pub default_admin_password: String,
    pub default_admin_name: String,
    pub addr: SocketAddr,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=registrar_test password='registrar_test' dbname=registrar_test".to_owned(),
            jwt_secret: None,
            jwt_ttl_minutes: 60,
            default_admin_uname: "root".to_owned(),
            default_admin_password: "toot".to_owned(),
            default_admin_name: "Administrator".to_owned(),
            addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
        }
    }
}

static HIDDEN: &str = "[ hidden ]";

// Logged at startup, so the secret and the admin password stay out of it.
impl std::fmt::Debug for Cfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secret = match self.jwt_secret {
            Some(_) => HIDDEN,
            None => "[ none; will generate ]",
        };
        f.debug_struct("Cfg")
            .field("db_connect_string", &self.db_connect_string)
            .field("jwt_secret", &secret)
            .field("jwt_ttl_minutes", &self.jwt_ttl_minutes)
            .field("default_admin_uname", &self.default_admin_uname)
            .field("default_admin_password", &HIDDEN)
            .field("default_admin_name", &self.default_admin_name)
            .field("addr", &self.addr)
            .finish()
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string {
            c.db_connect_string = s;
        }
        if let Some(s) = cf.jwt_secret {
            c.jwt_secret = Some(s);
        }
        if let Some(n) = cf.jwt_ttl_minutes {
            if n < 1 {
                return Err(format!("jwt_ttl_minutes must be positive; got {}.", &n));
            }
            c.jwt_ttl_minutes = n;
        }
        if let Some(s) = cf.admin_uname {
            c.default_admin_uname = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(s) = cf.admin_name {
            c.default_admin_name = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }

        Ok(c)
    }
}

/**
This guy will haul around the global resources and be passed in an
`axum::Extension` to the handlers that need them.
*/
#[derive(Debug)]
pub struct Glob {
    pub store: Store,
    pub issuer: Issuer,
    pub addr: SocketAddr,
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of the default administrator, a top-level
/// manager.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let cfg = Cfg::from_file(path.as_ref())?;
    log::info!("Configuration file read:\n{:#?}", &cfg);

    log::trace!("Checking state of DB...");
    let store = Store::new(cfg.db_connect_string.clone());
    if let Err(e) = store.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...DB okay.");

    log::trace!("Checking existence of default Admin...");
    match auth::check_password(
        &store,
        &cfg.default_admin_uname,
        &cfg.default_admin_password,
    ).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default Admin ({}): {}",
                &cfg.default_admin_uname, &e
            );
            return Err(estr);
        },
        Ok((AuthResult::NoSuchUser, _)) => {
            log::info!(
                "Default Admin ({}) doesn't exist; inserting.",
                &cfg.default_admin_uname
            );
            let nm = NewManager {
                name: cfg.default_admin_name.clone(),
                uname: cfg.default_admin_uname.clone(),
                password: cfg.default_admin_password.clone(),
                department: "Administration".to_owned(),
                salary: None,
                reports_to: None,
            };
            if let Err(e) = store.insert_manager(&nm).await {
                let estr = format!("Error inserting default Admin: {}", &e);
                return Err(estr);
            }
        },
        Ok((AuthResult::BadPassword, _)) => {
            log::warn!("Default Admin ({}) not using default password.", &cfg.default_admin_uname);
        },
        Ok((AuthResult::Ok, Some(User::Manager(_)))) => {
            log::trace!("Default Admin password check OK.");
        },
        Ok((AuthResult::Ok, Some(u))) => {
            log::warn!(
                "Default Admin uname {:?} belongs to a {}, not a manager.",
                u.uname(), u.role()
            );
        },
        Ok(x) => {
            let estr = format!("Default Admin password check resulted in {:?}, which just doesn't make sense.", &x);
            return Err(estr);
        },
    }
    log::trace!("Default Admin OK.");

    let secret = match cfg.jwt_secret {
        Some(s) => s,
        None => {
            log::warn!("No jwt_secret configured; tokens won't survive a restart.");
            auth::random_secret(GENERATED_SECRET_LENGTH)
        },
    };
    let issuer = Issuer::new(&secret, time::Duration::minutes(cfg.jwt_ttl_minutes));

    let glob = Glob {
        store,
        issuer,
        addr: cfg.addr,
    };

    Ok(glob)
}
