//! Oracle connection factory and pooling.
//!
//! Builds a connect descriptor (host, port, service name, user, password)
//! from the five `native_system_config` keys, percent-encoding the user-info
//! component, and hands it to `oracle::Connection::connect`.

use std::fmt::Write as _;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use r2d2::ManageConnection;
use tracing::error;

use crate::config::{NativeSystemConfig, ORACLE_DB, ORACLE_HOSTNAME, ORACLE_PASSWORD, ORACLE_PORT, ORACLE_USER};
use crate::error::{LayerError, LayerResult};

/// A connect descriptor of the form `host[:port]/service`, with user and
/// password kept separate since the driver takes them as distinct connect
/// arguments rather than URL user-info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectDescriptor {
    pub user: String,
    pub password: String,
    pub connect_string: String,
}

fn required<'a>(native: &'a NativeSystemConfig, key: &str) -> LayerResult<&'a str> {
    native
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| LayerError::configuration(format!("missing required native system config key: {key}")))
}

/// Builds a [`ConnectDescriptor`] from the five mandatory native-system keys.
///
/// User and password are percent-encoded and decoded back immediately so a
/// value containing `@` or `/` survives intact.
pub fn build_descriptor(native: &NativeSystemConfig) -> LayerResult<ConnectDescriptor> {
    let hostname = required(native, ORACLE_HOSTNAME)?;
    let port = required(native, ORACLE_PORT)?;
    let db = required(native, ORACLE_DB)?;
    let user = required(native, ORACLE_USER)?;
    let password = required(native, ORACLE_PASSWORD)?;

    let encoded_user = utf8_percent_encode(user, NON_ALPHANUMERIC).to_string();
    let user = percent_encoding::percent_decode_str(&encoded_user)
        .decode_utf8()
        .map_err(|e| LayerError::configuration(format!("user could not be percent decoded: {e}")))?
        .into_owned();

    let mut connect_string = hostname.to_string();
    if !port.is_empty() {
        write!(connect_string, ":{port}").expect("write to String never fails");
    }
    if !db.starts_with('/') {
        connect_string.push('/');
    }
    connect_string.push_str(db);

    Ok(ConnectDescriptor {
        user,
        password: password.to_string(),
        connect_string,
    })
}

/// A stable fingerprint of the native-system config, used by the catalog to
/// decide whether a held connection pool can be reused across a
/// reconfiguration or must be rebuilt.
pub fn digest(native: &NativeSystemConfig) -> String {
    let mut entries: Vec<(&str, &str)> = native.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    entries.sort_unstable_by_key(|(k, _)| *k);
    let mut buf = String::new();
    for (k, v) in entries {
        buf.push_str(k);
        buf.push('=');
        buf.push_str(v);
        buf.push(';');
    }
    format!("{:x}", simple_hash(&buf))
}

fn simple_hash(input: &str) -> u64 {
    // FNV-1a. Not cryptographic; only used to detect config changes.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// An [`r2d2::ManageConnection`] implementation over `oracle::Connection`,
/// since the `oracle` crate (unlike `diesel`) has no pooling of its own.
#[derive(Debug, Clone)]
pub struct OracleConnectionManager {
    descriptor: ConnectDescriptor,
}

impl OracleConnectionManager {
    pub fn new(descriptor: ConnectDescriptor) -> Self {
        OracleConnectionManager { descriptor }
    }
}

impl ManageConnection for OracleConnectionManager {
    type Connection = oracle::Connection;
    type Error = oracle::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let mut conn = oracle::Connection::connect(
            &self.descriptor.user,
            &self.descriptor.password,
            &self.descriptor.connect_string,
        )
        .map_err(|e| {
            error!(error = %e, connect_string = %self.descriptor.connect_string, "failed to connect to database");
            e
        })?;
        // Autocommit stays on by default, matching the teacher's own
        // `raw.set_autocommit(true)` (`examples/selu-diesel-oci/src/oracle/connection/mod.rs`):
        // this pool is shared by the read path, which never commits or rolls
        // back, and the write path, which explicitly toggles autocommit off
        // for the lifetime of its own transaction (`WriteSession::begin`)
        // and back on before the connection returns to the pool.
        conn.set_autocommit(true);
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.ping().map_err(|e| {
            error!(error = %e, "ping failed on pooled connection");
            e
        })
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.ping().is_err()
    }
}

pub type OraclePool = r2d2::Pool<OracleConnectionManager>;

/// Builds a fresh pool for the given native-system config.
pub fn build_pool(native: &NativeSystemConfig) -> LayerResult<OraclePool> {
    let descriptor = build_descriptor(native)?;
    let manager = OracleConnectionManager::new(descriptor);
    r2d2::Pool::builder()
        .build(manager)
        .map_err(|e| LayerError::configuration(format!("failed to build connection pool: {e}")))
}
