//! PostgreSQL lab fixture.

use std::ffi::OsString;
use std::net::{IpAddr, SocketAddr};

use labtest::{Fixture, LabConfig, LabError};

use crate::ServiceOptions;

/// Lab script starting the server.
pub const POSTGRES_SCRIPT: &str = "postgres.mlab";

/// Port the server listens on inside the lab.
pub const POSTGRES_PORT: u16 = 5432;

const POSTGRES_PREFIX: &str = "pg:";

/// A running PostgreSQL lab.
///
/// Dropping the value closes the lab.
#[derive(Debug)]
pub struct PostgresLab {
    fixture: Fixture,
}

impl PostgresLab {
    /// Starts PostgreSQL, at `version` when given, on an ephemeral host port.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Fixture::start`]. With a reporter bound in
    /// `options`, the error is reported as fatal instead.
    pub fn start(
        config: &LabConfig,
        version: Option<&str>,
        options: ServiceOptions,
    ) -> Result<Self, LabError> {
        options
            .start(POSTGRES_PREFIX, config, POSTGRES_SCRIPT, arguments(version))
            .map(|fixture| Self { fixture })
    }

    /// Stops the server. Safe to call more than once.
    pub fn close(&self) {
        self.fixture.close();
    }

    /// Logs an internal event through the fixture.
    pub fn log(&self, message: &str) {
        self.fixture.log(message);
    }

    /// Where a client connects to the server.
    ///
    /// # Errors
    ///
    /// As for [`Fixture::access_point`].
    pub fn address(&self) -> Result<SocketAddr, LabError> {
        self.fixture.access_point(POSTGRES_PORT)
    }

    /// The server's address on the lab network.
    ///
    /// # Errors
    ///
    /// As for [`Fixture::primary_address`].
    pub fn ip(&self) -> Result<IpAddr, LabError> {
        self.fixture.primary_address()
    }

    /// Connection URL for `database` as the `postgres` user, without TLS.
    ///
    /// An empty `database` selects the server's default database.
    ///
    /// # Errors
    ///
    /// As for [`PostgresLab::address`].
    pub fn connection_url(&self, database: &str) -> Result<String, LabError> {
        let address = self.address()?;
        let url = format!("postgres://postgres@{address}/{database}?sslmode=disable");
        self.log(&format!("database url: {url}"));
        Ok(url)
    }

    /// The underlying fixture.
    #[must_use]
    pub const fn fixture(&self) -> &Fixture {
        &self.fixture
    }
}

fn arguments(version: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-port", "0", "-detach"]
        .into_iter()
        .map(OsString::from)
        .collect();
    if let Some(requested) = version.filter(|requested| !requested.is_empty()) {
        args.push(OsString::from("-ver"));
        args.push(OsString::from(requested));
    }
    args
}
