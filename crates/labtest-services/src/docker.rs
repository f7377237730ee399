//! Docker-in-Docker lab fixture.

use std::net::{IpAddr, SocketAddr};

use labtest::{Fixture, LabConfig, LabError};

use crate::ServiceOptions;

/// Lab script starting the daemon.
pub const DOCKER_SCRIPT: &str = "dind.mlab";

/// Port the daemon's API listens on inside the lab.
pub const DOCKER_PORT: u16 = 2375;

const DOCKER_PREFIX: &str = "docker:";

/// A running Docker daemon lab.
///
/// Dropping the value closes the lab.
#[derive(Debug)]
pub struct DockerLab {
    fixture: Fixture,
}

impl DockerLab {
    /// Starts the daemon.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Fixture::start`]. With a reporter bound in
    /// `options`, the error is reported as fatal instead.
    pub fn start(config: &LabConfig, options: ServiceOptions) -> Result<Self, LabError> {
        options
            .start(DOCKER_PREFIX, config, DOCKER_SCRIPT, Vec::new())
            .map(|fixture| Self { fixture })
    }

    /// Stops the daemon. Safe to call more than once.
    pub fn close(&self) {
        self.fixture.close();
    }

    /// Logs an internal event through the fixture.
    pub fn log(&self, message: &str) {
        self.fixture.log(message);
    }

    /// Where a client reaches the daemon's API.
    ///
    /// # Errors
    ///
    /// As for [`Fixture::access_point`].
    pub fn address(&self) -> Result<SocketAddr, LabError> {
        self.fixture.access_point(DOCKER_PORT)
    }

    /// The daemon's address on the lab network.
    ///
    /// # Errors
    ///
    /// As for [`Fixture::primary_address`].
    pub fn ip(&self) -> Result<IpAddr, LabError> {
        self.fixture.primary_address()
    }

    /// The underlying fixture.
    #[must_use]
    pub const fn fixture(&self) -> &Fixture {
        &self.fixture
    }
}
