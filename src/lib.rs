// passwd is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// passwd is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with passwd.  If not, see <http://www.gnu.org/licenses/>.

//! Passwd changes a user's password on one of several backends.
//!
//! Every backend is implemented as a [`Driver`]. Drivers are built by the
//! [`registry::Registry`] from their configuration and receive their shared
//! services through [`Dependencies`].
//!

pub mod composite;
pub mod file;
pub mod hashlib;
pub mod poppassd;
pub mod process;
pub mod prompt;
pub mod registry;
pub mod servuftp;

#[cfg(any(feature = "db", feature = "sqlite"))]
pub mod sql;

#[cfg(feature = "ldap")]
pub mod ldap;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub mod soap;

use log::{debug, info, warn};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exit code to signal a wrong old password
pub const EXIT_BADPASS: i32 = 1;
/// Exit code to signal a configuration error
pub const EXIT_CONFIG: i32 = 2;
/// Exit code to signal user not found
pub const EXIT_NOUSER: i32 = 3;
/// Exit code to signal that the backend refused the change
pub const EXIT_REJECTED: i32 = 4;
/// Exit code to signal temporary failures
pub const EXIT_TEMPFAIL: i32 = 111;

/// Default timeout for network backends
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Coarse classification of a [`PasswdError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    NotFound,
    Transport,
    Rejected,
}

/// Represents the ways a password change can fail
#[derive(Debug)]
pub enum PasswdError {
    /// Missing or invalid configuration
    Config(String),
    /// The old password does not match
    BadOldPassword,
    /// User not found
    NoUser,
    /// The backend could not be reached
    Transport(String),
    /// The backend refused the change
    Rejected(String),
    /// A sub-driver of a composite backend failed
    Driver {
        driver: String,
        source: Box<PasswdError>,
    },
}

impl std::fmt::Display for PasswdError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PasswdError::Config(msg) => write!(f, "configuration error: {}", msg),
            PasswdError::BadOldPassword => write!(f, "incorrect old password"),
            PasswdError::NoUser => write!(f, "user not found"),
            PasswdError::Transport(msg) => write!(f, "{}", msg),
            PasswdError::Rejected(msg) => write!(f, "password change rejected: {}", msg),
            PasswdError::Driver { driver, source } => {
                write!(f, "password change failed on backend {}: {}", driver, source)
            }
        }
    }
}

impl std::error::Error for PasswdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PasswdError::Driver { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl PasswdError {
    /// Returns the kind of the error, looking through composite wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::BadOldPassword => ErrorKind::Authentication,
            Self::NoUser => ErrorKind::NotFound,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::Driver { source, .. } => source.kind(),
        }
    }

    /// Returns the corresponding exit code for the command line front end
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Authentication => EXIT_BADPASS,
            ErrorKind::Configuration => EXIT_CONFIG,
            ErrorKind::NotFound => EXIT_NOUSER,
            ErrorKind::Rejected => EXIT_REJECTED,
            ErrorKind::Transport => EXIT_TEMPFAIL,
        }
    }

    /// Wraps the error with the name of the backend it originates from
    pub fn in_driver<T: AsRef<str>>(self, driver: T) -> Self {
        Self::Driver {
            driver: driver.as_ref().to_string(),
            source: Box::new(self),
        }
    }
}

impl From<std::io::Error> for PasswdError {
    fn from(error: std::io::Error) -> Self {
        PasswdError::Transport(error.to_string())
    }
}

impl From<toml::de::Error> for PasswdError {
    fn from(value: toml::de::Error) -> Self {
        PasswdError::Config(value.to_string())
    }
}

pub type PasswdResult<T> = Result<T, PasswdError>;

/// Trait which defines a password change backend
pub trait Driver {
    /// Verifies the old password and replaces it with the new one
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()>;
}

/// Source of the current time, injectable for drivers enforcing password aging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    System,
    /// Fixed point in time, in seconds since the unix epoch
    Fixed(u64),
}

impl Clock {
    /// Returns seconds since the unix epoch
    pub fn now(&self) -> u64 {
        match self {
            Self::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            Self::Fixed(secs) => *secs,
        }
    }

    /// Returns days since the unix epoch, as used by shadow password aging
    pub fn days(&self) -> u64 {
        self.now() / 86400
    }
}

/// Shared services handed to every driver constructor
#[derive(Clone)]
pub struct Dependencies {
    pub clock: Clock,
    pub timeout: Duration,
    #[cfg(feature = "http")]
    pub agent: ureq::Agent,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            clock: Clock::System,
            timeout,
            #[cfg(feature = "http")]
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for Dependencies {
    fn default() -> Self {
        Self::new()
    }
}

/// Changes the password of the user given on the driver given
///
/// An empty username never reaches the driver.
pub fn change_password(
    driver: &mut dyn Driver,
    username: &str,
    old_password: &str,
    new_password: &str,
) -> PasswdResult<()> {
    if username.is_empty() {
        debug!("refusing password change for empty username");
        return Err(PasswdError::NoUser);
    }

    debug!("change password of user {username}");
    match driver.change_password(username, old_password, new_password) {
        Ok(()) => {
            info!("password of user {username} changed");
            Ok(())
        }
        Err(err) => {
            warn!("unable to change password of user {username}: {err}");
            Err(err)
        }
    }
}

/// Line breaks, which would end a record or protocol line early
pub(crate) const LINE_BREAKS: [char; 2] = ['\r', '\n'];

/// Refuses the change if one of the named values contains a forbidden character
pub(crate) fn refuse_chars(values: &[(&str, &str)], forbidden: &[char]) -> PasswdResult<()> {
    match values
        .iter()
        .find(|(_, value)| value.contains(forbidden))
    {
        Some((name, _)) => Err(PasswdError::Rejected(format!(
            "{name} contains a forbidden character"
        ))),
        None => Ok(()),
    }
}

/// Returns the template given with `%u` replaced by the username
pub(crate) fn expand_user(template: &str, username: &str) -> String {
    template.replace("%u", username)
}
