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

use crate::composite::{CompositeConfig, CompositeDriver};
use crate::file::{FileConfig, FileDriver};
use crate::poppassd::{PoppassdConfig, PoppassdDriver};
use crate::process::{ExpectConfig, ExpectDriver, SmbpasswdConfig, SmbpasswdDriver};
use crate::servuftp::{ServuftpConfig, ServuftpDriver};
use crate::{Dependencies, Driver, PasswdError, PasswdResult};

#[cfg(feature = "http")]
use crate::http::{HttpConfig, HttpDriver};
#[cfg(feature = "ldap")]
use crate::ldap::{LdapConfig, LdapDriver};
#[cfg(feature = "http")]
use crate::soap::{SoapConfig, SoapDriver};
#[cfg(any(feature = "db", feature = "sqlite"))]
use crate::sql::{SqlConfig, SqlDriver};

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration of a single backend, selected by its `driver` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum BackendConfig {
    #[cfg(any(feature = "db", feature = "sqlite"))]
    Sql(SqlConfig),
    #[cfg(feature = "ldap")]
    Ldap(LdapConfig),
    #[cfg(feature = "ldap")]
    Smbldap(LdapConfig),
    Composite(CompositeConfig),
    #[cfg(feature = "http")]
    Http(HttpConfig),
    #[cfg(feature = "http")]
    Soap(SoapConfig),
    Poppassd(PoppassdConfig),
    Servuftp(ServuftpConfig),
    Expect(ExpectConfig),
    Smbpasswd(SmbpasswdConfig),
    File(FileConfig),
}

impl BackendConfig {
    /// Returns the name of the driver as used in the configuration
    pub fn driver_name(&self) -> &'static str {
        match self {
            #[cfg(any(feature = "db", feature = "sqlite"))]
            Self::Sql(_) => "sql",
            #[cfg(feature = "ldap")]
            Self::Ldap(_) => "ldap",
            #[cfg(feature = "ldap")]
            Self::Smbldap(_) => "smbldap",
            Self::Composite(_) => "composite",
            #[cfg(feature = "http")]
            Self::Http(_) => "http",
            #[cfg(feature = "http")]
            Self::Soap(_) => "soap",
            Self::Poppassd(_) => "poppassd",
            Self::Servuftp(_) => "servuftp",
            Self::Expect(_) => "expect",
            Self::Smbpasswd(_) => "smbpasswd",
            Self::File(_) => "file",
        }
    }
}

/// Named backends, building their drivers on demand
#[derive(Debug, Clone, Default)]
pub struct Registry {
    backends: BTreeMap<String, BackendConfig>,
}

impl Registry {
    pub fn new(backends: BTreeMap<String, BackendConfig>) -> Self {
        Self { backends }
    }

    /// Returns the names of all configured backends, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }

    /// Builds the driver of the backend given
    pub fn driver(&self, name: &str, deps: &Dependencies) -> PasswdResult<Box<dyn Driver>> {
        self.build(name, deps, &mut Vec::new())
    }

    fn build(
        &self,
        name: &str,
        deps: &Dependencies,
        parents: &mut Vec<String>,
    ) -> PasswdResult<Box<dyn Driver>> {
        if parents.iter().any(|parent| parent == name) {
            return Err(PasswdError::Config(format!(
                "backend {name} includes itself via {}",
                parents.join(" -> ")
            )));
        }
        let config = self
            .backends
            .get(name)
            .ok_or_else(|| PasswdError::Config(format!("unknown backend {name}")))?;
        debug!("build backend {name} with driver {}", config.driver_name());

        let driver: Box<dyn Driver> = match config {
            #[cfg(any(feature = "db", feature = "sqlite"))]
            BackendConfig::Sql(config) => Box::new(SqlDriver::connect(config.clone())?),
            #[cfg(feature = "ldap")]
            BackendConfig::Ldap(config) => Box::new(LdapDriver::new(config.clone(), deps)),
            #[cfg(feature = "ldap")]
            BackendConfig::Smbldap(config) => Box::new(LdapDriver::smbldap(config.clone(), deps)),
            BackendConfig::Composite(config) => {
                parents.push(name.to_string());
                let mut drivers = Vec::with_capacity(config.drivers.len());
                for sub in config.drivers.iter() {
                    drivers.push((sub.clone(), self.build(sub, deps, parents)?));
                }
                parents.pop();
                Box::new(CompositeDriver::new(drivers)?)
            }
            #[cfg(feature = "http")]
            BackendConfig::Http(config) => Box::new(HttpDriver::new(config.clone(), deps)),
            #[cfg(feature = "http")]
            BackendConfig::Soap(config) => Box::new(SoapDriver::new(config.clone(), deps)),
            BackendConfig::Poppassd(config) => Box::new(PoppassdDriver::new(config.clone(), deps)),
            BackendConfig::Servuftp(config) => Box::new(ServuftpDriver::new(config.clone(), deps)),
            BackendConfig::Expect(config) => Box::new(ExpectDriver::new(config.clone())),
            BackendConfig::Smbpasswd(config) => Box::new(SmbpasswdDriver::new(config.clone())),
            BackendConfig::File(config) => Box::new(FileDriver::new(config.clone())),
        };
        Ok(driver)
    }
}
