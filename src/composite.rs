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

use crate::{Driver, PasswdError, PasswdResult};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompositeConfig {
    /// Names of the backends to change the password on, in order
    pub drivers: Vec<String>,
}

/// Changes the password on several backends in sequence
///
/// The first failing backend aborts the change. Backends which already
/// changed the password are not rolled back.
pub struct CompositeDriver {
    drivers: Vec<(String, Box<dyn Driver>)>,
}

impl CompositeDriver {
    pub fn new(drivers: Vec<(String, Box<dyn Driver>)>) -> PasswdResult<Self> {
        if drivers.is_empty() {
            return Err(PasswdError::Config(String::from(
                "composite backend without drivers",
            )));
        }
        Ok(Self { drivers })
    }
}

impl Driver for CompositeDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        let mut changed: Vec<&str> = Vec::new();
        for (name, driver) in self.drivers.iter_mut() {
            debug!("change password on backend {name}");
            if let Err(err) = driver.change_password(username, old_password, new_password) {
                if !changed.is_empty() {
                    warn!(
                        "password already changed on backends {}, not rolled back",
                        changed.join(", ")
                    );
                }
                return Err(err.in_driver(name));
            }
            changed.push(name);
        }
        Ok(())
    }
}
