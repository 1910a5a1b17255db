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

use crate::prompt::{connect, PromptSession, Step};
use crate::{Dependencies, Driver, PasswdResult};

use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoppassdConfig {
    pub host: String,
    pub port: u16,
}

impl Default for PoppassdConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 106,
        }
    }
}

/// Changes passwords through a poppassd server
#[derive(Debug, Clone)]
pub struct PoppassdDriver {
    config: PoppassdConfig,
    timeout: Duration,
}

impl PoppassdDriver {
    pub fn new(config: PoppassdConfig, deps: &Dependencies) -> Self {
        Self {
            config,
            timeout: deps.timeout,
        }
    }
}

impl Driver for PoppassdDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        debug!("connect to poppassd {}:{}", self.config.host, self.config.port);
        let stream = connect(&self.config.host, self.config.port, self.timeout)?;
        let mut session = PromptSession::new(stream);

        session.expect("2")?;
        session.command(Step::User, &format!("user {username}"), &format!("user {username}"), "2")?;
        session.command(
            Step::OldPassword,
            &format!("pass {old_password}"),
            "pass ********",
            "2",
        )?;
        session.command(
            Step::NewPassword,
            &format!("newpass {new_password}"),
            "newpass ********",
            "2",
        )?;
        session.quit("quit");
        Ok(())
    }
}
