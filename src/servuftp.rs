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
use crate::{Dependencies, Driver, PasswdError, PasswdResult};

use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const FTP_READY: &str = "220";
const FTP_NEED_PASSWORD: &str = "331";
const FTP_LOGGED_IN: &str = "230";
const FTP_PASSWORD_CHANGED: &str = "230";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServuftpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServuftpConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 21,
        }
    }
}

/// Changes passwords with the `SITE PSWD` extension of Serv-U FTP servers
#[derive(Debug, Clone)]
pub struct ServuftpDriver {
    config: ServuftpConfig,
    timeout: Duration,
}

impl ServuftpDriver {
    pub fn new(config: ServuftpConfig, deps: &Dependencies) -> Self {
        Self {
            config,
            timeout: deps.timeout,
        }
    }
}

impl Driver for ServuftpDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        // the password change command quotes both passwords
        if old_password.contains('"') || new_password.contains('"') {
            return Err(PasswdError::Rejected(String::from(
                "passwords must not contain double quotes",
            )));
        }

        debug!("connect to ftp server {}:{}", self.config.host, self.config.port);
        let stream = connect(&self.config.host, self.config.port, self.timeout)?;
        let mut session = PromptSession::new(stream);

        session.expect(FTP_READY)?;
        session.command(
            Step::User,
            &format!("USER {username}"),
            &format!("USER {username}"),
            FTP_NEED_PASSWORD,
        )?;
        session.command(
            Step::OldPassword,
            &format!("PASS {old_password}"),
            "PASS ********",
            FTP_LOGGED_IN,
        )?;
        session.command(
            Step::NewPassword,
            &format!("SITE PSWD \"{old_password}\" \"{new_password}\""),
            "SITE PSWD \"********\" \"********\"",
            FTP_PASSWORD_CHANGED,
        )?;
        session.quit("QUIT");
        Ok(())
    }
}
