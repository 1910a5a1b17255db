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

use crate::hashlib::{compare_passwords, encrypt_password, Encryption, Scheme};
use crate::{refuse_chars, Driver, PasswdError, PasswdResult, LINE_BREAKS};

use fs2::FileExt;
use log::debug;
use serde::{Deserialize, Serialize};

use std::fs::{self, File};
use std::io::Write;

const DEFAULT_PASSWORD_FILE: &str = "/etc/passwd.users";
const FIELD_SEPARATORS: [char; 3] = [':', '\r', '\n'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub path: String,
    pub encryption: Scheme,
    pub show_encryption: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::from(DEFAULT_PASSWORD_FILE),
            encryption: Scheme::Aprmd5,
            show_encryption: false,
        }
    }
}

/// Changes passwords in a flat `user:password[:...]` file, like htpasswd files
#[derive(Debug, Clone)]
pub struct FileDriver {
    config: FileConfig,
    encryption: Encryption,
}

impl FileDriver {
    pub fn new(config: FileConfig) -> Self {
        let encryption = Encryption::new(config.encryption, config.show_encryption);
        Self { config, encryption }
    }

    /// Returns the content with the password of the user replaced
    fn replace_password(
        &self,
        content: &str,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<String> {
        refuse_chars(&[("username", username)], &FIELD_SEPARATORS)?;
        let mut found = false;
        let mut lines: Vec<String> = Vec::new();
        for line in content.lines() {
            let mut fields = line.splitn(3, ':');
            let user = fields.next().unwrap_or_default();
            if found || user != username || line.starts_with('#') {
                lines.push(line.to_string());
                continue;
            }
            found = true;
            let stored = fields.next().unwrap_or_default();
            compare_passwords(stored, old_password, &self.encryption)?;
            let encoded = encrypt_password(new_password, &self.encryption)?;
            refuse_chars(&[("new password", encoded.as_str())], &FIELD_SEPARATORS)?;
            match fields.next() {
                Some(rest) => lines.push(format!("{user}:{encoded}:{rest}")),
                None => lines.push(format!("{user}:{encoded}")),
            }
        }
        if !found {
            return Err(PasswdError::NoUser);
        }
        let mut content = lines.join("\n");
        content.push('\n');
        Ok(content)
    }
}

impl Driver for FileDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        refuse_chars(&[("new password", new_password)], &LINE_BREAKS)?;
        let path = &self.config.path;
        let lock_path = format!("{path}.lock");
        let tmp_path = format!("{path}.tmp");

        let lock = File::create(&lock_path).map_err(|err| {
            PasswdError::Transport(format!("unable to create lock file {lock_path}: {err}"))
        })?;
        debug!("trying to get exclusive lock on file {lock_path}");
        lock.lock_exclusive()?;

        let res = (|| -> PasswdResult<()> {
            let content = fs::read_to_string(path)
                .map_err(|err| PasswdError::Transport(format!("unable to read {path}: {err}")))?;
            let content = self.replace_password(&content, username, old_password, new_password)?;

            debug!("write password file {tmp_path}");
            let written = (|| -> std::io::Result<()> {
                let mut file = File::create(&tmp_path)?;
                file.set_permissions(fs::metadata(path)?.permissions())?;
                file.write_all(content.as_bytes())?;
                file.sync_all()
            })();
            if let Err(err) = written {
                // the original file is untouched until the rename
                fs::remove_file(&tmp_path).ok();
                return Err(PasswdError::Transport(format!(
                    "unable to write {tmp_path}: {err}"
                )));
            }
            debug!("replace {path}");
            fs::rename(&tmp_path, path)?;
            Ok(())
        })();

        debug!("unlock file");
        lock.unlock()?;
        res
    }
}
