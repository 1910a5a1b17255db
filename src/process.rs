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

//! Drivers handing the password change to an external program.

use crate::{expand_user, refuse_chars, Driver, PasswdError, PasswdResult, LINE_BREAKS};

use log::debug;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Output, Stdio};

/// Output of smbpasswd when the old password was not accepted
const SMB_LOGON_FAILURE: &str = "NT_STATUS_LOGON_FAILURE";

/// Credentials are fed line by line, so none may contain a line break
fn refuse_line_breaks(username: &str, old_password: &str, new_password: &str) -> PasswdResult<()> {
    refuse_chars(
        &[
            ("username", username),
            ("old password", old_password),
            ("new password", new_password),
        ],
        &LINE_BREAKS,
    )
}

/// Runs the program given, feeds `input` to its stdin and collects its output
fn run(program: &str, args: &[String], input: &str) -> PasswdResult<Output> {
    debug!("run {program} {}", args.join(" "));
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| PasswdError::Transport(format!("unable to run {program}: {err}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        // a program exiting early closes the pipe, its exit status tells why
        if let Err(err) = stdin.write_all(input.as_bytes()) {
            debug!("unable to write to {program}: {err}");
        }
    }

    child
        .wait_with_output()
        .map_err(|err| PasswdError::Transport(format!("unable to wait for {program}: {err}")))
}

fn output_text(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(stderr.trim());
    }
    text
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectConfig {
    pub program: String,
    /// Arguments, `%u` is replaced by the username and `%h` by the host
    pub args: Vec<String>,
    pub host: String,
}

impl Default for ExpectConfig {
    fn default() -> Self {
        Self {
            program: String::from("/usr/bin/expect"),
            args: vec![
                String::from("-f"),
                String::from("/usr/share/passwd/passwd_expect"),
                String::from("--"),
                String::from("-host"),
                String::from("%h"),
            ],
            host: String::from("localhost"),
        }
    }
}

/// Runs an expect script which performs the interactive change
///
/// The script receives the username, the old and the new password on stdin, one per line.
#[derive(Debug, Clone)]
pub struct ExpectDriver {
    config: ExpectConfig,
}

impl ExpectDriver {
    pub fn new(config: ExpectConfig) -> Self {
        Self { config }
    }
}

impl Driver for ExpectDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        refuse_line_breaks(username, old_password, new_password)?;
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| expand_user(arg, username).replace("%h", &self.config.host))
            .collect();
        let input = format!("{username}\n{old_password}\n{new_password}\n");
        let output = run(&self.config.program, &args, &input)?;
        match output.status.success() {
            true => Ok(()),
            false => Err(PasswdError::Rejected(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                output_text(&output)
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbpasswdConfig {
    pub program: String,
    pub host: String,
}

impl Default for SmbpasswdConfig {
    fn default() -> Self {
        Self {
            program: String::from("/usr/bin/smbpasswd"),
            host: String::from("localhost"),
        }
    }
}

/// Changes passwords on an SMB server with smbpasswd
#[derive(Debug, Clone)]
pub struct SmbpasswdDriver {
    config: SmbpasswdConfig,
}

impl SmbpasswdDriver {
    pub fn new(config: SmbpasswdConfig) -> Self {
        Self { config }
    }
}

impl Driver for SmbpasswdDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        refuse_line_breaks(username, old_password, new_password)?;
        let args = vec![
            String::from("-r"),
            self.config.host.clone(),
            String::from("-s"),
            String::from("-U"),
            username.to_string(),
        ];
        let input = format!("{old_password}\n{new_password}\n{new_password}\n");
        let output = run(&self.config.program, &args, &input)?;
        let text = output_text(&output);
        if output.status.success() {
            return Ok(());
        }
        match text.contains(SMB_LOGON_FAILURE) {
            true => Err(PasswdError::BadOldPassword),
            false => Err(PasswdError::Rejected(text)),
        }
    }
}
