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

//! Line oriented request/response sessions used by the socket drivers.
//!
//! A session walks through the steps of a password change in order. Every
//! reply is checked against the reply code the current step expects, the
//! first unexpected reply ends the session.

use crate::{refuse_chars, PasswdError, PasswdResult, LINE_BREAKS};

use log::debug;
use std::fmt::Display;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Steps of an interactive password change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Connect,
    User,
    OldPassword,
    NewPassword,
    ConfirmPassword,
    Disconnect,
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::User => "user",
            Self::OldPassword => "old password",
            Self::NewPassword => "new password",
            Self::ConfirmPassword => "password confirmation",
            Self::Disconnect => "disconnect",
        };
        write!(f, "{name}")
    }
}

impl Step {
    /// Maps an unexpected reply in this step to an error
    fn failure(&self, reply: &str) -> PasswdError {
        match self {
            Self::Connect => PasswdError::Transport(format!("unexpected greeting: {reply}")),
            Self::User => PasswdError::NoUser,
            Self::OldPassword => PasswdError::BadOldPassword,
            _ => PasswdError::Rejected(format!("{self}: {reply}")),
        }
    }
}

pub struct PromptSession<S: BufRead + Write> {
    stream: S,
    step: Step,
}

impl<S: BufRead + Write> PromptSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            step: Step::Connect,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    fn read_reply(&mut self) -> PasswdResult<String> {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).map_err(|err| {
            PasswdError::Transport(format!("{}: unable to read reply: {err}", self.step))
        })?;
        if read == 0 {
            return Err(PasswdError::Transport(format!(
                "{}: connection closed by server",
                self.step
            )));
        }
        let reply = line.trim_end().to_string();
        debug!("{}: received {reply:?}", self.step);
        Ok(reply)
    }

    /// Reads one reply and checks that it starts with the code given
    pub fn expect(&mut self, code: &str) -> PasswdResult<String> {
        let reply = self.read_reply()?;
        match reply.starts_with(code) {
            true => Ok(reply),
            false => Err(self.step.failure(&reply)),
        }
    }

    /// Advances to the step given, sends the line and checks the reply
    ///
    /// `shown` is what gets logged in place of the line, so secrets stay out of the log.
    pub fn command(
        &mut self,
        step: Step,
        line: &str,
        shown: &str,
        code: &str,
    ) -> PasswdResult<String> {
        if step < self.step {
            return Err(PasswdError::Transport(format!(
                "{step} requested after {}",
                self.step
            )));
        }
        refuse_chars(&[(shown, line)], &LINE_BREAKS)?;
        self.step = step;
        debug!("{step}: send {shown:?}");
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .and_then(|_| self.stream.flush())
            .map_err(|err| PasswdError::Transport(format!("{step}: unable to send: {err}")))?;
        self.expect(code)
    }

    /// Sends the closing command; failures are ignored once the change went through
    pub fn quit(&mut self, line: &str) {
        self.step = Step::Disconnect;
        if let Err(err) = self
            .stream
            .write_all(format!("{line}\r\n").as_bytes())
            .and_then(|_| self.stream.flush())
        {
            debug!("unable to send {line:?}: {err}");
        }
    }
}

/// Buffered TCP connection, replies are read through the buffer and commands go to the socket
pub struct SocketStream {
    reader: BufReader<TcpStream>,
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for SocketStream {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.reader.get_mut().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.reader.get_mut().flush()
    }
}

/// Opens a TCP connection with read and write timeouts set
pub fn connect(host: &str, port: u16, timeout: Duration) -> PasswdResult<SocketStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|err| PasswdError::Transport(format!("unable to resolve {host}: {err}")))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                return Ok(SocketStream {
                    reader: BufReader::new(stream),
                });
            }
            Err(err) => {
                debug!("unable to connect to {addr}: {err}");
                last_error = Some(err);
            }
        }
    }
    Err(PasswdError::Transport(match last_error {
        Some(err) => format!("unable to connect to {host}:{port}: {err}"),
        None => format!("no address found for {host}"),
    }))
}
