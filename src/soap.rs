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

//! SOAP 1.1 driver calling a remote password change method.

use crate::{Dependencies, Driver, PasswdError, PasswdResult};

use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoapConfig {
    pub url: String,
    pub namespace: String,
    pub method: String,
    pub soap_action: Option<String>,
    pub username_argument: String,
    pub old_password_argument: String,
    pub new_password_argument: String,
}

impl Default for SoapConfig {
    fn default() -> Self {
        Self {
            url: String::from("https://localhost/soap"),
            namespace: String::from("urn:passwd"),
            method: String::from("changePassword"),
            soap_action: None,
            username_argument: String::from("username"),
            old_password_argument: String::from("oldPassword"),
            new_password_argument: String::from("newPassword"),
        }
    }
}

/// Returns the text of the first `faultstring` element, if any
///
/// Namespace prefixes are ignored, entities and CDATA sections are decoded.
fn fault_string(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut inside = false;
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"faultstring" => {
                inside = true;
            }
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"faultstring" => {
                return Some(String::new());
            }
            Ok(Event::Text(ref e)) if inside => match e.unescape() {
                Ok(value) => text.push_str(&value),
                Err(err) => {
                    debug!("unable to unescape fault string: {err}");
                    text.push_str(&String::from_utf8_lossy(e));
                }
            },
            Ok(Event::CData(e)) if inside => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(ref e)) if inside && e.local_name().as_ref() == b"faultstring" => {
                return Some(text.trim().to_string());
            }
            Ok(Event::Eof) => return None,
            Err(err) => {
                debug!("unable to parse soap response: {err}");
                return None;
            }
            _ => {}
        }
    }
}

/// Calls a SOAP method taking the username, the old and the new password
#[derive(Debug, Clone)]
pub struct SoapDriver {
    config: SoapConfig,
    agent: ureq::Agent,
}

impl SoapDriver {
    pub fn new(config: SoapConfig, deps: &Dependencies) -> Self {
        Self {
            config,
            agent: deps.agent.clone(),
        }
    }

    fn envelope(&self, username: &str, old_password: &str, new_password: &str) -> String {
        let arguments: String = [
            (&self.config.username_argument, username),
            (&self.config.old_password_argument, old_password),
            (&self.config.new_password_argument, new_password),
        ]
        .iter()
        .map(|(name, value)| format!("<m:{name}>{}</m:{name}>", escape(*value)))
        .collect();

        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
                r#"<soap:Body><m:{method} xmlns:m="{namespace}">{arguments}</m:{method}></soap:Body>"#,
                r#"</soap:Envelope>"#
            ),
            method = self.config.method,
            namespace = escape(self.config.namespace.as_str()),
            arguments = arguments
        )
    }
}

impl Driver for SoapDriver {
    fn change_password(
        &mut self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> PasswdResult<()> {
        let envelope = self.envelope(username, old_password, new_password);
        let action = self
            .config
            .soap_action
            .clone()
            .unwrap_or_else(|| format!("{}#{}", self.config.namespace, self.config.method));
        debug!("call soap method {} at {}", self.config.method, self.config.url);

        let response = self
            .agent
            .post(&self.config.url)
            .set("Content-Type", "text/xml; charset=utf-8")
            .set("SOAPAction", &format!("\"{action}\""))
            .send_string(&envelope);

        match response {
            Ok(res) => {
                let body = res.into_string()?;
                match fault_string(&body) {
                    Some(fault) => Err(PasswdError::Rejected(fault)),
                    None => Ok(()),
                }
            }
            Err(ureq::Error::Status(code, res)) => {
                let status = format!("{code} {}", res.status_text());
                let body = res.into_string().unwrap_or_default();
                Err(PasswdError::Rejected(
                    fault_string(&body)
                        .unwrap_or_else(|| format!("unexpected http response: {status}")),
                ))
            }
            Err(err) => Err(PasswdError::Transport(format!(
                "unable to reach server: {err}"
            ))),
        }
    }
}
